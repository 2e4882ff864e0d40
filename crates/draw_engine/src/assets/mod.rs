//! Asset loading for texture pixel data

pub mod texture_data;

pub use texture_data::TextureData;

use thiserror::Error;

/// Asset system errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Failed to decode asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Decoded data is inconsistent
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
