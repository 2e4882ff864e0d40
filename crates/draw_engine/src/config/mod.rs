//! Configuration system
//!
//! [`EngineConfig`] loads from `.toml` or `.ron`. Every field has a default, so
//! a partial or empty file is valid.

pub use serde::{Deserialize, Serialize};

use crate::render::vulkan::{FenceWaitPolicy, DEFAULT_FENCE_TIMEOUT_NS};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// One-shot upload synchronization
    pub upload: UploadConfig,
    /// Sampler pool and texture list
    pub textures: TextureConfig,
    /// Touch gesture tuning
    pub input: InputConfig,
}

impl Config for EngineConfig {}

/// Fence waiting for blocking uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Bound on a single fence wait, in nanoseconds
    pub fence_timeout_ns: u64,
    /// Timed-out waits tolerated before failing; absent means retry forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fence_waits: Option<u32>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            fence_timeout_ns: DEFAULT_FENCE_TIMEOUT_NS,
            max_fence_waits: None,
        }
    }
}

impl UploadConfig {
    /// Wait policy described by this section
    pub fn fence_policy(&self) -> FenceWaitPolicy {
        FenceWaitPolicy {
            timeout_ns: self.fence_timeout_ns,
            max_attempts: self.max_fence_waits,
        }
    }
}

/// A texture to load at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureEntry {
    /// Registry name used for lookups
    pub name: String,
    /// Encoded image on disk
    pub path: String,
}

/// Texture registry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    /// Samplers created up front
    pub sampler_count: u32,
    /// Move linearly tiled images to SHADER_READ_ONLY after writing them
    pub transition_linear_images: bool,
    /// Textures uploaded during initialization, in descriptor order
    pub textures: Vec<TextureEntry>,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            sampler_count: 1,
            transition_linear_images: true,
            textures: Vec::new(),
        }
    }
}

impl TextureConfig {
    /// Append a texture to load at startup
    pub fn with_texture(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.textures.push(TextureEntry {
            name: name.into(),
            path: path.into(),
        });
        self
    }
}

/// Touch gesture tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Degrees of rotation per pixel dragged
    pub touch_scale_factor: f32,
    /// Per-move pixel delta above which a touch is no longer a click
    pub click_threshold: f32,
    /// Number of modes a click cycles through
    pub mode_count: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            touch_scale_factor: 5.0 / 320.0,
            click_threshold: 10.0,
            mode_count: 2,
        }
    }
}
