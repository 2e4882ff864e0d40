//! # Draw Engine
//!
//! Explicit GPU resource management and draw submission for a small,
//! touch-driven Vulkan renderer.
//!
//! ## Features
//!
//! - **Memory**: memory type selection and exclusively owned allocations
//! - **Buffers**: vertex, index and indirect-command buffers with a checked lifecycle
//! - **Textures**: staged or linear uploads, fence-gated, registered by name
//! - **Drawables**: direct, indexed, indirect and indexed-indirect draw strategies
//! - **Shell**: lifecycle commands and touch rotation driving a [`GraphicsStack`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use draw_engine::prelude::*;
//! use std::sync::Arc;
//!
//! fn build_triangle(device: Arc<dyn GpuDevice>, vertices: &[u8]) -> VulkanResult<DrawableObject> {
//!     DrawableObject::new(device, vertices, 3, DrawConfig::Direct)
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod application;
pub mod assets;
pub mod config;
pub mod foundation;
pub mod input;
pub mod render;

pub use application::{AppError, AppShell, GraphicsStack, LifecycleCommand};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        application::{load_textures, AppError, AppShell, GraphicsStack, LifecycleCommand},
        assets::{AssetError, TextureData},
        config::{Config, ConfigError, EngineConfig, InputConfig, TextureConfig, UploadConfig},
        foundation::math::{MatrixState, TransformSource},
        input::{TouchController, TouchEvent},
        render::{
            drawable::{
                DrawConfig, DrawIndexedIndirectCommand, DrawIndirectCommand, DrawableObject,
                Indices, PushConstants,
            },
            vulkan::{
                Buffer, BufferUsage, FenceWaitPolicy, GpuDevice, TextureRegistry, UploadContext,
                VulkanContext, VulkanError, VulkanResult,
            },
        },
    };
}
