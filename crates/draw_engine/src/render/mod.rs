//! # Rendering
//!
//! GPU resources and draw submission on top of Vulkan.
//!
//! - [`vulkan`]: device seam, memory, buffers, textures, barriers and upload sync
//! - [`drawable`]: meshes with their draw strategy and push constant payload

pub mod drawable;
pub mod vulkan;

pub use drawable::{
    DrawConfig, DrawIndexedIndirectCommand, DrawIndirectCommand, DrawableObject, Indices,
    PushConstants, PUSH_CONSTANT_SIZE,
};
pub use vulkan::{GpuDevice, TextureRegistry, VulkanContext, VulkanError, VulkanResult};
