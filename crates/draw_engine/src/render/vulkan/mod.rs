//! Vulkan resource layer
//!
//! Device memory, buffers, textures, layout transitions and upload
//! synchronization, all recorded through the [`GpuDevice`] seam.

pub mod barrier;
pub mod buffer;
pub mod context;
pub mod memory;
pub mod sync;
pub mod texture;

#[cfg(test)]
pub(crate) mod mock;

pub use barrier::{access_masks, layout_barrier, set_image_layout};
pub use buffer::{upload_buffer, Buffer, BufferState, BufferUsage};
pub use context::{GpuDevice, VulkanContext, VulkanError, VulkanResult};
pub use memory::{find_memory_type, DeviceAllocation};
pub use sync::{Fence, FenceWaitPolicy, UploadContext, DEFAULT_FENCE_TIMEOUT_NS};
pub use texture::{Texture, TextureRegistry, UploadPath};
