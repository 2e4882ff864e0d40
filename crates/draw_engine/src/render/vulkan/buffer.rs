//! Buffer management for vertex, index and indirect-command data
//!
//! A [`Buffer`] walks Created -> Bound -> Populated -> Destroyed. Each step is
//! a separate call so the caller chooses memory properties and controls when
//! host data is copied in. Destruction releases the buffer handle before the
//! memory that backs it, exactly once.

use ash::vk;
use std::sync::Arc;

use crate::render::vulkan::memory::DeviceAllocation;
use crate::render::vulkan::{GpuDevice, VulkanError, VulkanResult};

/// What a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Per-vertex attribute data
    Vertex,
    /// 16- or 32-bit vertex indices
    Index,
    /// Indirect draw command records
    Indirect,
    /// Transient transfer source for image uploads
    Staging,
}

impl BufferUsage {
    /// Vulkan usage flags for this purpose
    pub fn flags(self) -> vk::BufferUsageFlags {
        match self {
            Self::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            Self::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            Self::Indirect => vk::BufferUsageFlags::INDIRECT_BUFFER,
            Self::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }
}

/// Lifecycle state of a [`Buffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Handle exists, no memory bound
    Created,
    /// Memory allocated and bound at offset 0
    Bound,
    /// Host data copied in
    Populated,
    /// Handle destroyed and memory freed
    Destroyed,
}

/// Device buffer with exclusively owned backing memory
pub struct Buffer {
    device: Arc<dyn GpuDevice>,
    buffer: vk::Buffer,
    allocation: Option<DeviceAllocation>,
    usage: BufferUsage,
    size: vk::DeviceSize,
    populated_len: usize,
    state: BufferState,
}

impl Buffer {
    /// Create a buffer handle sized exactly to `size` bytes
    pub fn create(
        device: Arc<dyn GpuDevice>,
        size: vk::DeviceSize,
        usage: BufferUsage,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("cannot create an empty {usage:?} buffer"),
            });
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage.flags())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = device.create_buffer(&buffer_info).map_err(VulkanError::Api)?;
        log::debug!("Created {:?} buffer of {} bytes", usage, size);

        Ok(Self {
            device,
            buffer,
            allocation: None,
            usage,
            size,
            populated_len: 0,
            state: BufferState::Created,
        })
    }

    /// Allocate memory carrying `properties` and bind it at offset 0.
    ///
    /// The allocation is sized to the device's reported requirement, which may
    /// exceed the requested size through alignment padding.
    pub fn bind(&mut self, properties: vk::MemoryPropertyFlags) -> VulkanResult<()> {
        if self.state != BufferState::Created {
            return Err(VulkanError::InvalidOperation {
                reason: format!("bind called on a buffer in state {:?}", self.state),
            });
        }

        let requirements = self.device.buffer_memory_requirements(self.buffer);
        if requirements.size < self.size {
            return Err(VulkanError::InsufficientAllocation {
                requested: self.size,
                reported: requirements.size,
            });
        }

        let allocation =
            DeviceAllocation::allocate(self.device.as_ref(), requirements, properties)?;
        if let Err(result) = self.device.bind_buffer_memory(self.buffer, allocation.memory, 0) {
            allocation.free(self.device.as_ref());
            return Err(VulkanError::Api(result));
        }

        self.allocation = Some(allocation);
        self.state = BufferState::Bound;
        Ok(())
    }

    /// Copy `data` into the bound memory through a map/copy/unmap sequence.
    ///
    /// Memory must be host-visible and host-coherent; no flush is issued.
    pub fn populate(&mut self, data: &[u8]) -> VulkanResult<()> {
        let allocation = self.bound_allocation("populate")?;
        let requested = data.len() as vk::DeviceSize;
        if requested > allocation.size {
            return Err(VulkanError::BufferOverflow {
                capacity: allocation.size,
                requested,
            });
        }

        allocation.with_mapped(self.device.as_ref(), |ptr| {
            // SAFETY: the mapping spans allocation.size bytes, checked above
            unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
        })?;

        self.populated_len = data.len();
        self.state = BufferState::Populated;
        Ok(())
    }

    /// Copy the populated range back to the host
    pub fn read_back(&self) -> VulkanResult<Vec<u8>> {
        let allocation = self.bound_allocation("read_back")?;
        let len = self.populated_len;
        allocation.with_mapped(self.device.as_ref(), |ptr| {
            let mut bytes = vec![0u8; len];
            // SAFETY: populated_len never exceeds the mapped allocation
            unsafe { std::ptr::copy_nonoverlapping(ptr.cast_const(), bytes.as_mut_ptr(), len) };
            bytes
        })
    }

    /// Whole-buffer descriptor range
    pub fn descriptor_info(&self) -> VulkanResult<vk::DescriptorBufferInfo> {
        let allocation = self.bound_allocation("descriptor_info")?;
        Ok(vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: allocation.size,
        })
    }

    /// Destroy the buffer handle, then free its memory. Later calls do nothing.
    pub fn destroy(&mut self) {
        if self.state == BufferState::Destroyed {
            return;
        }
        self.device.destroy_buffer(self.buffer);
        if let Some(allocation) = self.allocation.take() {
            allocation.free(self.device.as_ref());
        }
        self.buffer = vk::Buffer::null();
        self.state = BufferState::Destroyed;
        log::debug!("Destroyed {:?} buffer", self.usage);
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Backing allocation, once bound
    pub fn allocation(&self) -> Option<&DeviceAllocation> {
        self.allocation.as_ref()
    }

    /// Purpose the buffer was created for
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Lifecycle state
    pub fn state(&self) -> BufferState {
        self.state
    }

    fn bound_allocation(&self, operation: &str) -> VulkanResult<DeviceAllocation> {
        match (self.state, self.allocation) {
            (BufferState::Bound | BufferState::Populated, Some(allocation)) => Ok(allocation),
            _ => Err(VulkanError::InvalidOperation {
                reason: format!("{operation} called on a buffer in state {:?}", self.state),
            }),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Create, bind to host-visible coherent memory and populate in one step
pub fn upload_buffer(
    device: Arc<dyn GpuDevice>,
    usage: BufferUsage,
    data: &[u8],
) -> VulkanResult<Buffer> {
    let mut buffer = Buffer::create(device, data.len() as vk::DeviceSize, usage)?;
    buffer.bind(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT)?;
    buffer.populate(data)?;
    Ok(buffer)
}
