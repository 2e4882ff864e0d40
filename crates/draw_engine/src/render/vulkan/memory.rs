//! Device memory type selection and allocation bookkeeping

use ash::vk;
use crate::render::vulkan::{GpuDevice, VulkanError, VulkanResult};

/// Find the lowest memory type index that is both allowed by `type_bits` and
/// carries every flag in `required`.
///
/// Pure function over the device's reported memory types. Returns `None` when
/// no index qualifies; there is no fallback type.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count).find(|&index| {
        type_bits & (1 << index) != 0
            && properties.memory_types[index as usize]
                .property_flags
                .contains(required)
    })
}

/// A block of device memory owned by exactly one buffer or image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAllocation {
    /// Opaque allocation handle
    pub memory: vk::DeviceMemory,
    /// Allocated byte size, equal to the resource's reported requirement
    pub size: vk::DeviceSize,
    /// Memory type the allocation was taken from
    pub memory_type_index: u32,
}

impl DeviceAllocation {
    /// Allocate memory sized to `requirements` from the first compatible type
    /// carrying `required` flags
    pub fn allocate(
        device: &dyn GpuDevice,
        requirements: vk::MemoryRequirements,
        required: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let properties = device.memory_properties();
        let found = find_memory_type(&properties, requirements.memory_type_bits, required);
        let Some(memory_type_index) = found else {
            log::error!(
                "No memory type for bits {:#b} with {:?}",
                requirements.memory_type_bits,
                required
            );
            return Err(VulkanError::NoSuitableMemoryType {
                type_bits: requirements.memory_type_bits,
                required,
            });
        };
        log::debug!(
            "Allocating {} bytes from memory type {}",
            requirements.size,
            memory_type_index
        );

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = device
            .allocate_memory(&alloc_info)
            .map_err(VulkanError::Api)?;

        Ok(Self {
            memory,
            size: requirements.size,
            memory_type_index,
        })
    }

    /// Map the whole allocation, hand the host pointer to `f`, then unmap.
    ///
    /// The allocation must come from host-visible memory. No flush or
    /// invalidate is issued, so callers request host-coherent memory too.
    pub fn with_mapped<R>(
        &self,
        device: &dyn GpuDevice,
        f: impl FnOnce(*mut u8) -> R,
    ) -> VulkanResult<R> {
        let ptr = device
            .map_memory(self.memory, 0, self.size)
            .map_err(VulkanError::Api)?;
        let result = f(ptr.cast::<u8>());
        device.unmap_memory(self.memory);
        Ok(result)
    }

    /// Release the allocation
    pub fn free(self, device: &dyn GpuDevice) {
        device.free_memory(self.memory);
    }
}
