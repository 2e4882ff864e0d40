//! Vulkan device context
//!
//! Defines the error type shared by every GPU resource in this crate, the
//! [`GpuDevice`] seam the resources record against, and [`VulkanContext`], the
//! ash-backed implementation built from handles created by the application
//! shell.

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::c_void;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// No memory type satisfies both the compatibility mask and the property flags
    #[error("No suitable memory type found (type bits {type_bits:#b}, required {required:?})")]
    NoSuitableMemoryType {
        /// Compatibility mask reported by the resource's memory requirements
        type_bits: u32,
        /// Property flags the caller asked for
        required: vk::MemoryPropertyFlags,
    },

    /// The device reported a memory requirement smaller than the requested size
    #[error("Memory requirement of {reported} bytes cannot hold {requested} requested bytes")]
    InsufficientAllocation {
        /// Bytes the caller asked the resource to hold
        requested: vk::DeviceSize,
        /// Bytes the device says the resource needs
        reported: vk::DeviceSize,
    },

    /// Host copy would run past the mapped range
    #[error("Copy of {requested} bytes exceeds mapped range of {capacity} bytes")]
    BufferOverflow {
        /// Size of the mapped range
        capacity: vk::DeviceSize,
        /// Bytes the caller tried to copy
        requested: vk::DeviceSize,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Fence wait gave up after the configured number of timed-out attempts
    #[error("Fence still unsignaled after {attempts} timed-out waits")]
    FenceTimeout {
        /// Number of bounded waits that returned TIMEOUT
        attempts: u32,
    },

    /// An upload wait failed and the queue could not be drained afterwards.
    /// The fence and every resource the submission referenced were leaked.
    #[error("Upload submission may still be pending, queue wait idle failed: {result:?}")]
    SubmissionStalled {
        /// Result of the failed queue wait idle
        result: vk::Result,
    },

    /// Texture name was never registered
    #[error("Texture not registered: {name}")]
    TextureNotFound {
        /// Requested texture name
        name: String,
    },

    /// Texture name registered twice
    #[error("Texture already registered: {name}")]
    DuplicateTexture {
        /// Offending texture name
        name: String,
    },

    /// Pixel payload does not match the declared dimensions
    #[error("Texture data holds {actual} bytes, {width}x{height} RGBA8 needs {expected}")]
    InvalidTextureData {
        /// Declared width in pixels
        width: u32,
        /// Declared height in pixels
        height: u32,
        /// Bytes implied by the dimensions
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// The Vulkan entry points used by the resource and draw-submission layer.
///
/// Every buffer, image, fence and draw call in this crate goes through this
/// trait. [`VulkanContext`] forwards to a real `ash::Device`; tests substitute a
/// recording device. Methods mirror the corresponding `vk*` calls and return
/// the raw [`VkResult`] so callers decide how a failure maps to [`VulkanError`].
pub trait GpuDevice {
    /// Memory heaps and types exposed by the physical device
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties;
    /// Tiling features the physical device supports for `format`
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    /// `vkCreateBuffer`
    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer>;
    /// `vkGetBufferMemoryRequirements`
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    /// `vkBindBufferMemory`
    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;
    /// `vkDestroyBuffer`
    fn destroy_buffer(&self, buffer: vk::Buffer);

    /// `vkCreateImage`
    fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image>;
    /// `vkGetImageMemoryRequirements`
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    /// `vkGetImageSubresourceLayout`
    fn image_subresource_layout(
        &self,
        image: vk::Image,
        subresource: vk::ImageSubresource,
    ) -> vk::SubresourceLayout;
    /// `vkBindImageMemory`
    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;
    /// `vkDestroyImage`
    fn destroy_image(&self, image: vk::Image);
    /// `vkCreateImageView`
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>;
    /// `vkDestroyImageView`
    fn destroy_image_view(&self, view: vk::ImageView);
    /// `vkCreateSampler`
    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> VkResult<vk::Sampler>;
    /// `vkDestroySampler`
    fn destroy_sampler(&self, sampler: vk::Sampler);

    /// `vkAllocateMemory`
    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory>;
    /// `vkFreeMemory`
    fn free_memory(&self, memory: vk::DeviceMemory);
    /// `vkMapMemory`
    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void>;
    /// `vkUnmapMemory`
    fn unmap_memory(&self, memory: vk::DeviceMemory);

    /// `vkCreateFence`
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    /// `vkWaitForFences` on a single fence; a timeout surfaces as `Err(vk::Result::TIMEOUT)`
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    /// `vkDestroyFence`
    fn destroy_fence(&self, fence: vk::Fence);

    /// `vkResetCommandBuffer`
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    /// `vkBeginCommandBuffer`
    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()>;
    /// `vkEndCommandBuffer`
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    /// `vkQueueSubmit` of one command buffer with no semaphores
    fn queue_submit(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    ) -> VkResult<()>;
    /// `vkQueueWaitIdle`
    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()>;

    /// `vkCmdPipelineBarrier` with a single image barrier
    fn cmd_pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    );
    /// `vkCmdCopyBufferToImage` with a single region
    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        region: &vk::BufferImageCopy,
    );
    /// `vkCmdBindPipeline` at the graphics bind point
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    /// `vkCmdBindDescriptorSets` at the graphics bind point, starting at set 0
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    );
    /// `vkCmdBindVertexBuffers`
    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    /// `vkCmdBindIndexBuffer`
    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );
    /// `vkCmdPushConstants`
    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    /// `vkCmdDraw`
    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    /// `vkCmdDrawIndexed`
    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    /// `vkCmdDrawIndirect`
    fn cmd_draw_indirect(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    );
    /// `vkCmdDrawIndexedIndirect`
    fn cmd_draw_indexed_indirect(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    );
}

/// Logical device plus the physical-device facts the resource layer queries.
///
/// The application shell owns instance and device creation and teardown; this
/// context only borrows the handles for the lifetime of the graphics stack and
/// never destroys them.
pub struct VulkanContext {
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanContext {
    /// Wrap handles created by the application shell
    pub fn new(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Self {
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        log::debug!(
            "Device exposes {} memory types across {} heaps",
            memory_properties.memory_type_count,
            memory_properties.memory_heap_count
        );

        Self {
            instance,
            physical_device,
            device,
            memory_properties,
        }
    }

    /// Underlying ash device
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Physical device the logical device was created from
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }
}

impl GpuDevice for VulkanContext {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory_properties
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        unsafe { self.device.create_buffer(info, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, offset) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image> {
        unsafe { self.device.create_image(info, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    fn image_subresource_layout(
        &self,
        image: vk::Image,
        subresource: vk::ImageSubresource,
    ) -> vk::SubresourceLayout {
        unsafe { self.device.get_image_subresource_layout(image, subresource) }
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        unsafe { self.device.bind_image_memory(image, memory, offset) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> VkResult<vk::Sampler> {
        unsafe { self.device.create_sampler(info, None) }
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory> {
        unsafe { self.device.allocate_memory(info, None) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        unsafe {
            self.device
                .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())
        }
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&create_info, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();
        unsafe { self.device.queue_submit(queue, &[submit_info], fence) }
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        unsafe { self.device.queue_wait_idle(queue) }
    }

    fn cmd_pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(barrier),
            );
        }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        region: &vk::BufferImageCopy,
    ) {
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                command_buffer,
                buffer,
                image,
                layout,
                std::slice::from_ref(region),
            );
        }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                &[],
            );
        }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, first_binding, buffers, offsets);
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(command_buffer, buffer, offset, index_type);
        }
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(command_buffer, layout, stages, offset, data);
        }
    }

    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw(
                command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn cmd_draw_indirect(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        unsafe {
            self.device
                .cmd_draw_indirect(command_buffer, buffer, offset, draw_count, stride);
        }
    }

    fn cmd_draw_indexed_indirect(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        unsafe {
            self.device
                .cmd_draw_indexed_indirect(command_buffer, buffer, offset, draw_count, stride);
        }
    }
}
