//! Recording `GpuDevice` used by unit tests
//!
//! Hands out fresh handles, backs every allocation with a host `Vec<u8>` so
//! map/copy/unmap is real, and records each call in order.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::c_void;
use std::sync::Mutex;

use crate::render::vulkan::GpuDevice;

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateBuffer { buffer: vk::Buffer, size: vk::DeviceSize, usage: vk::BufferUsageFlags },
    BindBufferMemory { buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize },
    DestroyBuffer(vk::Buffer),
    CreateImage {
        image: vk::Image,
        format: vk::Format,
        width: u32,
        height: u32,
        tiling: vk::ImageTiling,
        initial_layout: vk::ImageLayout,
        usage: vk::ImageUsageFlags,
    },
    BindImageMemory { image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize },
    DestroyImage(vk::Image),
    CreateImageView { view: vk::ImageView, image: vk::Image, format: vk::Format },
    DestroyImageView(vk::ImageView),
    CreateSampler {
        sampler: vk::Sampler,
        mag_filter: vk::Filter,
        min_filter: vk::Filter,
        mipmap_mode: vk::SamplerMipmapMode,
        address_modes: [vk::SamplerAddressMode; 3],
        anisotropy_enable: bool,
        compare_enable: bool,
    },
    DestroySampler(vk::Sampler),
    AllocateMemory { memory: vk::DeviceMemory, size: vk::DeviceSize, memory_type_index: u32 },
    FreeMemory(vk::DeviceMemory),
    MapMemory { memory: vk::DeviceMemory, offset: vk::DeviceSize, size: vk::DeviceSize },
    UnmapMemory(vk::DeviceMemory),
    CreateFence(vk::Fence),
    WaitForFence { fence: vk::Fence, timeout_ns: u64 },
    DestroyFence(vk::Fence),
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    QueueSubmit { queue: vk::Queue, command_buffer: vk::CommandBuffer, fence: vk::Fence },
    QueueWaitIdle(vk::Queue),
    PipelineBarrier {
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
    },
    CopyBufferToImage {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        width: u32,
        height: u32,
    },
    BindPipeline { command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline },
    BindDescriptorSets {
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        sets: Vec<vk::DescriptorSet>,
    },
    BindVertexBuffers {
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<vk::DeviceSize>,
    },
    BindIndexBuffer {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    PushConstants {
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    },
}

/// Device entry points that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateBuffer,
    BindBufferMemory,
    CreateImage,
    AllocateMemory,
    MapMemory,
    CreateSampler,
    CreateImageView,
    QueueSubmit,
    QueueWaitIdle,
}

struct MockState {
    next_handle: u64,
    calls: Vec<Call>,
    allocations: HashMap<u64, Vec<u8>>,
    image_extents: HashMap<u64, (u32, u32)>,
    fence_results: VecDeque<vk::Result>,
    failures: HashSet<FailPoint>,
}

/// Recording device for tests
pub struct MockDevice {
    memory_types: Vec<vk::MemoryPropertyFlags>,
    alignment: vk::DeviceSize,
    buffer_requirement: Option<vk::DeviceSize>,
    linear_sampling: bool,
    row_padding: vk::DeviceSize,
    state: Mutex<MockState>,
}

impl MockDevice {
    /// Device-local type at index 0, host-visible + coherent at index 1,
    /// 64-byte requirement alignment, no linear-tiling sampling support
    pub fn new() -> Self {
        Self {
            memory_types: vec![
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ],
            alignment: 64,
            buffer_requirement: None,
            linear_sampling: false,
            row_padding: 0,
            state: Mutex::new(MockState {
                next_handle: 1,
                calls: Vec::new(),
                allocations: HashMap::new(),
                image_extents: HashMap::new(),
                fence_results: VecDeque::new(),
                failures: HashSet::new(),
            }),
        }
    }

    pub fn with_memory_types(mut self, types: &[vk::MemoryPropertyFlags]) -> Self {
        self.memory_types = types.to_vec();
        self
    }

    pub fn with_alignment(mut self, alignment: vk::DeviceSize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Report this size for every buffer requirement regardless of request
    pub fn with_buffer_requirement(mut self, size: vk::DeviceSize) -> Self {
        self.buffer_requirement = Some(size);
        self
    }

    pub fn with_linear_sampling(mut self, supported: bool) -> Self {
        self.linear_sampling = supported;
        self
    }

    /// Extra bytes at the end of each row of a linear image
    pub fn with_row_padding(mut self, padding: vk::DeviceSize) -> Self {
        self.row_padding = padding;
        self
    }

    pub fn with_fence_results(self, results: &[vk::Result]) -> Self {
        self.lock().fence_results.extend(results.iter().copied());
        self
    }

    pub fn with_failure(self, point: FailPoint) -> Self {
        self.lock().failures.insert(point);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Position of the first call matching `predicate`
    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.lock().calls.iter().position(|c| predicate(c))
    }

    /// Host copy of an allocation's bytes
    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Vec<u8> {
        self.lock()
            .allocations
            .get(&memory.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    /// Number of allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.lock().allocations.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    fn next_raw(state: &mut MockState) -> u64 {
        let raw = state.next_handle;
        state.next_handle += 1;
        raw
    }

    fn check(state: &MockState, point: FailPoint) -> VkResult<()> {
        if state.failures.contains(&point) {
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        } else {
            Ok(())
        }
    }

    fn align(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        size.div_ceil(self.alignment) * self.alignment
    }

    fn all_type_bits(&self) -> u32 {
        (1u32 << self.memory_types.len()) - 1
    }
}

impl GpuDevice for MockDevice {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = self.memory_types.len() as u32;
        for (i, flags) in self.memory_types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    fn format_properties(&self, _format: vk::Format) -> vk::FormatProperties {
        let linear = if self.linear_sampling {
            vk::FormatFeatureFlags::SAMPLED_IMAGE
        } else {
            vk::FormatFeatureFlags::empty()
        };
        vk::FormatProperties {
            linear_tiling_features: linear,
            optimal_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE,
            buffer_features: vk::FormatFeatureFlags::empty(),
        }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        let mut state = self.lock();
        Self::check(&state, FailPoint::CreateBuffer)?;
        let buffer = vk::Buffer::from_raw(Self::next_raw(&mut state));
        state.calls.push(Call::CreateBuffer { buffer, size: info.size, usage: info.usage });
        // Stash the requested size so the requirement query can answer
        state.image_extents.insert(buffer.as_raw(), (info.size as u32, 0));
        Ok(buffer)
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let state = self.lock();
        let requested = state
            .image_extents
            .get(&buffer.as_raw())
            .map_or(0, |(size, _)| vk::DeviceSize::from(*size));
        vk::MemoryRequirements {
            size: self.buffer_requirement.unwrap_or_else(|| self.align(requested)),
            alignment: self.alignment,
            memory_type_bits: self.all_type_bits(),
        }
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let mut state = self.lock();
        Self::check(&state, FailPoint::BindBufferMemory)?;
        state.calls.push(Call::BindBufferMemory { buffer, memory, offset });
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.lock().calls.push(Call::DestroyBuffer(buffer));
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image> {
        let mut state = self.lock();
        Self::check(&state, FailPoint::CreateImage)?;
        let image = vk::Image::from_raw(Self::next_raw(&mut state));
        state.image_extents.insert(image.as_raw(), (info.extent.width, info.extent.height));
        state.calls.push(Call::CreateImage {
            image,
            format: info.format,
            width: info.extent.width,
            height: info.extent.height,
            tiling: info.tiling,
            initial_layout: info.initial_layout,
            usage: info.usage,
        });
        Ok(image)
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let state = self.lock();
        let (width, height) = state.image_extents.get(&image.as_raw()).copied().unwrap_or((0, 0));
        let row = vk::DeviceSize::from(width) * 4 + self.row_padding;
        vk::MemoryRequirements {
            size: self.align(row * vk::DeviceSize::from(height)),
            alignment: self.alignment,
            memory_type_bits: self.all_type_bits(),
        }
    }

    fn image_subresource_layout(
        &self,
        image: vk::Image,
        _subresource: vk::ImageSubresource,
    ) -> vk::SubresourceLayout {
        let state = self.lock();
        let (width, height) = state.image_extents.get(&image.as_raw()).copied().unwrap_or((0, 0));
        let row_pitch = vk::DeviceSize::from(width) * 4 + self.row_padding;
        vk::SubresourceLayout {
            offset: 0,
            size: row_pitch * vk::DeviceSize::from(height),
            row_pitch,
            array_pitch: 0,
            depth_pitch: 0,
        }
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.lock().calls.push(Call::BindImageMemory { image, memory, offset });
        Ok(())
    }

    fn destroy_image(&self, image: vk::Image) {
        self.lock().calls.push(Call::DestroyImage(image));
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        let mut state = self.lock();
        Self::check(&state, FailPoint::CreateImageView)?;
        let view = vk::ImageView::from_raw(Self::next_raw(&mut state));
        state.calls.push(Call::CreateImageView { view, image: info.image, format: info.format });
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.lock().calls.push(Call::DestroyImageView(view));
    }

    fn create_sampler(&self, info: &vk::SamplerCreateInfo) -> VkResult<vk::Sampler> {
        let mut state = self.lock();
        Self::check(&state, FailPoint::CreateSampler)?;
        let sampler = vk::Sampler::from_raw(Self::next_raw(&mut state));
        state.calls.push(Call::CreateSampler {
            sampler,
            mag_filter: info.mag_filter,
            min_filter: info.min_filter,
            mipmap_mode: info.mipmap_mode,
            address_modes: [info.address_mode_u, info.address_mode_v, info.address_mode_w],
            anisotropy_enable: info.anisotropy_enable == vk::TRUE,
            compare_enable: info.compare_enable == vk::TRUE,
        });
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.lock().calls.push(Call::DestroySampler(sampler));
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory> {
        let mut state = self.lock();
        Self::check(&state, FailPoint::AllocateMemory)?;
        let memory = vk::DeviceMemory::from_raw(Self::next_raw(&mut state));
        state
            .allocations
            .insert(memory.as_raw(), vec![0u8; info.allocation_size as usize]);
        state.calls.push(Call::AllocateMemory {
            memory,
            size: info.allocation_size,
            memory_type_index: info.memory_type_index,
        });
        Ok(memory)
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.lock();
        state.allocations.remove(&memory.as_raw());
        state.calls.push(Call::FreeMemory(memory));
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        let mut state = self.lock();
        Self::check(&state, FailPoint::MapMemory)?;
        state.calls.push(Call::MapMemory { memory, offset, size });
        let bytes = state
            .allocations
            .get_mut(&memory.as_raw())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        if offset + size > bytes.len() as vk::DeviceSize {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        Ok(bytes[offset as usize..].as_mut_ptr().cast::<c_void>())
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.lock().calls.push(Call::UnmapMemory(memory));
    }

    fn create_fence(&self, _signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.lock();
        let fence = vk::Fence::from_raw(Self::next_raw(&mut state));
        state.calls.push(Call::CreateFence(fence));
        Ok(fence)
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::WaitForFence { fence, timeout_ns });
        match state.fence_results.pop_front().unwrap_or(vk::Result::SUCCESS) {
            vk::Result::SUCCESS => Ok(()),
            other => Err(other),
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.lock().calls.push(Call::DestroyFence(fence));
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.lock().calls.push(Call::ResetCommandBuffer(command_buffer));
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        self.lock().calls.push(Call::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.lock().calls.push(Call::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let mut state = self.lock();
        Self::check(&state, FailPoint::QueueSubmit)?;
        state.calls.push(Call::QueueSubmit { queue, command_buffer, fence });
        Ok(())
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::QueueWaitIdle(queue));
        if state.failures.contains(&FailPoint::QueueWaitIdle) {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        Ok(())
    }

    fn cmd_pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    ) {
        self.lock().calls.push(Call::PipelineBarrier {
            command_buffer,
            src_stage,
            dst_stage,
            image: barrier.image,
            aspect_mask: barrier.subresource_range.aspect_mask,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
            src_access: barrier.src_access_mask,
            dst_access: barrier.dst_access_mask,
        });
    }

    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        region: &vk::BufferImageCopy,
    ) {
        self.lock().calls.push(Call::CopyBufferToImage {
            command_buffer,
            buffer,
            image,
            layout,
            width: region.image_extent.width,
            height: region.image_extent.height,
        });
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.lock().calls.push(Call::BindPipeline { command_buffer, pipeline });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    ) {
        self.lock().calls.push(Call::BindDescriptorSets {
            command_buffer,
            layout,
            sets: sets.to_vec(),
        });
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        self.lock().calls.push(Call::BindVertexBuffers {
            command_buffer,
            first_binding,
            buffers: buffers.to_vec(),
            offsets: offsets.to_vec(),
        });
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        self.lock().calls.push(Call::BindIndexBuffer {
            command_buffer,
            buffer,
            offset,
            index_type,
        });
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.lock().calls.push(Call::PushConstants {
            command_buffer,
            layout,
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn cmd_draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.lock().calls.push(Call::Draw {
            command_buffer,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
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
        self.lock().calls.push(Call::DrawIndexed {
            command_buffer,
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn cmd_draw_indirect(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        self.lock().calls.push(Call::DrawIndirect {
            command_buffer,
            buffer,
            offset,
            draw_count,
            stride,
        });
    }

    fn cmd_draw_indexed_indirect(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        self.lock().calls.push(Call::DrawIndexedIndirect {
            command_buffer,
            buffer,
            offset,
            draw_count,
            stride,
        });
    }
}
