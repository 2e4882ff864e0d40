//! Drawable objects: one mesh's GPU buffers plus its draw submission
//!
//! Each object owns a vertex buffer and, depending on the [`DrawConfig`] it was
//! built with, an index buffer and/or an indirect command buffer. The draw
//! strategy is fixed at construction; every draw binds the pipeline,
//! descriptor set and vertex buffer, pushes the transform payload to the
//! vertex stage, then submits according to that strategy.
//!
//! [`DrawableObject::draw`] submits everything the object holds. Indexed
//! objects can also draw a sub-range of their indices with
//! [`DrawableObject::draw_index_range`], and indirect objects a single
//! command record with [`DrawableObject::draw_record`].

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;
use std::ops::Range;
use std::sync::Arc;

use crate::foundation::math::TransformSource;
use crate::render::vulkan::{
    upload_buffer, Buffer, BufferUsage, GpuDevice, VulkanError, VulkanResult,
};

/// Push constant payload size in bytes
pub const PUSH_CONSTANT_SIZE: usize = size_of::<PushConstants>();

/// Per-draw vertex stage payload: final MVP then model matrix, both column-major
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    /// Projection * view * model
    pub mvp: [f32; 16],
    /// Model matrix alone, for lighting in world space
    pub model: [f32; 16],
}

impl PushConstants {
    /// Snapshot the current transforms
    pub fn from_transforms(transforms: &dyn TransformSource) -> Self {
        Self {
            mvp: transforms.final_matrix(),
            model: transforms.model_matrix(),
        }
    }

    /// Raw bytes as pushed to the pipeline
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for PushConstants {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Layout of `VkDrawIndirectCommand`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectCommand {
    /// Vertices per instance
    pub vertex_count: u32,
    /// Instances to draw
    pub instance_count: u32,
    /// First vertex in the bound vertex buffer
    pub first_vertex: u32,
    /// First instance ID
    pub first_instance: u32,
}

/// Layout of `VkDrawIndexedIndirectCommand`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectCommand {
    /// Indices per instance
    pub index_count: u32,
    /// Instances to draw
    pub instance_count: u32,
    /// First index in the bound index buffer
    pub first_index: u32,
    /// Added to each index before fetching the vertex
    pub vertex_offset: i32,
    /// First instance ID
    pub first_instance: u32,
}

/// Index data in either supported width
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indices {
    /// 16-bit indices
    U16(Vec<u16>),
    /// 32-bit indices
    U32(Vec<u32>),
}

impl Indices {
    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            Self::U16(indices) => indices.len(),
            Self::U32(indices) => indices.len(),
        }
    }

    /// Whether there are no indices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vulkan index type matching the width
    pub fn index_type(&self) -> vk::IndexType {
        match self {
            Self::U16(_) => vk::IndexType::UINT16,
            Self::U32(_) => vk::IndexType::UINT32,
        }
    }

    /// Raw bytes as uploaded to the index buffer
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U16(indices) => bytemuck::cast_slice(indices),
            Self::U32(indices) => bytemuck::cast_slice(indices),
        }
    }
}

/// How an object submits its geometry
#[derive(Debug, Clone, PartialEq)]
pub enum DrawConfig {
    /// `vkCmdDraw` over every vertex, one instance
    Direct,
    /// `vkCmdDrawIndexed` over every index, one instance
    Indexed {
        /// Index data
        indices: Indices,
    },
    /// One `vkCmdDrawIndirect` per command record
    Indirect {
        /// Command records, written once into an indirect buffer
        commands: Vec<DrawIndirectCommand>,
    },
    /// One `vkCmdDrawIndexedIndirect` per command record
    IndexedIndirect {
        /// Index data
        indices: Indices,
        /// Command records, written once into an indirect buffer
        commands: Vec<DrawIndexedIndirectCommand>,
    },
}

enum DrawStrategy {
    Direct,
    Indexed {
        index_buffer: Buffer,
        index_count: u32,
        index_type: vk::IndexType,
    },
    Indirect {
        command_buffer: Buffer,
        command_count: u32,
    },
    IndexedIndirect {
        index_buffer: Buffer,
        index_type: vk::IndexType,
        command_buffer: Buffer,
        command_count: u32,
    },
}

impl DrawStrategy {
    fn build(device: &Arc<dyn GpuDevice>, config: DrawConfig) -> VulkanResult<Self> {
        Ok(match config {
            DrawConfig::Direct => Self::Direct,
            DrawConfig::Indexed { indices } => {
                let index_buffer = upload_indices(device, &indices)?;
                Self::Indexed {
                    index_buffer,
                    index_count: count_u32(indices.len())?,
                    index_type: indices.index_type(),
                }
            }
            DrawConfig::Indirect { commands } => Self::Indirect {
                command_buffer: upload_commands(device, &commands)?,
                command_count: count_u32(commands.len())?,
            },
            DrawConfig::IndexedIndirect { indices, commands } => Self::IndexedIndirect {
                index_buffer: upload_indices(device, &indices)?,
                index_type: indices.index_type(),
                command_buffer: upload_commands(device, &commands)?,
                command_count: count_u32(commands.len())?,
            },
        })
    }

    fn index_buffer(&self) -> Option<(&Buffer, vk::IndexType)> {
        match self {
            Self::Indexed { index_buffer, index_type, .. }
            | Self::IndexedIndirect { index_buffer, index_type, .. } => {
                Some((index_buffer, *index_type))
            }
            Self::Direct | Self::Indirect { .. } => None,
        }
    }

    fn command_count(&self) -> Option<u32> {
        match self {
            Self::Indirect { command_count, .. } | Self::IndexedIndirect { command_count, .. } => {
                Some(*command_count)
            }
            Self::Direct | Self::Indexed { .. } => None,
        }
    }

    /// One indirect draw reading record `record`
    fn submit_record(
        &self,
        device: &dyn GpuDevice,
        command_buffer: vk::CommandBuffer,
        record: u32,
    ) {
        match self {
            Self::Indirect { command_buffer: commands, .. } => {
                let stride = size_of::<DrawIndirectCommand>() as u32;
                let offset = vk::DeviceSize::from(record) * vk::DeviceSize::from(stride);
                device.cmd_draw_indirect(command_buffer, commands.handle(), offset, 1, stride);
            }
            Self::IndexedIndirect { command_buffer: commands, .. } => {
                let stride = size_of::<DrawIndexedIndirectCommand>() as u32;
                let offset = vk::DeviceSize::from(record) * vk::DeviceSize::from(stride);
                device.cmd_draw_indexed_indirect(
                    command_buffer,
                    commands.handle(),
                    offset,
                    1,
                    stride,
                );
            }
            Self::Direct | Self::Indexed { .. } => {}
        }
    }

    fn destroy(&mut self) {
        match self {
            Self::Direct => {}
            Self::Indexed { index_buffer, .. } => index_buffer.destroy(),
            Self::Indirect { command_buffer, .. } => command_buffer.destroy(),
            Self::IndexedIndirect {
                index_buffer,
                command_buffer,
                ..
            } => {
                index_buffer.destroy();
                command_buffer.destroy();
            }
        }
    }
}

/// A mesh ready to draw
pub struct DrawableObject {
    device: Arc<dyn GpuDevice>,
    vertex_buffer: Buffer,
    vertex_count: u32,
    strategy: DrawStrategy,
    push_constants: PushConstants,
}

impl DrawableObject {
    /// Upload `vertex_bytes` (holding `vertex_count` vertices) and whatever
    /// index or command data `config` carries into host-visible buffers.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        vertex_bytes: &[u8],
        vertex_count: u32,
        config: DrawConfig,
    ) -> VulkanResult<Self> {
        if vertex_count == 0 || vertex_bytes.len() % vertex_count as usize != 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{} vertex bytes do not divide into {} vertices",
                    vertex_bytes.len(),
                    vertex_count
                ),
            });
        }

        let vertex_buffer = upload_buffer(Arc::clone(&device), BufferUsage::Vertex, vertex_bytes)?;
        let strategy = DrawStrategy::build(&device, config)?;

        log::debug!(
            "Created drawable with {} vertices ({} bytes)",
            vertex_count,
            vertex_bytes.len()
        );

        Ok(Self {
            device,
            vertex_buffer,
            vertex_count,
            strategy,
            push_constants: PushConstants::default(),
        })
    }

    /// Record this object's draw into `command_buffer`.
    ///
    /// The push constant payload is rebuilt from `transforms` on every call.
    /// Indexed objects draw every index; indirect objects issue one draw per
    /// command record.
    pub fn draw(
        &mut self,
        command_buffer: vk::CommandBuffer,
        pipeline_layout: vk::PipelineLayout,
        pipeline: vk::Pipeline,
        descriptor_set: vk::DescriptorSet,
        transforms: &dyn TransformSource,
    ) {
        self.bind_and_push(command_buffer, pipeline_layout, pipeline, descriptor_set, transforms);

        let device = self.device.as_ref();
        match &self.strategy {
            DrawStrategy::Direct => {
                device.cmd_draw(command_buffer, self.vertex_count, 1, 0, 0);
            }
            DrawStrategy::Indexed { index_count, .. } => {
                device.cmd_draw_indexed(command_buffer, *index_count, 1, 0, 0, 0);
            }
            DrawStrategy::Indirect { command_count, .. }
            | DrawStrategy::IndexedIndirect { command_count, .. } => {
                for record in 0..*command_count {
                    self.strategy.submit_record(device, command_buffer, record);
                }
            }
        }
    }

    /// Draw the indices in `indices` only, one instance.
    ///
    /// Only valid for [`DrawConfig::Indexed`] objects; the range must lie
    /// within the uploaded indices. Nothing is recorded when validation fails.
    pub fn draw_index_range(
        &mut self,
        command_buffer: vk::CommandBuffer,
        pipeline_layout: vk::PipelineLayout,
        pipeline: vk::Pipeline,
        descriptor_set: vk::DescriptorSet,
        transforms: &dyn TransformSource,
        indices: Range<u32>,
    ) -> VulkanResult<()> {
        let DrawStrategy::Indexed { index_count, .. } = &self.strategy else {
            return Err(VulkanError::InvalidOperation {
                reason: "index range draws need an indexed drawable".to_string(),
            });
        };
        if indices.start > indices.end || indices.end > *index_count {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "index range {}..{} outside {} indices",
                    indices.start, indices.end, index_count
                ),
            });
        }

        self.bind_and_push(command_buffer, pipeline_layout, pipeline, descriptor_set, transforms);
        self.device.cmd_draw_indexed(
            command_buffer,
            indices.end - indices.start,
            1,
            indices.start,
            0,
            0,
        );
        Ok(())
    }

    /// Draw a single command record of an indirect object.
    ///
    /// Nothing is recorded when the object has no command records or `record`
    /// is out of range.
    pub fn draw_record(
        &mut self,
        command_buffer: vk::CommandBuffer,
        pipeline_layout: vk::PipelineLayout,
        pipeline: vk::Pipeline,
        descriptor_set: vk::DescriptorSet,
        transforms: &dyn TransformSource,
        record: u32,
    ) -> VulkanResult<()> {
        let Some(command_count) = self.strategy.command_count() else {
            return Err(VulkanError::InvalidOperation {
                reason: "record draws need an indirect drawable".to_string(),
            });
        };
        if record >= command_count {
            return Err(VulkanError::InvalidOperation {
                reason: format!("command record {record} outside {command_count} records"),
            });
        }

        self.bind_and_push(command_buffer, pipeline_layout, pipeline, descriptor_set, transforms);
        self.strategy.submit_record(self.device.as_ref(), command_buffer, record);
        Ok(())
    }

    /// Bind pipeline, descriptor set, vertex and index buffers, then push the
    /// transform payload
    fn bind_and_push(
        &mut self,
        command_buffer: vk::CommandBuffer,
        pipeline_layout: vk::PipelineLayout,
        pipeline: vk::Pipeline,
        descriptor_set: vk::DescriptorSet,
        transforms: &dyn TransformSource,
    ) {
        let device = self.device.as_ref();

        device.cmd_bind_pipeline(command_buffer, pipeline);
        device.cmd_bind_descriptor_sets(command_buffer, pipeline_layout, &[descriptor_set]);
        device.cmd_bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer.handle()], &[0]);

        self.push_constants = PushConstants::from_transforms(transforms);
        device.cmd_push_constants(
            command_buffer,
            pipeline_layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            self.push_constants.as_bytes(),
        );

        if let Some((index_buffer, index_type)) = self.strategy.index_buffer() {
            device.cmd_bind_index_buffer(command_buffer, index_buffer.handle(), 0, index_type);
        }
    }

    /// Payload pushed by the most recent draw
    pub fn push_constants(&self) -> &PushConstants {
        &self.push_constants
    }

    /// Vertices in the vertex buffer
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Vertex buffer handle and allocation
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    /// Release the vertex buffer and any index or command buffers
    pub fn destroy(&mut self) {
        self.vertex_buffer.destroy();
        self.strategy.destroy();
    }
}

fn upload_indices(device: &Arc<dyn GpuDevice>, indices: &Indices) -> VulkanResult<Buffer> {
    if indices.is_empty() {
        return Err(VulkanError::InvalidOperation {
            reason: "indexed draw needs at least one index".to_string(),
        });
    }
    upload_buffer(Arc::clone(device), BufferUsage::Index, indices.as_bytes())
}

fn upload_commands<T: Pod>(device: &Arc<dyn GpuDevice>, commands: &[T]) -> VulkanResult<Buffer> {
    if commands.is_empty() {
        return Err(VulkanError::InvalidOperation {
            reason: "indirect draw needs at least one command record".to_string(),
        });
    }
    upload_buffer(Arc::clone(device), BufferUsage::Indirect, bytemuck::cast_slice(commands))
}

fn count_u32(len: usize) -> VulkanResult<u32> {
    u32::try_from(len).map_err(|_| VulkanError::InvalidOperation {
        reason: format!("{len} elements exceed a 32-bit draw count"),
    })
}
