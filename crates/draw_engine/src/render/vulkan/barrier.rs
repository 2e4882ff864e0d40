//! Image layout transitions
//!
//! Every transition is recorded as a single image memory barrier spanning
//! TOP_OF_PIPE to TOP_OF_PIPE. Access masks come from a fixed table keyed on the
//! (old, new) layout pair.

use ash::vk;
use crate::render::vulkan::GpuDevice;

/// Source and destination access masks for a layout transition.
///
/// Pairs the table does not name leave both masks empty.
pub fn access_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> (vk::AccessFlags, vk::AccessFlags) {
    let src_access = if new_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL {
        vk::AccessFlags::HOST_WRITE | vk::AccessFlags::TRANSFER_WRITE
    } else {
        match old_layout {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
            vk::ImageLayout::PREINITIALIZED => vk::AccessFlags::HOST_WRITE,
            _ => vk::AccessFlags::empty(),
        }
    };

    let dst_access = match new_layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        _ => vk::AccessFlags::empty(),
    };

    (src_access, dst_access)
}

/// Build the barrier for moving mip level 0, layer 0 of `image` between layouts
pub fn layout_barrier(
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> vk::ImageMemoryBarrier {
    let (src_access_mask, dst_access_mask) = access_masks(old_layout, new_layout);

    vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access_mask)
        .dst_access_mask(dst_access_mask)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}

/// Record a layout transition for `image` into `command_buffer`
pub fn set_image_layout(
    device: &dyn GpuDevice,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let barrier = layout_barrier(image, aspect_mask, old_layout, new_layout);
    device.cmd_pipeline_barrier(
        command_buffer,
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TOP_OF_PIPE,
        &barrier,
    );
}
