//! Named texture registry
//!
//! Owns every sampled 2D texture for the lifetime of the graphics stack: a
//! fixed pool of samplers plus one image, memory block and view per name.
//! Textures are uploaded once at initialization and looked up by name at draw
//! time; nothing here is loaded lazily.
//!
//! Two upload paths exist, chosen per format from the device's reported
//! features:
//!
//! - **Staged**: the format cannot be sampled with linear tiling. Pixels go
//!   into a transient host-visible buffer, then a one-shot command buffer moves
//!   an optimally tiled device-local image UNDEFINED -> TRANSFER_DST, copies,
//!   and moves it to SHADER_READ_ONLY.
//! - **Linear**: pixels are written straight into a linearly tiled,
//!   host-visible image created in the PREINITIALIZED layout.

use ash::vk;
use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::TextureData;
use crate::render::vulkan::barrier::set_image_layout;
use crate::render::vulkan::buffer::{upload_buffer, BufferUsage};
use crate::render::vulkan::memory::DeviceAllocation;
use crate::render::vulkan::sync::UploadContext;
use crate::render::vulkan::{GpuDevice, VulkanError, VulkanResult};

/// How a texture's pixels reached the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPath {
    /// Copied through a staging buffer into an optimally tiled image
    Staged,
    /// Written directly into a linearly tiled host-visible image
    Linear,
}

/// One uploaded texture
#[derive(Debug, Clone, Copy)]
pub struct Texture {
    /// Image handle
    pub image: vk::Image,
    /// Backing memory, owned by this texture
    pub allocation: DeviceAllocation,
    /// View over mip 0, layer 0
    pub view: vk::ImageView,
    /// Pixel format
    pub format: vk::Format,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Layout the image was left in after upload
    pub layout: vk::ImageLayout,
    /// Upload path taken
    pub path: UploadPath,
}

impl Texture {
    /// Layout to advertise in descriptor writes.
    ///
    /// A linear image that was never transitioned is still PREINITIALIZED,
    /// which descriptors cannot name, so it is advertised as GENERAL.
    pub fn descriptor_layout(&self) -> vk::ImageLayout {
        if self.layout == vk::ImageLayout::PREINITIALIZED {
            vk::ImageLayout::GENERAL
        } else {
            self.layout
        }
    }
}

/// Registry of named textures and the shared sampler pool
pub struct TextureRegistry {
    device: Arc<dyn GpuDevice>,
    upload: UploadContext,
    transition_linear_images: bool,
    samplers: Vec<vk::Sampler>,
    names: Vec<String>,
    textures: HashMap<String, Texture>,
}

impl TextureRegistry {
    /// Create an empty registry uploading through `upload`
    pub fn new(
        device: Arc<dyn GpuDevice>,
        upload: UploadContext,
        transition_linear_images: bool,
    ) -> Self {
        Self {
            device,
            upload,
            transition_linear_images,
            samplers: Vec::new(),
            names: Vec::new(),
            textures: HashMap::new(),
        }
    }

    /// Build the sampler pool: linear magnification, nearest minification and
    /// mipmapping, clamp-to-edge on every axis, no anisotropy or comparison.
    pub fn init_samplers(&mut self, count: u32) -> VulkanResult<()> {
        if !self.samplers.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "samplers already initialized".to_string(),
            });
        }

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .mip_lod_bias(0.0)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .unnormalized_coordinates(false);

        for _ in 0..count {
            let sampler = self.device.create_sampler(&sampler_info).map_err(VulkanError::Api)?;
            self.samplers.push(sampler);
        }
        log::debug!("Created {} texture samplers", count);
        Ok(())
    }

    /// Upload `data` as texture `name` and register it.
    ///
    /// The decoded pixels are consumed; they are dropped once the upload
    /// completes.
    pub fn init_texture(
        &mut self,
        name: &str,
        format: vk::Format,
        data: TextureData,
    ) -> VulkanResult<()> {
        if self.textures.contains_key(name) {
            return Err(VulkanError::DuplicateTexture { name: name.to_string() });
        }
        if !data.is_consistent() {
            return Err(VulkanError::InvalidTextureData {
                width: data.width,
                height: data.height,
                expected: data.row_bytes() * data.height as usize,
                actual: data.byte_count(),
            });
        }

        let linear_sampled = self
            .device
            .format_properties(format)
            .linear_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE);

        let (image, allocation, layout, path) = if linear_sampled {
            let (image, allocation, layout) = self.upload_linear(format, &data)?;
            (image, allocation, layout, UploadPath::Linear)
        } else {
            let (image, allocation) = self.upload_staged(format, &data)?;
            (image, allocation, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, UploadPath::Staged)
        };

        let view = match self.create_view(image, format) {
            Ok(view) => view,
            Err(err) => {
                self.discard_image(image, Some(allocation));
                return Err(err);
            }
        };

        log::info!(
            "Uploaded texture '{}' ({}x{}, {:?} path, layout {:?})",
            name,
            data.width,
            data.height,
            path,
            layout
        );

        self.names.push(name.to_string());
        self.textures.insert(
            name.to_string(),
            Texture {
                image,
                allocation,
                view,
                format,
                width: data.width,
                height: data.height,
                layout,
                path,
            },
        );
        Ok(())
    }

    /// Position of `name` in registration order, used as its descriptor array index
    pub fn descriptor_index(&self, name: &str) -> VulkanResult<usize> {
        self.names
            .iter()
            .position(|registered| registered == name)
            .ok_or_else(|| VulkanError::TextureNotFound { name: name.to_string() })
    }

    /// Descriptor image info for `name`, paired with the first pool sampler
    pub fn image_info(&self, name: &str) -> VulkanResult<vk::DescriptorImageInfo> {
        let texture = self.get(name)?;
        let sampler = self.samplers.first().copied().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "samplers not initialized".to_string(),
        })?;
        Ok(vk::DescriptorImageInfo {
            sampler,
            image_view: texture.view,
            image_layout: texture.descriptor_layout(),
        })
    }

    /// Look up a registered texture
    pub fn get(&self, name: &str) -> VulkanResult<&Texture> {
        self.textures
            .get(name)
            .ok_or_else(|| VulkanError::TextureNotFound { name: name.to_string() })
    }

    /// Sampler pool, in creation order
    pub fn samplers(&self) -> &[vk::Sampler] {
        &self.samplers
    }

    /// Texture names in registration order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of registered textures
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no texture has been registered
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Destroy every sampler, then every texture's view, image and memory in
    /// registration order. Safe to call more than once.
    pub fn destroy_all(&mut self) {
        for sampler in self.samplers.drain(..) {
            self.device.destroy_sampler(sampler);
        }
        for name in self.names.drain(..) {
            if let Some(texture) = self.textures.remove(&name) {
                self.device.destroy_image_view(texture.view);
                self.device.destroy_image(texture.image);
                texture.allocation.free(self.device.as_ref());
                log::debug!("Destroyed texture '{}'", name);
            }
        }
    }

    fn upload_staged(
        &self,
        format: vk::Format,
        data: &TextureData,
    ) -> VulkanResult<(vk::Image, DeviceAllocation)> {
        let mut staging =
            upload_buffer(Arc::clone(&self.device), BufferUsage::Staging, &data.pixels)?;

        let image_info = image_create_info(
            format,
            data,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageLayout::UNDEFINED,
        );
        let (image, allocation) =
            self.create_image(&image_info, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;

        let staging_handle = staging.handle();
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: data.width,
                height: data.height,
                depth: 1,
            },
        };

        let submitted = self.upload.submit_one_shot(|device, cmd| {
            set_image_layout(
                device,
                cmd,
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            device.cmd_copy_buffer_to_image(
                cmd,
                staging_handle,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &region,
            );
            set_image_layout(
                device,
                cmd,
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        });

        match submitted {
            Err(err @ VulkanError::SubmissionStalled { .. }) => {
                log::error!(
                    "Leaking staging buffer {:?} and image {:?} held by a pending upload",
                    staging_handle,
                    image
                );
                std::mem::forget(staging);
                Err(err)
            }
            Err(err) => {
                staging.destroy();
                self.discard_image(image, Some(allocation));
                Err(err)
            }
            Ok(()) => {
                staging.destroy();
                Ok((image, allocation))
            }
        }
    }

    fn upload_linear(
        &self,
        format: vk::Format,
        data: &TextureData,
    ) -> VulkanResult<(vk::Image, DeviceAllocation, vk::ImageLayout)> {
        let image_info = image_create_info(
            format,
            data,
            vk::ImageTiling::LINEAR,
            vk::ImageUsageFlags::SAMPLED,
            vk::ImageLayout::PREINITIALIZED,
        );
        let (image, allocation) = self.create_image(
            &image_info,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        if let Err(err) = self.write_linear_pixels(image, &allocation, data) {
            self.discard_image(image, Some(allocation));
            return Err(err);
        }

        if !self.transition_linear_images {
            return Ok((image, allocation, vk::ImageLayout::PREINITIALIZED));
        }

        let transitioned = self.upload.submit_one_shot(|device, cmd| {
            set_image_layout(
                device,
                cmd,
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::PREINITIALIZED,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        });
        match transitioned {
            Err(err @ VulkanError::SubmissionStalled { .. }) => {
                log::error!("Leaking image {:?} still referenced by a pending transition", image);
                return Err(err);
            }
            Err(err) => {
                self.discard_image(image, Some(allocation));
                return Err(err);
            }
            Ok(()) => {}
        }
        Ok((image, allocation, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL))
    }

    /// Copy tightly packed rows into a mapped linear image honouring its row pitch
    fn write_linear_pixels(
        &self,
        image: vk::Image,
        allocation: &DeviceAllocation,
        data: &TextureData,
    ) -> VulkanResult<()> {
        let layout = self.device.image_subresource_layout(
            image,
            vk::ImageSubresource {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                array_layer: 0,
            },
        );

        let row_bytes = data.row_bytes();
        let rows = data.height as usize;
        let needed = layout.offset
            + layout.row_pitch * (rows as vk::DeviceSize - 1)
            + row_bytes as vk::DeviceSize;
        if layout.row_pitch < row_bytes as vk::DeviceSize || needed > allocation.size {
            return Err(VulkanError::BufferOverflow {
                capacity: allocation.size,
                requested: needed,
            });
        }

        let offset = layout.offset as usize;
        let pitch = layout.row_pitch as usize;
        allocation.with_mapped(self.device.as_ref(), |ptr| {
            for (row, src) in data.pixels.chunks_exact(row_bytes).enumerate() {
                // SAFETY: the last row ends at `needed`, checked against the mapping
                unsafe {
                    let dst = ptr.add(offset + row * pitch);
                    std::ptr::copy_nonoverlapping(src.as_ptr(), dst, row_bytes);
                }
            }
        })
    }

    fn create_image(
        &self,
        info: &vk::ImageCreateInfo,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<(vk::Image, DeviceAllocation)> {
        let image = self.device.create_image(info).map_err(VulkanError::Api)?;
        let requirements = self.device.image_memory_requirements(image);

        let allocated = DeviceAllocation::allocate(self.device.as_ref(), requirements, properties);
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(err) => {
                self.discard_image(image, None);
                return Err(err);
            }
        };
        if let Err(result) = self.device.bind_image_memory(image, allocation.memory, 0) {
            self.discard_image(image, Some(allocation));
            return Err(VulkanError::Api(result));
        }
        Ok((image, allocation))
    }

    fn create_view(&self, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        self.device.create_image_view(&view_info).map_err(VulkanError::Api)
    }

    fn discard_image(&self, image: vk::Image, allocation: Option<DeviceAllocation>) {
        self.device.destroy_image(image);
        if let Some(allocation) = allocation {
            allocation.free(self.device.as_ref());
        }
    }
}

impl Drop for TextureRegistry {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

fn image_create_info(
    format: vk::Format,
    data: &TextureData,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    initial_layout: vk::ImageLayout,
) -> vk::ImageCreateInfo {
    vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: data.width,
            height: data.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(tiling)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(initial_layout)
        .build()
}
