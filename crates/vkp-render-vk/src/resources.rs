// SPDX-License-Identifier: CEPL-1.0
use crate::context::LogicalDevice;
use crate::error::{VkError, VkResultExt};
use crate::select::{MemoryTypeSelector, MemoryTypeTable};
use ash::vk;
use std::mem::{offset_of, size_of, size_of_val};
use tracing::debug;
use vkp_math::{Mat4, Vertex};

pub(crate) const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;

const TRANSFORM_SIZE: usize = size_of::<Mat4>();

pub(crate) fn pick_memory_type(
    selector: &dyn MemoryTypeSelector,
    table: &MemoryTypeTable,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    what: &'static str,
) -> Result<u32, VkError> {
    selector
        .select(table, type_bits, required)
        .ok_or(VkError::NoSuitableMemory { what })
}

/// Device memory allocation through the configured memory-type policy.
pub(crate) struct Allocator<'a> {
    pub device: &'a ash::Device,
    pub table: &'a MemoryTypeTable,
    pub selector: &'a dyn MemoryTypeSelector,
}

impl Allocator<'_> {
    pub unsafe fn allocate(
        &self,
        req: vk::MemoryRequirements,
        required: vk::MemoryPropertyFlags,
        what: &'static str,
    ) -> Result<vk::DeviceMemory, VkError> {
        let index = pick_memory_type(
            self.selector,
            self.table,
            req.memory_type_bits,
            required,
            what,
        )?;
        debug!("{what}: {} bytes from memory type {index}", req.size);
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: index,
            ..Default::default()
        };
        self.device
            .allocate_memory(&mai, None)
            .vk_context("vkAllocateMemory")
    }

    /// Exclusive buffer backed by its own host-visible, coherent allocation.
    unsafe fn host_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        what: &'static str,
    ) -> Result<HostBuffer, VkError> {
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = self
            .device
            .create_buffer(&bci, None)
            .vk_context("vkCreateBuffer")?;
        let mut out = HostBuffer {
            device: self.device.clone(),
            buffer,
            memory: vk::DeviceMemory::null(),
            size,
        };
        let req = self.device.get_buffer_memory_requirements(buffer);
        out.memory = self.allocate(
            req,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            what,
        )?;
        self.device
            .bind_buffer_memory(buffer, out.memory, 0)
            .vk_context("vkBindBufferMemory")?;
        Ok(out)
    }
}

struct HostBuffer {
    device: ash::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl HostBuffer {
    unsafe fn map(&self) -> Result<*mut u8, VkError> {
        let ptr = self
            .device
            .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
            .vk_context("vkMapMemory")?;
        Ok(ptr.cast())
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
            }
        }
    }
}

pub(crate) struct DepthBuffer {
    device: ash::Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

impl DepthBuffer {
    pub unsafe fn new(alloc: &Allocator<'_>, extent: vk::Extent2D) -> Result<Self, VkError> {
        let device = alloc.device;
        let img_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: DEPTH_FORMAT,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = device
            .create_image(&img_ci, None)
            .vk_context("vkCreateImage")?;
        let mut depth = DepthBuffer {
            device: device.clone(),
            image,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
        };

        // any type the image accepts will do
        let mem_req = device.get_image_memory_requirements(image);
        depth.memory = alloc.allocate(mem_req, vk::MemoryPropertyFlags::empty(), "depth buffer")?;
        device
            .bind_image_memory(image, depth.memory, 0)
            .vk_context("vkBindImageMemory")?;

        let view_ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: DEPTH_FORMAT,
            components: vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            },
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        depth.view = device
            .create_image_view(&view_ci, None)
            .vk_context("vkCreateImageView")?;
        Ok(depth)
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            self.device.destroy_image(self.image, None);
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
            }
        }
    }
}

pub(crate) fn write_transform(dst: &mut [u8], transform: &Mat4) {
    dst[..TRANSFORM_SIZE].copy_from_slice(bytemuck::bytes_of(transform));
}

/// One transform matrix in host-coherent memory. Mapped once at creation
/// and left mapped until drop.
pub(crate) struct UniformBuffer {
    buf: HostBuffer,
    mapped: *mut u8,
}

impl UniformBuffer {
    pub unsafe fn new(alloc: &Allocator<'_>, transform: &Mat4) -> Result<Self, VkError> {
        let buf = alloc.host_buffer(
            TRANSFORM_SIZE as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "uniform buffer",
        )?;
        let mapped = buf.map()?;
        let mut ubo = UniformBuffer { buf, mapped };
        ubo.write(transform);
        Ok(ubo)
    }

    fn mapped_bytes(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.mapped, TRANSFORM_SIZE) }
    }

    pub fn write(&mut self, transform: &Mat4) {
        write_transform(self.mapped_bytes(), transform);
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buf.buffer,
            offset: 0,
            range: self.buf.size,
        }
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        unsafe { self.buf.device.unmap_memory(self.buf.memory) };
    }
}

pub(crate) fn vertex_input_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

pub(crate) fn vertex_input_attributes() -> [vk::VertexInputAttributeDescription; 2] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: offset_of!(Vertex, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: offset_of!(Vertex, color) as u32,
        },
    ]
}

pub(crate) struct VertexBuffer {
    buf: HostBuffer,
    vertex_count: u32,
}

impl VertexBuffer {
    pub unsafe fn new(alloc: &Allocator<'_>, vertices: &[Vertex]) -> Result<Self, VkError> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let buf = alloc.host_buffer(
            size_of_val(bytes) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "vertex buffer",
        )?;
        let dst = buf.map()?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        alloc.device.unmap_memory(buf.memory);

        Ok(VertexBuffer {
            buf,
            vertex_count: vertices.len() as u32,
        })
    }

    pub fn raw(&self) -> vk::Buffer {
        self.buf.buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// One framebuffer per swapchain image, all sharing the depth view.
pub(crate) struct Framebuffers {
    device: ash::Device,
    raw: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    pub unsafe fn new(
        dev: &LogicalDevice,
        render_pass: vk::RenderPass,
        color_views: impl Iterator<Item = vk::ImageView>,
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Result<Self, VkError> {
        let mut out = Framebuffers {
            device: dev.raw().clone(),
            raw: Vec::new(),
        };
        for view in color_views {
            let attachments = [view, depth_view];
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = out
                .device
                .create_framebuffer(&fb_info, None)
                .vk_context("vkCreateFramebuffer")?;
            out.raw.push(fb);
        }
        Ok(out)
    }

    pub fn get(&self, image_index: u32) -> vk::Framebuffer {
        self.raw[image_index as usize]
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &fb in &self.raw {
                self.device.destroy_framebuffer(fb, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::FirstMatch;
    use vkp_math::{model_view_projection, Camera, CUBE_SOLID_FACE_COLORS};

    #[test]
    fn host_visible_type_found_by_mask() {
        let hv = vk::MemoryPropertyFlags::HOST_VISIBLE;
        let table = MemoryTypeTable::new(vec![
            hv,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            hv | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let mask = (1 << 1) | (1 << 3);
        assert_eq!(
            pick_memory_type(&FirstMatch, &table, mask, hv, "uniform buffer").unwrap(),
            3
        );
    }

    #[test]
    fn missing_memory_type_names_the_resource() {
        let table = MemoryTypeTable::new(vec![vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = pick_memory_type(
            &FirstMatch,
            &table,
            1,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            "vertex buffer",
        )
        .unwrap_err();
        assert!(matches!(err, VkError::NoSuitableMemory { what: "vertex buffer" }));
    }

    #[test]
    fn depth_buffer_accepts_any_type_in_mask() {
        let table = MemoryTypeTable::new(vec![
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::empty(),
        ]);
        let index =
            pick_memory_type(&FirstMatch, &table, 0b10, vk::MemoryPropertyFlags::empty(), "depth")
                .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn mapped_transform_reads_back_bit_exact() {
        let mvp = model_view_projection(&Camera::default(), Mat4::IDENTITY);
        let mut mapped = vec![0u8; TRANSFORM_SIZE];
        write_transform(&mut mapped, &mvp);
        let back: Mat4 = bytemuck::pod_read_unaligned(&mapped);
        assert_eq!(back.to_cols_array(), mvp.to_cols_array());
    }

    #[test]
    fn uniform_range_is_one_matrix() {
        assert_eq!(TRANSFORM_SIZE, 64);
    }

    #[test]
    fn vertex_layout_matches_cube_table() {
        let binding = vertex_input_binding();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let attrs = vertex_input_attributes();
        assert_eq!((attrs[0].location, attrs[0].offset), (0, 0));
        assert_eq!((attrs[1].location, attrs[1].offset), (1, 16));
        assert!(attrs
            .iter()
            .all(|a| a.format == vk::Format::R32G32B32A32_SFLOAT && a.binding == 0));
        assert_eq!(
            size_of_val(&CUBE_SOLID_FACE_COLORS),
            CUBE_SOLID_FACE_COLORS.len() * binding.stride as usize
        );
    }
}
