// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;
use tracing::info;
use vkp_math::{model_view_projection, Camera, Mat4, CUBE_SOLID_FACE_COLORS};
use vkp_render::{RenderSize, Renderer};

mod context;
mod error;
mod frame;
mod pipeline;
mod recorder;
mod resources;
mod select;
mod swapchain;
mod sync;

use context::{DeviceContext, LogicalDevice};
use pipeline::{DescriptorState, GraphicsPipeline, RenderPass, Shaders};
use recorder::VkFrameTarget;
use resources::{Allocator, DepthBuffer, Framebuffers, UniformBuffer, VertexBuffer, DEPTH_FORMAT};
use swapchain::{Surface, Swapchain};
use sync::SyncPool;

pub use error::{vk_result_message, VkError};
pub use frame::{FenceStatus, FrameDevice, FrameLoop, FrameState};
pub use select::{
    FirstMatch, MemoryTypeSelector, MemoryTypeTable, QueueCaps, QueueFamilyIndices,
    QueueFamilySelector, ScanOrder,
};

/// SPIR-V compiled from the bundled GLSL at build time.
pub const EMBEDDED_VERTEX_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/simple.vert.spv"));
pub const EMBEDDED_FRAGMENT_SPV: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/simple.frag.spv"));

pub struct VkRendererConfig {
    pub app_name: String,
    /// Minimum swapchain depth; also the number of sync slots.
    pub buffer_count: u32,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub clear_color: [f32; 4],
    pub validation: bool,
    /// Bound on each fence poll before it is retried.
    pub fence_timeout_ns: u64,
    pub queue_selector: Box<dyn QueueFamilySelector>,
    pub memory_selector: Box<dyn MemoryTypeSelector>,
}

impl Default for VkRendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Vulkan Practice".to_string(),
            buffer_count: 2,
            vertex_shader: PathBuf::from("simple.vert.spv"),
            fragment_shader: PathBuf::from("simple.frag.spv"),
            clear_color: [0.2, 0.2, 0.2, 0.2],
            validation: false,
            fence_timeout_ns: 100_000_000,
            queue_selector: Box::new(ScanOrder),
            memory_selector: Box::new(FirstMatch),
        }
    }
}

/// Camera framing the cube at the swapchain's aspect ratio.
fn cube_transform(extent: RenderSize) -> Mat4 {
    let camera = Camera {
        aspect: extent.width as f32 / extent.height.max(1) as f32,
        ..Camera::default()
    };
    model_view_projection(&camera, Mat4::IDENTITY)
}

/// Everything needed to draw the cube. Fields drop top to bottom, which is
/// the reverse of the order `build` creates them in.
pub struct VkRenderer {
    frame: FrameLoop,
    clear_color: [f32; 4],

    sync: SyncPool,
    pipeline: GraphicsPipeline,
    vertices: VertexBuffer,
    framebuffers: Framebuffers,
    _shaders: Shaders,
    render_pass: RenderPass,
    descriptors: DescriptorState,
    _uniform: UniformBuffer,
    _depth: DepthBuffer,
    swapchain: Swapchain,

    device: LogicalDevice,
    _surface: Surface,
    _ctx: DeviceContext,
}

impl VkRenderer {
    unsafe fn build(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: VkRendererConfig,
    ) -> Result<Self, VkError> {
        let display_raw = display.display_handle()?.as_raw();
        let window_raw = window.window_handle()?.as_raw();

        let ctx = DeviceContext::new(display_raw, &cfg.app_name, cfg.validation)?;
        let surface = Surface::create(&ctx, display_raw, window_raw)?;
        let indices = surface.find_graphics_and_present_queue(&ctx, cfg.queue_selector.as_ref())?;
        let device = LogicalDevice::new(&ctx, indices)?;

        let swapchain = Swapchain::setup(
            &ctx,
            &device,
            &surface,
            cfg.buffer_count,
            size.width,
            size.height,
        )?;
        let extent = swapchain.extent();

        let alloc = Allocator {
            device: device.raw(),
            table: ctx.memory_types(),
            selector: cfg.memory_selector.as_ref(),
        };
        let depth = DepthBuffer::new(&alloc, extent)?;
        let uniform = UniformBuffer::new(
            &alloc,
            &cube_transform(RenderSize {
                width: extent.width,
                height: extent.height,
            }),
        )?;
        let descriptors = DescriptorState::new(&device, uniform.descriptor_info())?;
        let render_pass = RenderPass::new(&device, swapchain.format(), DEPTH_FORMAT)?;
        let shaders = Shaders::load(&device, &cfg.vertex_shader, &cfg.fragment_shader)?;
        let framebuffers = Framebuffers::new(
            &device,
            render_pass.raw(),
            swapchain.views(),
            depth.view(),
            extent,
        )?;
        let vertices = VertexBuffer::new(&alloc, &CUBE_SOLID_FACE_COLORS)?;
        let pipeline = GraphicsPipeline::new(
            &device,
            &shaders,
            descriptors.pipeline_layout(),
            &render_pass,
        )?;
        let sync = SyncPool::new(&device, cfg.buffer_count as usize)?;
        info!(
            "renderer ready: {} sync slots, {} vertices",
            sync.len(),
            vertices.vertex_count()
        );

        Ok(VkRenderer {
            frame: FrameLoop::new(sync.len(), cfg.fence_timeout_ns),
            clear_color: cfg.clear_color,
            sync,
            pipeline,
            vertices,
            framebuffers,
            _shaders: shaders,
            render_pass,
            descriptors,
            _uniform: uniform,
            _depth: depth,
            swapchain,
            device,
            _surface: surface,
            _ctx: ctx,
        })
    }

    pub fn extent(&self) -> RenderSize {
        let e = self.swapchain.extent();
        RenderSize {
            width: e.width,
            height: e.height,
        }
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frame.frames()
    }
}

impl Renderer for VkRenderer {
    type Config = VkRendererConfig;

    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: VkRendererConfig,
    ) -> Result<Self> {
        let renderer = unsafe { Self::build(window, display, size, config) };
        renderer.context("Vulkan renderer setup")
    }

    fn render(&mut self) -> Result<()> {
        let mut target = VkFrameTarget {
            dev: &self.device,
            swapchain: &self.swapchain,
            sync: &self.sync,
            render_pass: &self.render_pass,
            framebuffers: &self.framebuffers,
            descriptors: &self.descriptors,
            pipeline: &self.pipeline,
            vertices: &self.vertices,
            clear_color: self.clear_color,
        };
        let frame = self.frame.frames();
        self.frame
            .render(&mut target)
            .with_context(|| format!("render frame {frame}"))?;
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().device_wait_idle().ok();
        }
    }
}
