// SPDX-License-Identifier: CEPL-1.0
use crate::context::LogicalDevice;
use crate::error::{VkError, VkResultExt};
use crate::frame::{FenceStatus, FrameDevice};
use crate::pipeline::{DescriptorState, GraphicsPipeline, RenderPass};
use crate::resources::{Framebuffers, VertexBuffer};
use crate::swapchain::Swapchain;
use crate::sync::SyncPool;
use ash::prelude::VkResult;
use ash::vk;

pub(crate) fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

pub(crate) fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub(crate) fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Maps a bounded `vkWaitForFences` result onto the frame loop's view of it.
pub(crate) fn fence_status(waited: VkResult<()>) -> Result<FenceStatus, VkError> {
    match waited {
        Ok(()) => Ok(FenceStatus::Signaled),
        Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(FenceStatus::NotReady),
        Err(result) => Err(VkError::Vk {
            call: "vkWaitForFences",
            result,
        }),
    }
}

/// Borrowed view of everything a frame touches on the device.
pub(crate) struct VkFrameTarget<'a> {
    pub dev: &'a LogicalDevice,
    pub swapchain: &'a Swapchain,
    pub sync: &'a SyncPool,
    pub render_pass: &'a RenderPass,
    pub framebuffers: &'a Framebuffers,
    pub descriptors: &'a DescriptorState,
    pub pipeline: &'a GraphicsPipeline,
    pub vertices: &'a VertexBuffer,
    pub clear_color: [f32; 4],
}

impl FrameDevice for VkFrameTarget<'_> {
    fn acquire(&mut self, slot: usize) -> Result<u32, VkError> {
        unsafe {
            self.swapchain
                .acquire_next_image(self.sync.image_acquired(slot))
        }
    }

    fn record(&mut self, image: u32) -> Result<(), VkError> {
        let d = self.dev.raw();
        let cmd = self.dev.command_buffer();
        let extent = self.swapchain.extent();

        unsafe {
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)
                .vk_context("vkBeginCommandBuffer")?;

            let clears = clear_values(self.clear_color);
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: self.render_pass.raw(),
                framebuffer: self.framebuffers.get(image),
                render_area: full_scissor(extent),
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);

            d.cmd_bind_vertex_buffers(cmd, 0, &[self.vertices.raw()], &[0]);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.raw());
            d.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.descriptors.pipeline_layout(),
                0,
                &[self.descriptors.set()],
                &[],
            );
            d.cmd_set_viewport(cmd, 0, &[full_viewport(extent)]);
            d.cmd_set_scissor(cmd, 0, &[full_scissor(extent)]);
            d.cmd_draw(cmd, self.vertices.vertex_count(), 1, 0, 0);

            d.cmd_end_render_pass(cmd);
            d.end_command_buffer(cmd).vk_context("vkEndCommandBuffer")?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<(), VkError> {
        let cmd = self.dev.command_buffer();
        let wait_sem = self.sync.image_acquired(slot);
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait_sem,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        unsafe {
            self.dev
                .raw()
                .queue_submit(
                    self.dev.graphics_queue(),
                    std::slice::from_ref(&submit),
                    self.sync.draw_done(slot),
                )
                .vk_context("vkQueueSubmit")
        }
    }

    fn wait(&mut self, slot: usize, timeout_ns: u64) -> Result<FenceStatus, VkError> {
        let fence = self.sync.draw_done(slot);
        fence_status(unsafe { self.dev.raw().wait_for_fences(&[fence], true, timeout_ns) })
    }

    fn present(&mut self, image: u32) -> Result<(), VkError> {
        unsafe { self.swapchain.present(self.dev.present_queue(), image) }
    }

    fn release(&mut self, slot: usize) -> Result<(), VkError> {
        unsafe {
            self.dev
                .raw()
                .reset_fences(&[self.sync.draw_done(slot)])
                .vk_context("vkResetFences")
        }
    }
}
