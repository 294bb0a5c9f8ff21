// SPDX-License-Identifier: CEPL-1.0
use crate::context::LogicalDevice;
use crate::error::{VkError, VkResultExt};
use crate::resources::{vertex_input_attributes, vertex_input_binding};
use ash::util::read_spv;
use ash::vk;
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use tracing::info;

const ENTRY_POINT: &CStr = c"main";

pub(crate) const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Whole-file read of a SPIR-V binary into aligned words.
pub(crate) fn load_spirv(path: &Path) -> Result<Vec<u32>, VkError> {
    let shader_err = |source| VkError::Shader {
        path: path.to_path_buf(),
        source,
    };
    let bytes = std::fs::read(path).map_err(shader_err)?;
    read_spv(&mut Cursor::new(&bytes[..])).map_err(shader_err)
}

pub(crate) struct Shaders {
    device: ash::Device,
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
}

impl Shaders {
    pub unsafe fn load(
        dev: &LogicalDevice,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> Result<Self, VkError> {
        let vs_code = load_spirv(vertex_path)?;
        let fs_code = load_spirv(fragment_path)?;

        let mut shaders = Shaders {
            device: dev.raw().clone(),
            vertex: vk::ShaderModule::null(),
            fragment: vk::ShaderModule::null(),
        };
        shaders.vertex = shaders.create_module(&vs_code)?;
        shaders.fragment = shaders.create_module(&fs_code)?;
        info!(
            "shaders loaded: {} / {}",
            vertex_path.display(),
            fragment_path.display()
        );
        Ok(shaders)
    }

    unsafe fn create_module(&self, code: &[u32]) -> Result<vk::ShaderModule, VkError> {
        let ci = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            p_code: code.as_ptr(),
            code_size: code.len() * 4,
            ..Default::default()
        };
        self.device
            .create_shader_module(&ci, None)
            .vk_context("vkCreateShaderModule")
    }

    pub fn stage_infos(&self) -> [vk::PipelineShaderStageCreateInfo<'static>; 2] {
        [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: self.vertex,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: self.fragment,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
        ]
    }
}

impl Drop for Shaders {
    fn drop(&mut self) {
        unsafe {
            for module in [self.vertex, self.fragment] {
                if module != vk::ShaderModule::null() {
                    self.device.destroy_shader_module(module, None);
                }
            }
        }
    }
}

/// Set layout, pipeline layout and the single descriptor set that points
/// the vertex stage at the uniform buffer.
pub(crate) struct DescriptorState {
    device: ash::Device,
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

impl DescriptorState {
    pub unsafe fn new(
        dev: &LogicalDevice,
        uniform: vk::DescriptorBufferInfo,
    ) -> Result<Self, VkError> {
        let device = dev.raw();
        let mut state = DescriptorState {
            device: device.clone(),
            set_layout: vk::DescriptorSetLayout::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pool: vk::DescriptorPool::null(),
            set: vk::DescriptorSet::null(),
        };

        let binding = vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        };
        let dsl_ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: 1,
            p_bindings: &binding,
            ..Default::default()
        };
        state.set_layout = device
            .create_descriptor_set_layout(&dsl_ci, None)
            .vk_context("vkCreateDescriptorSetLayout")?;

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: 1,
            p_set_layouts: &state.set_layout,
            ..Default::default()
        };
        state.pipeline_layout = device
            .create_pipeline_layout(&layout_info, None)
            .vk_context("vkCreatePipelineLayout")?;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
        }];
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: 1,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        state.pool = device
            .create_descriptor_pool(&pool_ci, None)
            .vk_context("vkCreateDescriptorPool")?;

        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: state.pool,
            descriptor_set_count: 1,
            p_set_layouts: &state.set_layout,
            ..Default::default()
        };
        state.set = device
            .allocate_descriptor_sets(&alloc)
            .vk_context("vkAllocateDescriptorSets")?[0];

        let write = vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: state.set,
            dst_binding: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: &uniform,
            ..Default::default()
        };
        device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
        Ok(state)
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }
}

impl Drop for DescriptorState {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            // freeing the pool releases the set
            if self.pool != vk::DescriptorPool::null() {
                d.destroy_descriptor_pool(self.pool, None);
            }
            if self.pipeline_layout != vk::PipelineLayout::null() {
                d.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            if self.set_layout != vk::DescriptorSetLayout::null() {
                d.destroy_descriptor_set_layout(self.set_layout, None);
            }
        }
    }
}

/// Color attachment presented at the end of the pass, depth attachment
/// kept in depth-stencil layout. Both cleared on load.
pub(crate) fn attachment_descriptions(
    color_format: vk::Format,
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    [
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ]
}

pub(crate) struct RenderPass {
    device: ash::Device,
    raw: vk::RenderPass,
}

impl RenderPass {
    pub unsafe fn new(
        dev: &LogicalDevice,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self, VkError> {
        let attachments = attachment_descriptions(color_format, depth_format);
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            p_depth_stencil_attachment: &depth_ref,
            ..Default::default()
        };
        // TODO: external -> subpass 0 dependency on COLOR_ATTACHMENT_OUTPUT
        // before allowing more than one frame in flight.
        let rp_info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            ..Default::default()
        };
        let raw = dev
            .raw()
            .create_render_pass(&rp_info, None)
            .vk_context("vkCreateRenderPass")?;
        Ok(RenderPass {
            device: dev.raw().clone(),
            raw,
        })
    }

    pub fn raw(&self) -> vk::RenderPass {
        self.raw
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.destroy_render_pass(self.raw, None) };
    }
}

pub(crate) fn input_assembly_state() -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
    vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
    }
}

pub(crate) fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        depth_clamp_enable: vk::FALSE,
        rasterizer_discard_enable: vk::FALSE,
        depth_bias_enable: vk::FALSE,
        depth_bias_constant_factor: 0.0,
        depth_bias_clamp: 0.0,
        depth_bias_slope_factor: 0.0,
        line_width: 1.0,
        ..Default::default()
    }
}

pub(crate) fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        alpha_blend_op: vk::BlendOp::ADD,
        color_blend_op: vk::BlendOp::ADD,
        src_color_blend_factor: vk::BlendFactor::ZERO,
        dst_color_blend_factor: vk::BlendFactor::ZERO,
        src_alpha_blend_factor: vk::BlendFactor::ZERO,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
    }
}

pub(crate) fn depth_stencil_state() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    let keep_always = vk::StencilOpState {
        fail_op: vk::StencilOp::KEEP,
        pass_op: vk::StencilOp::KEEP,
        depth_fail_op: vk::StencilOp::KEEP,
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    };
    vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        depth_bounds_test_enable: vk::FALSE,
        stencil_test_enable: vk::FALSE,
        front: keep_always,
        back: keep_always,
        min_depth_bounds: 0.0,
        max_depth_bounds: 0.0,
        ..Default::default()
    }
}

pub(crate) fn multisample_state() -> vk::PipelineMultisampleStateCreateInfo<'static> {
    vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        sample_shading_enable: vk::FALSE,
        alpha_to_coverage_enable: vk::FALSE,
        alpha_to_one_enable: vk::FALSE,
        ..Default::default()
    }
}

pub(crate) struct GraphicsPipeline {
    device: ash::Device,
    raw: vk::Pipeline,
}

impl GraphicsPipeline {
    pub unsafe fn new(
        dev: &LogicalDevice,
        shaders: &Shaders,
        layout: vk::PipelineLayout,
        render_pass: &RenderPass,
    ) -> Result<Self, VkError> {
        let stages = shaders.stage_infos();

        let vb = vertex_input_binding();
        let va = vertex_input_attributes();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &vb,
            vertex_attribute_description_count: va.len() as u32,
            p_vertex_attribute_descriptions: va.as_ptr(),
            ..Default::default()
        };
        let input_assembly = input_assembly_state();
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: DYNAMIC_STATES.len() as u32,
            p_dynamic_states: DYNAMIC_STATES.as_ptr(),
            ..Default::default()
        };
        // counts only; both are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = rasterization_state();
        let multisample = multisample_state();
        let depth_stencil = depth_stencil_state();
        let color_blend_att = color_blend_attachment();
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            logic_op_enable: vk::FALSE,
            logic_op: vk::LogicOp::NO_OP,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            blend_constants: [1.0; 4],
            ..Default::default()
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_depth_stencil_state: &depth_stencil,
            p_color_blend_state: &color_blend,
            p_dynamic_state: &dynamic_state,
            layout,
            render_pass: render_pass.raw(),
            subpass: 0,
            ..Default::default()
        };

        let pipelines = match dev.raw().create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        ) {
            Ok(p) => p,
            Err((_, result)) => {
                return Err(VkError::Vk {
                    call: "vkCreateGraphicsPipelines",
                    result,
                })
            }
        };
        info!("graphics pipeline created");
        Ok(GraphicsPipeline {
            device: dev.raw().clone(),
            raw: pipelines[0],
        })
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline(self.raw, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vkp-{}-{name}", std::process::id()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn missing_shader_reports_its_path() {
        let path = std::env::temp_dir().join("vkp-definitely-missing.spv");
        let err = load_spirv(&path).unwrap_err();
        match err {
            VkError::Shader { path: p, source } => {
                assert_eq!(p, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn truncated_shader_is_rejected() {
        let path = scratch_file("truncated.spv", &[0x03, 0x02, 0x23]);
        let err = load_spirv(&path).unwrap_err();
        assert!(matches!(err, VkError::Shader { .. }));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn shader_words_are_read_whole() {
        // magic number followed by one padding word
        let bytes = [0x03, 0x02, 0x23, 0x07, 0, 0, 0, 0];
        let path = scratch_file("magic.spv", &bytes);
        let words = load_spirv(&path).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rasterizer_culls_back_faces_wound_clockwise() {
        let r = rasterization_state();
        assert_eq!(r.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(r.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(r.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(r.depth_bias_enable, vk::FALSE);
        assert_eq!(r.line_width, 1.0);
    }

    #[test]
    fn depth_test_and_write_without_stencil() {
        let d = depth_stencil_state();
        assert_eq!(d.depth_test_enable, vk::TRUE);
        assert_eq!(d.depth_write_enable, vk::TRUE);
        assert_eq!(d.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(d.stencil_test_enable, vk::FALSE);
        assert_eq!(d.back.compare_op, vk::CompareOp::ALWAYS);
    }

    #[test]
    fn fixed_function_defaults() {
        let ia = input_assembly_state();
        assert_eq!(ia.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(ia.primitive_restart_enable, vk::FALSE);

        let blend = color_blend_attachment();
        assert_eq!(blend.blend_enable, vk::FALSE);
        assert_eq!(blend.color_write_mask.as_raw(), 0b1111);

        let ms = multisample_state();
        assert_eq!(ms.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(DYNAMIC_STATES.len(), 2);
    }

    #[test]
    fn attachments_clear_and_end_in_usable_layouts() {
        let [color, depth] =
            attachment_descriptions(vk::Format::B8G8R8A8_UNORM, vk::Format::D16_UNORM);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(depth.format, vk::Format::D16_UNORM);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(depth.initial_layout, vk::ImageLayout::UNDEFINED);
    }
}
