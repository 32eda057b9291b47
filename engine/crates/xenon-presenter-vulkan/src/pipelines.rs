//! paint flow 中各个 effect 使用的 pipeline
//!
//! 所有 effect 共享同一个 vertex shader，只有 pixel shader 以及 push constant 的布局不同：
//! - push constant 的 [0, 16) 为 vertex shader 使用的 [`RectangleConstants`]
//! - push constant 的 [16, 16 + size) 为 pixel shader 使用的 effect 常量
//! - set 0 使用 push descriptor，binding 0 为输入图像，binding 1 为 sampler

use std::{path::Path, sync::Arc};

use anyhow::Context;
use ash::vk;

use xenon_crate_tools::resource::XenonPath;
use xenon_gfx::{
    descriptors::descriptor_set_layout::GfxDescriptorSetLayout,
    pipelines::{
        graphics_pipeline::{GfxGraphicsPipeline, GfxPipelineLayout},
        shader::GfxShaderModuleCache,
    },
    sampler::GfxSampler,
};
use xenon_presenter::{
    paint_flow::GuestOutputPaintEffect,
    shader_constants::{
        GUEST_OUTPUT_VERTEX_SHADER, PaintConstantsLayout, RectangleConstants, guest_output_pixel_shader,
    },
};

use crate::guest_output_image::GUEST_OUTPUT_FORMAT;

/// vertex shader 的 push constant 大小
pub const RECTANGLE_CONSTANTS_SIZE: u32 = size_of::<RectangleConstants>() as u32;

pub fn vertex_shader_path() -> String {
    XenonPath::shader_build_path_str(GUEST_OUTPUT_VERTEX_SHADER)
}

pub fn pixel_shader_path(effect: GuestOutputPaintEffect) -> String {
    XenonPath::shader_build_path_str(&guest_output_pixel_shader(effect))
}

pub fn push_constant_ranges(layout: PaintConstantsLayout) -> [vk::PushConstantRange; 2] {
    [
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: RECTANGLE_CONSTANTS_SIZE,
        },
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: RECTANGLE_CONSTANTS_SIZE,
            size: layout.size(),
        },
    ]
}

/// 与 surface 无关的绘制资源
///
/// # Destroy
/// drop 时自动销毁，调用者需要保证 GPU 不再使用
pub struct GuestOutputPaintPipelines {
    /// 按照 `GuestOutputPaintEffect::index` 索引，只有可以作为中间 effect 的才会创建
    intermediate_pipelines: Vec<Option<GfxGraphicsPipeline>>,

    /// 按照 `PaintConstantsLayout::index` 索引
    pipeline_layouts: Vec<Arc<GfxPipelineLayout>>,
    descriptor_set_layout: GfxDescriptorSetLayout,
    sampler: GfxSampler,
}

// new & init
impl GuestOutputPaintPipelines {
    pub fn new() -> anyhow::Result<Self> {
        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT),
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT),
        ];
        let descriptor_set_layout = GfxDescriptorSetLayout::new_push(&bindings, "guest-output-paint")?;

        let pipeline_layouts = PaintConstantsLayout::ALL
            .iter()
            .map(|&layout| {
                GfxPipelineLayout::new(
                    &[descriptor_set_layout.handle()],
                    &push_constant_ranges(layout),
                    format!("guest-output-paint-{}", layout.name()),
                )
                .map(Arc::new)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let sampler = GfxSampler::new_linear_clamp("guest-output-paint-linear-clamp")?;

        let mut pipelines = Self {
            intermediate_pipelines: Vec::with_capacity(GuestOutputPaintEffect::COUNT),
            pipeline_layouts,
            descriptor_set_layout,
            sampler,
        };

        let mut shader_modules = GfxShaderModuleCache::new();
        for effect in GuestOutputPaintEffect::ALL {
            if !effect.can_be_intermediate() {
                pipelines.intermediate_pipelines.push(None);
                continue;
            }
            // 缺少某个 effect 时，包含该 effect 的 paint flow 不会被绘制
            let pipeline = pipelines
                .create_pipeline(effect, GUEST_OUTPUT_FORMAT, "intermediate", &mut shader_modules)
                .inspect_err(|e| log::error!("VulkanPresenter: {:#}", e))
                .ok();
            pipelines.intermediate_pipelines.push(pipeline);
        }
        shader_modules.destroy();

        Ok(pipelines)
    }

    /// 创建绘制到指定格式的 pipeline
    pub fn create_pipeline(
        &self,
        effect: GuestOutputPaintEffect,
        target_format: vk::Format,
        debug_suffix: &str,
        shader_modules: &mut GfxShaderModuleCache,
    ) -> anyhow::Result<GfxGraphicsPipeline> {
        let layout = self.pipeline_layouts[PaintConstantsLayout::for_effect(effect).index()].clone();
        let debug_name = format!("guest-output-{}-{}", effect.name(), debug_suffix);
        GfxGraphicsPipeline::new_rect(
            Path::new(&vertex_shader_path()),
            Path::new(&pixel_shader_path(effect)),
            target_format,
            layout,
            &debug_name,
            shader_modules,
        )
        .with_context(|| format!("failed to create the {} pipeline", debug_name))
    }
}

// getters
impl GuestOutputPaintPipelines {
    #[inline]
    pub fn intermediate_pipeline(&self, effect: GuestOutputPaintEffect) -> Option<&GfxGraphicsPipeline> {
        self.intermediate_pipelines.get(effect.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn pipeline_layout(&self, layout: PaintConstantsLayout) -> vk::PipelineLayout {
        self.pipeline_layouts[layout.index()].handle()
    }

    #[inline]
    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptor_set_layout.handle()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_paths() {
        assert!(vertex_shader_path().ends_with("guest_output_rect.vs.hlsl.spv"));
        assert!(
            pixel_shader_path(GuestOutputPaintEffect::CasSharpenDither)
                .ends_with("guest_output_cas_sharpen_dither.ps.hlsl.spv")
        );
        assert!(pixel_shader_path(GuestOutputPaintEffect::FsrEasu).ends_with("guest_output_fsr_easu.ps.hlsl.spv"));
    }

    #[test]
    fn test_push_constant_ranges() {
        for layout in PaintConstantsLayout::ALL {
            let [vs, ps] = push_constant_ranges(layout);
            assert_eq!(vs.offset, 0);
            assert_eq!(vs.size, 16);
            assert_eq!(ps.offset, vs.size);
            assert_eq!(ps.size % 4, 0);
            // 保证在 Vulkan 要求的最小 push constant 空间之内
            assert!(ps.offset + ps.size <= 128);
        }
    }
}
