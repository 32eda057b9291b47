//! 绘制 guest output 时传递给 shader 的常量
//!
//! 布局和 `engine/shader/src/present/include/guest_output_common.hlsli` 保持一致：
//! - Vulkan：push constant，vertex shader 的 rect 位于 offset 0，pixel shader 的常量紧随其后
//! - D3D12：root constant

use bytemuck::{Pod, Zeroable};

use crate::{
    paint_config::GuestOutputPaintConfig,
    paint_flow::{GuestOutputPaintEffect, GuestOutputPaintFlow},
};

/// vertex shader 使用的矩形，位于 NDC 中
///
/// vertex shader 根据 vertex index 生成 4 个顶点的 triangle strip
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct RectangleConstants {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectangleConstants {
    /// D3D12 的 NDC：y 轴向上
    pub fn new_y_up(offset: (i32, i32), size: (u32, u32), rt_size: (u32, u32)) -> Self {
        let x_to_ndc = 2.0 / rt_size.0 as f32;
        let y_to_ndc = 2.0 / rt_size.1 as f32;
        Self {
            x: -1.0 + offset.0 as f32 * x_to_ndc,
            y: 1.0 - offset.1 as f32 * y_to_ndc,
            width: size.0 as f32 * x_to_ndc,
            height: -(size.1 as f32) * y_to_ndc,
        }
    }

    /// Vulkan 的 NDC：y 轴向下
    pub fn new_y_down(offset: (i32, i32), size: (u32, u32), rt_size: (u32, u32)) -> Self {
        let x_to_ndc = 2.0 / rt_size.0 as f32;
        let y_to_ndc = 2.0 / rt_size.1 as f32;
        Self {
            x: -1.0 + offset.0 as f32 * x_to_ndc,
            y: -1.0 + offset.1 as f32 * y_to_ndc,
            width: size.0 as f32 * x_to_ndc,
            height: size.1 as f32 * y_to_ndc,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct BilinearConstants {
    pub output_offset: [i32; 2],
    pub output_size_inv: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct CasSharpenConstants {
    pub output_offset: [i32; 2],
    pub sharpness_post_setup: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct CasResampleConstants {
    pub output_offset: [i32; 2],
    pub input_output_size_ratio: [f32; 2],
    pub sharpness_post_setup: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct FsrEasuConstants {
    pub input_output_size_ratio: [f32; 2],
    pub input_size_inv: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct FsrRcasConstants {
    pub output_offset: [i32; 2],
    pub sharpness_post_setup: f32,
}

/// CAS 的锐度：`-1 / lerp(8, 5, sharpness)`
#[inline]
pub fn cas_post_setup_sharpness(sharpness: f32) -> f32 {
    -1.0 / (8.0 - 3.0 * sharpness)
}

/// RCAS 的锐度，参数以 stop 为单位
#[inline]
pub fn fsr_rcas_post_setup_sharpness(sharpness_reduction_stops: f32) -> f32 {
    (-sharpness_reduction_stops).exp2()
}

/// 同一种布局的 effect 共享 pipeline layout / root signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaintConstantsLayout {
    Bilinear,
    CasSharpen,
    CasResample,
    FsrEasu,
    FsrRcas,
}

impl PaintConstantsLayout {
    pub const COUNT: usize = 5;

    pub const ALL: [Self; Self::COUNT] =
        [Self::Bilinear, Self::CasSharpen, Self::CasResample, Self::FsrEasu, Self::FsrRcas];

    pub fn for_effect(effect: GuestOutputPaintEffect) -> Self {
        match effect {
            GuestOutputPaintEffect::Bilinear | GuestOutputPaintEffect::BilinearDither => Self::Bilinear,
            GuestOutputPaintEffect::CasSharpen | GuestOutputPaintEffect::CasSharpenDither => Self::CasSharpen,
            GuestOutputPaintEffect::CasResample | GuestOutputPaintEffect::CasResampleDither => Self::CasResample,
            GuestOutputPaintEffect::FsrEasu => Self::FsrEasu,
            GuestOutputPaintEffect::FsrRcas | GuestOutputPaintEffect::FsrRcasDither => Self::FsrRcas,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// pixel shader 常量的字节数
    pub fn size(self) -> u32 {
        let size = match self {
            Self::Bilinear => size_of::<BilinearConstants>(),
            Self::CasSharpen => size_of::<CasSharpenConstants>(),
            Self::CasResample => size_of::<CasResampleConstants>(),
            Self::FsrEasu => size_of::<FsrEasuConstants>(),
            Self::FsrRcas => size_of::<FsrRcasConstants>(),
        };
        size as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bilinear => "bilinear",
            Self::CasSharpen => "cas_sharpen",
            Self::CasResample => "cas_resample",
            Self::FsrEasu => "fsr_easu",
            Self::FsrRcas => "fsr_rcas",
        }
    }
}

/// 某个 effect 的 pixel shader 常量
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaintEffectConstants {
    Bilinear(BilinearConstants),
    CasSharpen(CasSharpenConstants),
    CasResample(CasResampleConstants),
    FsrEasu(FsrEasuConstants),
    FsrRcas(FsrRcasConstants),
}

impl PaintEffectConstants {
    pub fn for_effect(flow: &GuestOutputPaintFlow, effect_index: usize, config: &GuestOutputPaintConfig) -> Self {
        let (offset_x, offset_y) = flow.effect_output_offset(effect_index);
        let output_offset = [offset_x, offset_y];
        let (input_width, input_height) = flow.effect_input_size(effect_index);
        let (output_width, output_height) = flow.effect_output_sizes[effect_index];
        let input_output_size_ratio =
            [input_width as f32 / output_width as f32, input_height as f32 / output_height as f32];

        match PaintConstantsLayout::for_effect(flow.effects[effect_index]) {
            PaintConstantsLayout::Bilinear => Self::Bilinear(BilinearConstants {
                output_offset,
                output_size_inv: [1.0 / output_width as f32, 1.0 / output_height as f32],
            }),
            PaintConstantsLayout::CasSharpen => Self::CasSharpen(CasSharpenConstants {
                output_offset,
                sharpness_post_setup: cas_post_setup_sharpness(config.cas_additional_sharpness()),
            }),
            PaintConstantsLayout::CasResample => Self::CasResample(CasResampleConstants {
                output_offset,
                input_output_size_ratio,
                sharpness_post_setup: cas_post_setup_sharpness(config.cas_additional_sharpness()),
            }),
            PaintConstantsLayout::FsrEasu => Self::FsrEasu(FsrEasuConstants {
                input_output_size_ratio,
                input_size_inv: [1.0 / input_width as f32, 1.0 / input_height as f32],
            }),
            PaintConstantsLayout::FsrRcas => Self::FsrRcas(FsrRcasConstants {
                output_offset,
                sharpness_post_setup: fsr_rcas_post_setup_sharpness(config.fsr_sharpness_reduction()),
            }),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bilinear(c) => bytemuck::bytes_of(c),
            Self::CasSharpen(c) => bytemuck::bytes_of(c),
            Self::CasResample(c) => bytemuck::bytes_of(c),
            Self::FsrEasu(c) => bytemuck::bytes_of(c),
            Self::FsrRcas(c) => bytemuck::bytes_of(c),
        }
    }

    /// D3D12 root constant 使用 32 位为单位
    pub fn as_dwords(&self) -> &[u32] {
        match self {
            Self::Bilinear(c) => bytemuck::cast_slice(std::slice::from_ref(c)),
            Self::CasSharpen(c) => bytemuck::cast_slice(std::slice::from_ref(c)),
            Self::CasResample(c) => bytemuck::cast_slice(std::slice::from_ref(c)),
            Self::FsrEasu(c) => bytemuck::cast_slice(std::slice::from_ref(c)),
            Self::FsrRcas(c) => bytemuck::cast_slice(std::slice::from_ref(c)),
        }
    }
}

/// 所有 effect 共享的 vertex shader，相对于 `engine/shader/src`
pub const GUEST_OUTPUT_VERTEX_SHADER: &str = "present/guest_output_rect.vs.hlsl";

/// effect 的 pixel shader，相对于 `engine/shader/src`
pub fn guest_output_pixel_shader(effect: GuestOutputPaintEffect) -> String {
    format!("present/guest_output_{}.ps.hlsl", effect.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PresenterCvars,
        guest_output::GuestOutputProperties,
        paint_config::Effect,
        paint_flow::{PaintFlowTarget, get_guest_output_paint_flow},
    };

    fn flow_for(effect: Effect, fb: (u32, u32), rt: (u32, u32)) -> GuestOutputPaintFlow {
        let mut config = GuestOutputPaintConfig::default();
        config.set_effect(effect);
        get_guest_output_paint_flow(
            &GuestOutputProperties {
                frontbuffer_width: fb.0,
                frontbuffer_height: fb.1,
                display_aspect_ratio_x: 4,
                display_aspect_ratio_y: 3,
                is_8bpc: false,
            },
            &PaintFlowTarget {
                host_rt_width: rt.0,
                host_rt_height: rt.1,
                max_rt_width: 16384,
                max_rt_height: 16384,
                surface_width: rt.0,
                surface_height: rt.1,
            },
            &config,
            &PresenterCvars::default(),
        )
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(size_of::<RectangleConstants>(), 16);
        assert_eq!(PaintConstantsLayout::Bilinear.size(), 16);
        assert_eq!(PaintConstantsLayout::CasSharpen.size(), 12);
        assert_eq!(PaintConstantsLayout::CasResample.size(), 20);
        assert_eq!(PaintConstantsLayout::FsrEasu.size(), 16);
        assert_eq!(PaintConstantsLayout::FsrRcas.size(), 12);
        for effect in GuestOutputPaintEffect::ALL {
            let layout = PaintConstantsLayout::for_effect(effect);
            assert!(layout.index() < PaintConstantsLayout::COUNT);
        }
    }

    #[test]
    fn test_sharpness_setup() {
        assert_eq!(cas_post_setup_sharpness(0.0), -0.125);
        assert_eq!(cas_post_setup_sharpness(1.0), -0.2);
        assert_eq!(fsr_rcas_post_setup_sharpness(0.0), 1.0);
        assert_eq!(fsr_rcas_post_setup_sharpness(1.0), 0.5);
        assert_eq!(fsr_rcas_post_setup_sharpness(2.0), 0.25);
    }

    #[test]
    fn test_rectangle_full_target() {
        let up = RectangleConstants::new_y_up((0, 0), (800, 600), (800, 600));
        assert_eq!(
            up,
            RectangleConstants {
                x: -1.0,
                y: 1.0,
                width: 2.0,
                height: -2.0
            }
        );
        let down = RectangleConstants::new_y_down((0, 0), (800, 600), (800, 600));
        assert_eq!(
            down,
            RectangleConstants {
                x: -1.0,
                y: -1.0,
                width: 2.0,
                height: 2.0
            }
        );
    }

    #[test]
    fn test_rectangle_offset() {
        let rect = RectangleConstants::new_y_up((200, 150), (400, 300), (800, 600));
        assert_eq!(
            rect,
            RectangleConstants {
                x: -0.5,
                y: 0.5,
                width: 1.0,
                height: -1.0
            }
        );
        let rect = RectangleConstants::new_y_down((200, 150), (400, 300), (800, 600));
        assert_eq!(rect.y, -0.5);
        assert_eq!(rect.height, 1.0);
    }

    #[test]
    fn test_constants_for_flow() {
        // 640x480 -> 1600x1200: CAS 放大到 1280x960，然后 bilinear
        let flow = flow_for(Effect::Cas, (640, 480), (1600, 1200));
        let config = GuestOutputPaintConfig::default();
        match PaintEffectConstants::for_effect(&flow, 0, &config) {
            PaintEffectConstants::CasResample(c) => {
                assert_eq!(c.output_offset, [0, 0]);
                assert_eq!(c.input_output_size_ratio, [0.5, 0.5]);
                assert_eq!(c.sharpness_post_setup, -0.125);
            }
            other => panic!("unexpected constants {:?}", other),
        }
        let bilinear = PaintEffectConstants::for_effect(&flow, 1, &config);
        assert_eq!(
            bilinear,
            PaintEffectConstants::Bilinear(BilinearConstants {
                output_offset: [0, 0],
                output_size_inv: [1.0 / 1600.0, 1.0 / 1200.0],
            })
        );
        assert_eq!(bilinear.as_bytes().len(), 16);
        assert_eq!(bilinear.as_dwords().len(), 4);

        let fsr = flow_for(Effect::Fsr, (320, 240), (1280, 960));
        match PaintEffectConstants::for_effect(&fsr, 0, &config) {
            PaintEffectConstants::FsrEasu(c) => {
                assert_eq!(c.input_output_size_ratio, [0.5, 0.5]);
                assert_eq!(c.input_size_inv, [1.0 / 320.0, 1.0 / 240.0]);
            }
            other => panic!("unexpected constants {:?}", other),
        }
    }
}
