//! guest output 的绘制流程
//!
//! 根据 guest 的宽高比、surface 尺寸以及配置，决定 guest output 在 render target 上的位置，
//! 以及需要依次执行的后处理 effect（每个 effect 是一次全屏 triangle strip 绘制）。

use crate::{
    config::PresenterCvars,
    guest_output::GuestOutputProperties,
    paint_config::{Effect, GuestOutputPaintConfig},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GuestOutputPaintEffect {
    #[default]
    Bilinear,
    BilinearDither,
    CasSharpen,
    CasSharpenDither,
    CasResample,
    CasResampleDither,
    FsrEasu,
    FsrRcas,
    FsrRcasDither,
}

impl GuestOutputPaintEffect {
    pub const COUNT: usize = 9;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Bilinear,
        Self::BilinearDither,
        Self::CasSharpen,
        Self::CasSharpenDither,
        Self::CasResample,
        Self::CasResampleDither,
        Self::FsrEasu,
        Self::FsrRcas,
        Self::FsrRcasDither,
    ];

    /// 作为中间 pass 时，输出会被后续 pass 采样
    ///
    /// dither 只能用于最后一个 pass，否则后续的滤波会放大 dither 噪声
    #[inline]
    pub fn can_be_intermediate(self) -> bool {
        !matches!(
            self,
            Self::Bilinear | Self::BilinearDither | Self::CasSharpenDither | Self::CasResampleDither | Self::FsrRcasDither
        )
    }

    /// EASU 之后必须跟随 RCAS
    #[inline]
    pub fn can_be_final(self) -> bool {
        self != Self::FsrEasu
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// 用于 debug label 以及 shader 文件名
    pub fn name(self) -> &'static str {
        match self {
            Self::Bilinear => "bilinear",
            Self::BilinearDither => "bilinear_dither",
            Self::CasSharpen => "cas_sharpen",
            Self::CasSharpenDither => "cas_sharpen_dither",
            Self::CasResample => "cas_resample",
            Self::CasResampleDither => "cas_resample_dither",
            Self::FsrEasu => "fsr_easu",
            Self::FsrRcas => "fsr_rcas",
            Self::FsrRcasDither => "fsr_rcas_dither",
        }
    }
}

/// 最多 4 个 EASU pass + RCAS + bilinear
pub const MAX_GUEST_OUTPUT_PAINT_EFFECTS: usize = GuestOutputPaintConfig::FSR_MAX_UPSCALING_PASSES_MAX as usize + 2;

/// letterbox 最多上下左右四个矩形
pub const MAX_CLEAR_RECTANGLES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearRectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 绘制目标的尺寸信息
///
/// render target 的尺寸可以和 surface 不同，此时由窗口系统拉伸到 surface 上
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintFlowTarget {
    pub host_rt_width: u32,
    pub host_rt_height: u32,
    /// 中间图像以及 render target 能够使用的最大尺寸
    pub max_rt_width: u32,
    pub max_rt_height: u32,
    /// 建立 paint connection 时 surface 的尺寸
    pub surface_width: u32,
    pub surface_height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuestOutputPaintFlow {
    pub properties: GuestOutputProperties,

    pub effect_count: usize,
    pub effects: [GuestOutputPaintEffect; MAX_GUEST_OUTPUT_PAINT_EFFECTS],
    pub effect_output_sizes: [(u32, u32); MAX_GUEST_OUTPUT_PAINT_EFFECTS],

    /// 最后一个 effect 在 render target 上的位置，可以为负数（超出 render target 的部分会被裁剪）
    pub output_x: i32,
    pub output_y: i32,
    /// 最后一个 effect 的输出尺寸，没有 effect 时为 0
    pub output_width: u32,
    pub output_height: u32,

    pub clear_rectangle_count: usize,
    pub clear_rectangles: [ClearRectangle; MAX_CLEAR_RECTANGLES],
}

impl GuestOutputPaintFlow {
    /// 不绘制任何 guest output，清除整个 render target
    fn clear_only(host_rt_width: u32, host_rt_height: u32) -> Self {
        let mut clear_rectangles = [ClearRectangle::default(); MAX_CLEAR_RECTANGLES];
        clear_rectangles[0] = ClearRectangle {
            x: 0,
            y: 0,
            width: host_rt_width,
            height: host_rt_height,
        };
        Self {
            properties: GuestOutputProperties::default(),
            effect_count: 0,
            effects: [GuestOutputPaintEffect::default(); MAX_GUEST_OUTPUT_PAINT_EFFECTS],
            effect_output_sizes: [(0, 0); MAX_GUEST_OUTPUT_PAINT_EFFECTS],
            output_x: 0,
            output_y: 0,
            output_width: 0,
            output_height: 0,
            clear_rectangle_count: 1,
            clear_rectangles,
        }
    }

    fn push_effect(&mut self, effect: GuestOutputPaintEffect, size: (u32, u32)) {
        debug_assert!(self.effect_count < MAX_GUEST_OUTPUT_PAINT_EFFECTS);
        self.effects[self.effect_count] = effect;
        self.effect_output_sizes[self.effect_count] = size;
        self.effect_count += 1;
    }

    fn push_clear_rectangle(&mut self, rect: ClearRectangle) {
        debug_assert!(self.clear_rectangle_count < MAX_CLEAR_RECTANGLES);
        self.clear_rectangles[self.clear_rectangle_count] = rect;
        self.clear_rectangle_count += 1;
    }
}

// getters
impl GuestOutputPaintFlow {
    #[inline]
    pub fn effects(&self) -> &[GuestOutputPaintEffect] {
        &self.effects[..self.effect_count]
    }

    #[inline]
    pub fn effect_output_sizes(&self) -> &[(u32, u32)] {
        &self.effect_output_sizes[..self.effect_count]
    }

    #[inline]
    pub fn clear_rectangles(&self) -> &[ClearRectangle] {
        &self.clear_rectangles[..self.clear_rectangle_count]
    }

    #[inline]
    pub fn is_final_effect(&self, effect_index: usize) -> bool {
        effect_index + 1 == self.effect_count
    }

    /// 第一个 effect 的输入是 guest output，其余的输入是上一个 effect 的输出
    pub fn effect_input_size(&self, effect_index: usize) -> (u32, u32) {
        debug_assert!(effect_index < self.effect_count);
        if effect_index == 0 {
            (self.properties.frontbuffer_width, self.properties.frontbuffer_height)
        } else {
            self.effect_output_sizes[effect_index - 1]
        }
    }

    /// 只有最后一个 effect 写入 render target，中间 effect 写入中间图像的原点
    pub fn effect_output_offset(&self, effect_index: usize) -> (i32, i32) {
        debug_assert!(effect_index < self.effect_count);
        if self.is_final_effect(effect_index) { (self.output_x, self.output_y) } else { (0, 0) }
    }
}

/// 乘除法，四舍五入到最近的整数
#[inline]
fn rescale_unsigned(value: u64, new_scale: u64, old_scale: u64) -> u32 {
    ((value * new_scale + (old_scale >> 1)) / old_scale) as u32
}

/// 正负数都远离 0 进行舍入，`/` 本身向 0 截断
#[inline]
fn rescale_signed(value: i32, new_scale: u32, old_scale: u32) -> i32 {
    let half = (old_scale >> 1) as i64 * if value < 0 { -1 } else { 1 };
    ((value as i64 * new_scale as i64 + half) / old_scale as i64) as i32
}

/// 计算 guest output 的绘制流程
///
/// 位置的计算只依赖于宽高比，和 DPI 无关
pub fn get_guest_output_paint_flow(
    properties: &GuestOutputProperties,
    target: &PaintFlowTarget,
    config: &GuestOutputPaintConfig,
    cvars: &PresenterCvars,
) -> GuestOutputPaintFlow {
    debug_assert!(target.max_rt_width != 0 && target.max_rt_height != 0);

    let host_rt_width = target.host_rt_width;
    let host_rt_height = target.host_rt_height;
    let mut flow = GuestOutputPaintFlow::clear_only(host_rt_width, host_rt_height);

    let surface_width = target.surface_width;
    let surface_height = target.surface_height;
    if !properties.is_active() || host_rt_width == 0 || host_rt_height == 0 || surface_width == 0 || surface_height == 0
    {
        return flow;
    }
    flow.properties = *properties;

    let ar_x = properties.display_aspect_ratio_x as u64;
    let ar_y = properties.display_aspect_ratio_y as u64;
    let sw = surface_width as u64;
    let sh = surface_height as u64;

    // 在 surface 像素中计算，surface 像素和显示器像素是 1:1 的
    let mut output_width: u32;
    let mut output_height: u32;
    if sw * ar_y > sh * ar_x {
        // surface 比 guest 更宽：沿着 Y 裁剪以铺满宽度，裁剪量受 safe area 限制，超过时 letterbox 或者拉伸
        let safe_area =
            PresenterCvars::effective_safe_area(cvars.present_safe_area_y, config.allow_overscan_cutoff()) as u64;
        output_height = rescale_unsigned(sw, ar_y, ar_x);
        let mut letterbox = false;
        if output_height as u64 * safe_area > sh * 100 {
            output_height = rescale_unsigned(sh, 100, safe_area);
            letterbox = true;
        }
        if letterbox && cvars.present_letterbox {
            output_width = rescale_unsigned(sh * 100, ar_x, ar_y * safe_area);
            // output_width 已经四舍五入过，这里向下取整
            flow.output_x = ((sw as i64 - output_width as i64) / 2) as i32;
        } else {
            output_width = surface_width;
            flow.output_x = 0;
        }
        flow.output_y = ((sh as i64 - output_height as i64) / 2) as i32;
    } else {
        // surface 比 guest 更高：沿着 X 裁剪
        let safe_area =
            PresenterCvars::effective_safe_area(cvars.present_safe_area_x, config.allow_overscan_cutoff()) as u64;
        output_width = rescale_unsigned(sh, ar_x, ar_y);
        let mut letterbox = false;
        if output_width as u64 * safe_area > sw * 100 {
            output_width = rescale_unsigned(sw, 100, safe_area);
            letterbox = true;
        }
        if letterbox && cvars.present_letterbox {
            output_height = rescale_unsigned(sw * 100, ar_y, ar_x * safe_area);
            flow.output_y = ((sh as i64 - output_height as i64) / 2) as i32;
        } else {
            output_height = surface_height;
            flow.output_y = 0;
        }
        flow.output_x = ((sw as i64 - output_width as i64) / 2) as i32;
    }

    // surface 像素 -> render target 像素
    if host_rt_width != surface_width {
        flow.output_x = rescale_signed(flow.output_x, host_rt_width, surface_width);
        output_width = rescale_unsigned(output_width as u64, host_rt_width as u64, sw);
    }
    if host_rt_height != surface_height {
        flow.output_y = rescale_signed(flow.output_y, host_rt_height, surface_height);
        output_height = rescale_unsigned(output_height as u64, host_rt_height as u64, sh);
    }

    // 极端数值下的舍入误差可能导致 guest output 完全位于 render target 之外
    let output_right = flow.output_x as i64 + output_width as i64;
    let output_bottom = flow.output_y as i64 + output_height as i64;
    if output_width == 0
        || output_height == 0
        || output_right <= 0
        || output_bottom <= 0
        || flow.output_x >= host_rt_width as i32
        || flow.output_y >= host_rt_height as i32
    {
        return flow;
    }

    // 包含 overscan 区域的中间图像可能比 render target 更大，需要限制在最大尺寸以内
    let output_width_clamped = output_width.min(target.max_rt_width);
    let output_height_clamped = output_height.min(target.max_rt_height);

    let effect = config.effect();
    if effect == Effect::Cas || effect == Effect::Fsr {
        // CAS 以及 EASU 的采样方式只适合最多 2x2 的放大
        // - CAS 主要用于锐化，多次执行只会过度锐化，因此只执行一次，剩余的放大交给 bilinear
        // - EASU 能够保持边缘，可以多次执行
        let mut ffx_last_size = (properties.frontbuffer_width, properties.frontbuffer_height);
        if effect == Effect::Fsr
            && (ffx_last_size.0 < output_width_clamped || ffx_last_size.1 < output_height_clamped)
        {
            // EASU 总是写入中间图像，RCAS 只支持 1:1，因此使用限制后的尺寸
            let easu_max_passes = config.fsr_max_upsampling_passes();
            let mut easu_pass_count = 0;
            while easu_pass_count < easu_max_passes
                && (ffx_last_size.0 < output_width_clamped || ffx_last_size.1 < output_height_clamped)
            {
                ffx_last_size.0 = ffx_last_size.0.saturating_mul(2).min(output_width_clamped);
                ffx_last_size.1 = ffx_last_size.1.saturating_mul(2).min(output_height_clamped);
                flow.push_effect(GuestOutputPaintEffect::FsrEasu, ffx_last_size);
                easu_pass_count += 1;
            }
            flow.push_effect(GuestOutputPaintEffect::FsrRcas, ffx_last_size);
        } else {
            // CAS 可能是最后一个 pass，使用未限制的尺寸；
            // 如果后续还需要 bilinear，会在添加 bilinear 时进行限制
            let pre_cas_size = ffx_last_size;
            ffx_last_size.0 = ffx_last_size.0.saturating_mul(2).min(output_width);
            ffx_last_size.1 = ffx_last_size.1.saturating_mul(2).min(output_height);
            let cas_effect = if ffx_last_size == pre_cas_size {
                GuestOutputPaintEffect::CasSharpen
            } else {
                GuestOutputPaintEffect::CasResample
            };
            flow.push_effect(cas_effect, ffx_last_size);
        }
    }

    let needs_bilinear = match flow.effect_output_sizes().last() {
        None => true,
        Some(&last_size) => last_size != (output_width, output_height),
    };
    if needs_bilinear {
        // 最后一个 effect 的输出现在会写入中间图像
        if flow.effect_count != 0 {
            let last = &mut flow.effect_output_sizes[flow.effect_count - 1];
            last.0 = last.0.min(target.max_rt_width);
            last.1 = last.1.min(target.max_rt_height);
        }
        flow.push_effect(GuestOutputPaintEffect::Bilinear, (output_width, output_height));
    }
    flow.output_width = output_width;
    flow.output_height = output_height;

    if config.dither() {
        // dither 只作用于最后一个 effect
        let effect_count = flow.effect_count;
        let last_effect = &mut flow.effects[effect_count - 1];
        match *last_effect {
            GuestOutputPaintEffect::Bilinear => {
                // 8bpc 图像的 1:1 复制不需要 dither
                if !properties.is_8bpc
                    || effect_count > 1
                    || output_width != properties.frontbuffer_width
                    || output_height != properties.frontbuffer_height
                {
                    *last_effect = GuestOutputPaintEffect::BilinearDither;
                }
            }
            GuestOutputPaintEffect::CasSharpen => *last_effect = GuestOutputPaintEffect::CasSharpenDither,
            GuestOutputPaintEffect::CasResample => *last_effect = GuestOutputPaintEffect::CasResampleDither,
            GuestOutputPaintEffect::FsrRcas => *last_effect = GuestOutputPaintEffect::FsrRcasDither,
            _ => {}
        }
    }

    #[cfg(debug_assertions)]
    {
        let effects = flow.effects();
        debug_assert!(effects[..effects.len() - 1].iter().all(|e| e.can_be_intermediate()));
        debug_assert!(effects[effects.len() - 1].can_be_final());
    }

    // letterbox 区域
    flow.clear_rectangle_count = 0;
    let mid_top = flow.output_y.max(0) as u32;
    if mid_top != 0 {
        flow.push_clear_rectangle(ClearRectangle {
            x: 0,
            y: 0,
            width: host_rt_width,
            height: mid_top,
        });
    }
    let mid_bottom = (output_bottom as u64).min(host_rt_height as u64) as u32;
    let mid_height = mid_bottom - mid_top;
    if flow.output_x > 0 {
        flow.push_clear_rectangle(ClearRectangle {
            x: 0,
            y: mid_top,
            width: flow.output_x as u32,
            height: mid_height,
        });
    }
    if output_right < host_rt_width as i64 {
        flow.push_clear_rectangle(ClearRectangle {
            x: output_right as u32,
            y: mid_top,
            width: host_rt_width - output_right as u32,
            height: mid_height,
        });
    }
    if mid_bottom < host_rt_height {
        flow.push_clear_rectangle(ClearRectangle {
            x: 0,
            y: mid_bottom,
            width: host_rt_width,
            height: host_rt_height - mid_bottom,
        });
    }

    flow
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::GuestOutputPaintEffect as E;

    fn props(fb: (u32, u32), ar: (u32, u32), is_8bpc: bool) -> GuestOutputProperties {
        GuestOutputProperties {
            frontbuffer_width: fb.0,
            frontbuffer_height: fb.1,
            display_aspect_ratio_x: ar.0,
            display_aspect_ratio_y: ar.1,
            is_8bpc,
        }
    }

    fn target(rt: (u32, u32), surface: (u32, u32)) -> PaintFlowTarget {
        PaintFlowTarget {
            host_rt_width: rt.0,
            host_rt_height: rt.1,
            max_rt_width: 16384,
            max_rt_height: 16384,
            surface_width: surface.0,
            surface_height: surface.1,
        }
    }

    fn config_with(effect: Effect, dither: bool) -> GuestOutputPaintConfig {
        let mut config = GuestOutputPaintConfig::default();
        config.set_effect(effect);
        config.set_dither(dither);
        config
    }

    #[test]
    fn test_signed_rescale_rounds_away_from_zero() {
        assert_eq!(rescale_signed(-3, 1, 3), -1);
        assert_eq!(rescale_signed(-2, 1, 3), -1);
        assert_eq!(rescale_signed(-1, 1, 3), 0);
        assert_eq!(rescale_signed(0, 1, 3), 0);
        assert_eq!(rescale_signed(1, 1, 3), 0);
        assert_eq!(rescale_signed(2, 1, 3), 1);
        assert_eq!(rescale_unsigned(1920, 3, 4), 1440);
        assert_eq!(rescale_unsigned(5, 1, 2), 3);
    }

    #[test]
    fn test_inactive_clears_everything() {
        let flow = get_guest_output_paint_flow(
            &GuestOutputProperties::default(),
            &target((800, 600), (800, 600)),
            &GuestOutputPaintConfig::default(),
            &PresenterCvars::default(),
        );
        assert!(flow.effects().is_empty());
        assert_eq!(
            flow.clear_rectangles(),
            &[ClearRectangle {
                x: 0,
                y: 0,
                width: 800,
                height: 600
            }]
        );
    }

    #[test]
    fn test_zero_surface_clears_everything() {
        let flow = get_guest_output_paint_flow(
            &props((1280, 720), (16, 9), false),
            &target((800, 600), (0, 600)),
            &GuestOutputPaintConfig::default(),
            &PresenterCvars::default(),
        );
        assert!(flow.effects().is_empty());
        assert_eq!(flow.clear_rectangle_count, 1);
    }

    #[test]
    fn test_same_aspect_fills_target() {
        let flow = get_guest_output_paint_flow(
            &props((1280, 720), (16, 9), false),
            &target((1920, 1080), (1920, 1080)),
            &GuestOutputPaintConfig::default(),
            &PresenterCvars::default(),
        );
        assert_eq!(flow.effects(), &[E::Bilinear]);
        assert_eq!(flow.effect_output_sizes(), &[(1920, 1080)]);
        assert_eq!((flow.output_x, flow.output_y), (0, 0));
        assert!(flow.clear_rectangles().is_empty());
    }

    #[test]
    fn test_pillarbox() {
        let flow = get_guest_output_paint_flow(
            &props((640, 480), (4, 3), false),
            &target((1920, 1080), (1920, 1080)),
            &GuestOutputPaintConfig::default(),
            &PresenterCvars::default(),
        );
        assert_eq!(flow.effect_output_sizes(), &[(1440, 1080)]);
        assert_eq!((flow.output_x, flow.output_y), (240, 0));
        assert_eq!(
            flow.clear_rectangles(),
            &[
                ClearRectangle {
                    x: 0,
                    y: 0,
                    width: 240,
                    height: 1080
                },
                ClearRectangle {
                    x: 1680,
                    y: 0,
                    width: 240,
                    height: 1080
                },
            ]
        );
    }

    #[test]
    fn test_stretch_without_letterbox() {
        let cvars = PresenterCvars {
            present_letterbox: false,
            ..Default::default()
        };
        let flow = get_guest_output_paint_flow(
            &props((640, 480), (4, 3), false),
            &target((1920, 1080), (1920, 1080)),
            &GuestOutputPaintConfig::default(),
            &cvars,
        );
        assert_eq!(flow.effect_output_sizes(), &[(1920, 1080)]);
        assert_eq!((flow.output_x, flow.output_y), (0, 0));
        assert!(flow.clear_rectangles().is_empty());
    }

    #[test]
    fn test_overscan_cutoff_with_safe_area() {
        let cvars = PresenterCvars {
            present_safe_area_x: 90,
            ..Default::default()
        };
        let mut config = GuestOutputPaintConfig::default();
        config.set_allow_overscan_cutoff(true);
        let flow = get_guest_output_paint_flow(
            &props((1280, 720), (16, 9), false),
            &target((1024, 768), (1024, 768)),
            &config,
            &cvars,
        );
        assert_eq!(flow.effect_output_sizes(), &[(1138, 640)]);
        assert_eq!((flow.output_x, flow.output_y), (-57, 64));
        assert_eq!(
            flow.clear_rectangles(),
            &[
                ClearRectangle {
                    x: 0,
                    y: 0,
                    width: 1024,
                    height: 64
                },
                ClearRectangle {
                    x: 0,
                    y: 704,
                    width: 1024,
                    height: 64
                },
            ]
        );
        assert_eq!(flow.effect_output_offset(0), (-57, 64));
    }

    #[test]
    fn test_render_target_differs_from_surface() {
        let flow = get_guest_output_paint_flow(
            &props((640, 480), (4, 3), false),
            &target((960, 540), (1920, 1080)),
            &GuestOutputPaintConfig::default(),
            &PresenterCvars::default(),
        );
        assert_eq!(flow.effect_output_sizes(), &[(720, 540)]);
        assert_eq!((flow.output_x, flow.output_y), (120, 0));
    }

    #[test]
    fn test_cas_choices() {
        let cvars = PresenterCvars::default();
        let config = config_with(Effect::Cas, false);

        let resample = get_guest_output_paint_flow(
            &props((1280, 720), (16, 9), false),
            &target((1920, 1080), (1920, 1080)),
            &config,
            &cvars,
        );
        assert_eq!(resample.effects(), &[E::CasResample]);
        assert_eq!(resample.effect_input_size(0), (1280, 720));

        let sharpen = get_guest_output_paint_flow(
            &props((1920, 1080), (16, 9), false),
            &target((1920, 1080), (1920, 1080)),
            &config,
            &cvars,
        );
        assert_eq!(sharpen.effects(), &[E::CasSharpen]);

        let downsample = get_guest_output_paint_flow(
            &props((1920, 1080), (16, 9), false),
            &target((1280, 720), (1280, 720)),
            &config,
            &cvars,
        );
        assert_eq!(downsample.effects(), &[E::CasResample]);
        assert_eq!(downsample.effect_output_sizes(), &[(1280, 720)]);

        let with_bilinear = get_guest_output_paint_flow(
            &props((640, 360), (16, 9), false),
            &target((1920, 1080), (1920, 1080)),
            &config,
            &cvars,
        );
        assert_eq!(with_bilinear.effects(), &[E::CasResample, E::Bilinear]);
        assert_eq!(with_bilinear.effect_output_sizes(), &[(1280, 720), (1920, 1080)]);
        assert_eq!(with_bilinear.effect_input_size(1), (1280, 720));
        assert_eq!(with_bilinear.effect_output_offset(0), (0, 0));
    }

    #[test]
    fn test_fsr_multiple_easu_passes() {
        let flow = get_guest_output_paint_flow(
            &props((640, 360), (16, 9), false),
            &target((3840, 2160), (3840, 2160)),
            &config_with(Effect::Fsr, false),
            &PresenterCvars::default(),
        );
        assert_eq!(flow.effects(), &[E::FsrEasu, E::FsrEasu, E::FsrEasu, E::FsrRcas]);
        assert_eq!(
            flow.effect_output_sizes(),
            &[(1280, 720), (2560, 1440), (3840, 2160), (3840, 2160)]
        );
    }

    #[test]
    fn test_fsr_limited_passes_adds_bilinear() {
        let mut config = config_with(Effect::Fsr, true);
        config.set_fsr_max_upsampling_passes(1);
        let flow = get_guest_output_paint_flow(
            &props((640, 360), (16, 9), false),
            &target((3840, 2160), (3840, 2160)),
            &config,
            &PresenterCvars::default(),
        );
        assert_eq!(flow.effects(), &[E::FsrEasu, E::FsrRcas, E::BilinearDither]);
        assert_eq!(flow.effect_output_sizes(), &[(1280, 720), (1280, 720), (3840, 2160)]);
    }

    #[test]
    fn test_fsr_not_upscaling_uses_cas() {
        let flow = get_guest_output_paint_flow(
            &props((1920, 1080), (16, 9), false),
            &target((1920, 1080), (1920, 1080)),
            &config_with(Effect::Fsr, true),
            &PresenterCvars::default(),
        );
        assert_eq!(flow.effects(), &[E::CasSharpenDither]);
    }

    #[test]
    fn test_fsr_clamped_to_max_render_target() {
        let mut paint_target = target((1920, 1080), (1920, 1080));
        paint_target.max_rt_width = 1024;
        paint_target.max_rt_height = 1024;
        let flow = get_guest_output_paint_flow(
            &props((640, 360), (16, 9), false),
            &paint_target,
            &config_with(Effect::Fsr, false),
            &PresenterCvars::default(),
        );
        assert_eq!(flow.effects(), &[E::FsrEasu, E::FsrEasu, E::FsrRcas, E::Bilinear]);
        assert_eq!(
            flow.effect_output_sizes(),
            &[(1024, 720), (1024, 1024), (1024, 1024), (1920, 1080)]
        );
    }

    #[test]
    fn test_dither_variants() {
        let cvars = PresenterCvars::default();
        let rt = target((1280, 720), (1280, 720));

        // 8bpc 的 1:1 复制不需要 dither
        let copy_8bpc =
            get_guest_output_paint_flow(&props((1280, 720), (16, 9), true), &rt, &config_with(Effect::Bilinear, true), &cvars);
        assert_eq!(copy_8bpc.effects(), &[E::Bilinear]);

        let copy_10bpc = get_guest_output_paint_flow(
            &props((1280, 720), (16, 9), false),
            &rt,
            &config_with(Effect::Bilinear, true),
            &cvars,
        );
        assert_eq!(copy_10bpc.effects(), &[E::BilinearDither]);

        let cas = get_guest_output_paint_flow(
            &props((640, 360), (16, 9), true),
            &rt,
            &config_with(Effect::Cas, true),
            &cvars,
        );
        assert_eq!(cas.effects(), &[E::CasResampleDither]);

        let fsr = get_guest_output_paint_flow(
            &props((640, 360), (16, 9), true),
            &rt,
            &config_with(Effect::Fsr, true),
            &cvars,
        );
        assert_eq!(fsr.effects(), &[E::FsrEasu, E::FsrRcasDither]);
    }

    #[test]
    fn test_effect_chain_is_always_valid() {
        let cvars = PresenterCvars::default();
        let sizes = [(320, 240), (640, 360), (1280, 720), (1920, 1080), (3840, 2160), (100, 1000)];
        for effect in [Effect::Bilinear, Effect::Cas, Effect::Fsr] {
            for dither in [false, true] {
                for fb in sizes {
                    for rt in sizes {
                        let flow = get_guest_output_paint_flow(
                            &props(fb, (16, 9), false),
                            &target(rt, rt),
                            &config_with(effect, dither),
                            &cvars,
                        );
                        let effects = flow.effects();
                        assert!(!effects.is_empty());
                        assert!(effects[..effects.len() - 1].iter().all(|e| e.can_be_intermediate()));
                        assert!(effects[effects.len() - 1].can_be_final());
                        assert!(flow.clear_rectangle_count <= MAX_CLEAR_RECTANGLES);
                        // letterbox 以及 guest output 覆盖整个 render target
                        let clear_area: u64 =
                            flow.clear_rectangles().iter().map(|r| r.width as u64 * r.height as u64).sum();
                        let visible_w = (flow.output_x as i64 + flow.output_width as i64).min(rt.0 as i64)
                            - (flow.output_x as i64).max(0);
                        let visible_h = (flow.output_y as i64 + flow.output_height as i64).min(rt.1 as i64)
                            - (flow.output_y as i64).max(0);
                        assert_eq!(clear_area + (visible_w * visible_h) as u64, rt.0 as u64 * rt.1 as u64);
                    }
                }
            }
        }
    }

    #[test]
    fn test_effect_properties() {
        assert!(!E::Bilinear.can_be_intermediate());
        assert!(E::FsrEasu.can_be_intermediate());
        assert!(!E::FsrEasu.can_be_final());
        assert!(E::FsrRcas.can_be_intermediate());
        assert!(!E::FsrRcasDither.can_be_intermediate());
        assert_eq!(E::ALL.len(), E::COUNT);
        assert!(E::ALL.iter().enumerate().all(|(i, e)| e.index() == i));
        assert_eq!(MAX_GUEST_OUTPUT_PAINT_EFFECTS, 6);
    }
}
