use serde::Deserialize;

/// guest output 绘制时使用的后处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    Bilinear,
    /// AMD FidelityFX Contrast Adaptive Sharpening
    Cas,
    /// AMD FidelityFX Super Resolution
    Fsr,
}

/// guest output 的绘制配置，由 UI 线程设置，绘制时读取
///
/// 所有数值通过 setter 修改，setter 会将数值限制在合法范围内
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "GuestOutputPaintConfigDesc")]
pub struct GuestOutputPaintConfig {
    allow_overscan_cutoff: bool,
    effect: Effect,
    cas_additional_sharpness: f32,
    fsr_max_upsampling_passes: u32,
    fsr_sharpness_reduction: f32,
    dither: bool,
}

impl GuestOutputPaintConfig {
    pub const CAS_ADDITIONAL_SHARPNESS_MIN: f32 = 0.0;
    pub const CAS_ADDITIONAL_SHARPNESS_MAX: f32 = 1.0;
    pub const CAS_ADDITIONAL_SHARPNESS_DEFAULT: f32 = 0.0;

    /// 每个 EASU pass 最多放大 2x2，4 个 pass 可以覆盖 16x16
    pub const FSR_MAX_UPSCALING_PASSES_MAX: u32 = 4;

    /// 以 stop 为单位，0 表示最锐利
    pub const FSR_SHARPNESS_REDUCTION_MIN: f32 = 0.0;
    pub const FSR_SHARPNESS_REDUCTION_MAX: f32 = 2.0;
    pub const FSR_SHARPNESS_REDUCTION_DEFAULT: f32 = 0.2;
}

impl Default for GuestOutputPaintConfig {
    fn default() -> Self {
        Self {
            allow_overscan_cutoff: false,
            effect: Effect::Bilinear,
            cas_additional_sharpness: Self::CAS_ADDITIONAL_SHARPNESS_DEFAULT,
            fsr_max_upsampling_passes: Self::FSR_MAX_UPSCALING_PASSES_MAX,
            fsr_sharpness_reduction: Self::FSR_SHARPNESS_REDUCTION_DEFAULT,
            dither: false,
        }
    }
}

// getters
impl GuestOutputPaintConfig {
    #[inline]
    pub fn allow_overscan_cutoff(&self) -> bool {
        self.allow_overscan_cutoff
    }
    #[inline]
    pub fn effect(&self) -> Effect {
        self.effect
    }
    #[inline]
    pub fn cas_additional_sharpness(&self) -> f32 {
        self.cas_additional_sharpness
    }
    #[inline]
    pub fn fsr_max_upsampling_passes(&self) -> u32 {
        self.fsr_max_upsampling_passes
    }
    #[inline]
    pub fn fsr_sharpness_reduction(&self) -> f32 {
        self.fsr_sharpness_reduction
    }
    #[inline]
    pub fn dither(&self) -> bool {
        self.dither
    }
}

// setters
impl GuestOutputPaintConfig {
    #[inline]
    pub fn set_allow_overscan_cutoff(&mut self, allow_overscan_cutoff: bool) {
        self.allow_overscan_cutoff = allow_overscan_cutoff;
    }

    #[inline]
    pub fn set_effect(&mut self, effect: Effect) {
        self.effect = effect;
    }

    /// NaN 会被限制为最小值
    pub fn set_cas_additional_sharpness(&mut self, sharpness: f32) {
        self.cas_additional_sharpness =
            Self::CAS_ADDITIONAL_SHARPNESS_MAX.min(Self::CAS_ADDITIONAL_SHARPNESS_MIN.max(sharpness));
    }

    pub fn set_fsr_max_upsampling_passes(&mut self, passes: u32) {
        self.fsr_max_upsampling_passes = passes.clamp(1, Self::FSR_MAX_UPSCALING_PASSES_MAX);
    }

    /// NaN 会被限制为最小值
    pub fn set_fsr_sharpness_reduction(&mut self, reduction: f32) {
        self.fsr_sharpness_reduction =
            Self::FSR_SHARPNESS_REDUCTION_MAX.min(Self::FSR_SHARPNESS_REDUCTION_MIN.max(reduction));
    }

    #[inline]
    pub fn set_dither(&mut self, dither: bool) {
        self.dither = dither;
    }
}

/// 配置文件中的形式，读取后经过 setter 限制范围
#[derive(Debug, Deserialize)]
#[serde(default)]
struct GuestOutputPaintConfigDesc {
    allow_overscan_cutoff: bool,
    effect: Effect,
    cas_additional_sharpness: f32,
    fsr_max_upsampling_passes: u32,
    fsr_sharpness_reduction: f32,
    dither: bool,
}
impl Default for GuestOutputPaintConfigDesc {
    fn default() -> Self {
        let config = GuestOutputPaintConfig::default();
        Self {
            allow_overscan_cutoff: config.allow_overscan_cutoff,
            effect: config.effect,
            cas_additional_sharpness: config.cas_additional_sharpness,
            fsr_max_upsampling_passes: config.fsr_max_upsampling_passes,
            fsr_sharpness_reduction: config.fsr_sharpness_reduction,
            dither: config.dither,
        }
    }
}
impl From<GuestOutputPaintConfigDesc> for GuestOutputPaintConfig {
    fn from(desc: GuestOutputPaintConfigDesc) -> Self {
        let mut config = GuestOutputPaintConfig::default();
        config.set_allow_overscan_cutoff(desc.allow_overscan_cutoff);
        config.set_effect(desc.effect);
        config.set_cas_additional_sharpness(desc.cas_additional_sharpness);
        config.set_fsr_max_upsampling_passes(desc.fsr_max_upsampling_passes);
        config.set_fsr_sharpness_reduction(desc.fsr_sharpness_reduction);
        config.set_dither(desc.dither);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = GuestOutputPaintConfig::default();
        assert_eq!(config.effect(), Effect::Bilinear);
        assert_eq!(config.fsr_max_upsampling_passes(), 4);
        assert_eq!(config.fsr_sharpness_reduction(), 0.2);
        assert!(!config.dither());
        assert!(!config.allow_overscan_cutoff());
    }

    #[test]
    fn test_setters_clamp() {
        let mut config = GuestOutputPaintConfig::default();
        config.set_cas_additional_sharpness(3.0);
        assert_eq!(config.cas_additional_sharpness(), 1.0);
        config.set_cas_additional_sharpness(-1.0);
        assert_eq!(config.cas_additional_sharpness(), 0.0);

        config.set_fsr_max_upsampling_passes(0);
        assert_eq!(config.fsr_max_upsampling_passes(), 1);
        config.set_fsr_max_upsampling_passes(100);
        assert_eq!(config.fsr_max_upsampling_passes(), 4);

        config.set_fsr_sharpness_reduction(5.0);
        assert_eq!(config.fsr_sharpness_reduction(), 2.0);
    }

    #[test]
    fn test_nan_becomes_min() {
        let mut config = GuestOutputPaintConfig::default();
        config.set_cas_additional_sharpness(f32::NAN);
        assert_eq!(config.cas_additional_sharpness(), 0.0);
        config.set_fsr_sharpness_reduction(f32::NAN);
        assert_eq!(config.fsr_sharpness_reduction(), 0.0);
    }

    #[test]
    fn test_deserialize_clamps() {
        let config: GuestOutputPaintConfig = toml::from_str(
            r#"
            effect = "fsr"
            fsr_max_upsampling_passes = 9
            cas_additional_sharpness = 0.5
            dither = true
            "#,
        )
        .unwrap();
        assert_eq!(config.effect(), Effect::Fsr);
        assert_eq!(config.fsr_max_upsampling_passes(), 4);
        assert_eq!(config.cas_additional_sharpness(), 0.5);
        assert_eq!(config.fsr_sharpness_reduction(), 0.2);
        assert!(config.dither());
    }
}
