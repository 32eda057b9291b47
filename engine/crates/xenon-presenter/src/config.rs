use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Presenter 相关的全局开关
///
/// 对应配置文件中的 `[presenter]` 表，缺省的字段使用默认值
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PresenterCvars {
    /// 允许 guest output 线程直接 present，而不是通过窗口系统请求 UI 线程绘制
    pub host_present_from_non_ui_thread: bool,

    /// 在支持的后端上，使用 render pass 的 clear 操作清除整个目标，
    /// 而不是只清除 letterbox 区域
    pub present_render_pass_clear: bool,

    /// 保持 guest 的宽高比；没有 overscan 区域可以裁剪时，在周围显示黑边
    ///
    /// false 时直接拉伸到 surface
    pub present_letterbox: bool,

    /// 允许裁剪 overscan 时，保留的图像宽度百分比
    pub present_safe_area_x: i32,
    /// 允许裁剪 overscan 时，保留的图像高度百分比
    pub present_safe_area_y: i32,

    /// 在支持时，为 DXGI swap chain 开启 tearing，以支持可变刷新率
    pub d3d12_allow_variable_refresh_rate_and_tearing: bool,

    /// 允许使用 VK_PRESENT_MODE_IMMEDIATE_KHR
    pub vulkan_allow_present_mode_immediate: bool,
    /// 允许使用 VK_PRESENT_MODE_MAILBOX_KHR
    pub vulkan_allow_present_mode_mailbox: bool,
    /// 允许使用 VK_PRESENT_MODE_FIFO_RELAXED_KHR
    pub vulkan_allow_present_mode_fifo_relaxed: bool,
}

impl Default for PresenterCvars {
    fn default() -> Self {
        Self {
            host_present_from_non_ui_thread: true,
            present_render_pass_clear: true,
            present_letterbox: true,
            present_safe_area_x: 100,
            present_safe_area_y: 100,
            d3d12_allow_variable_refresh_rate_and_tearing: true,
            vulkan_allow_present_mode_immediate: true,
            vulkan_allow_present_mode_mailbox: true,
            vulkan_allow_present_mode_fifo_relaxed: true,
        }
    }
}

/// 配置文件的顶层结构，presenter 只关心 `[presenter]` 表
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PresenterConfigFile {
    presenter: PresenterCvars,
}

impl PresenterCvars {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file: PresenterConfigFile = toml::from_str(content).context("presenter 配置解析失败")?;
        Ok(file.presenter)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file: PresenterConfigFile = xenon_crate_tools::toml_config::load_toml(path)?;
        Ok(file.presenter)
    }

    /// 文件不存在或者格式错误时，输出日志并使用默认值
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        xenon_crate_tools::toml_config::load_toml_or_default::<PresenterConfigFile, _>(path).presenter
    }

    /// 允许裁剪 overscan 时实际生效的 safe area
    ///
    /// 只有 (0, 100) 内的值有效，其余情况视为 100
    #[inline]
    pub fn effective_safe_area(value: i32, allow_overscan_cutoff: bool) -> u32 {
        if allow_overscan_cutoff && value > 0 && value < 100 { value as u32 } else { 100 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let cvars = PresenterCvars::from_toml_str("").unwrap();
        assert_eq!(cvars, PresenterCvars::default());
        assert!(cvars.host_present_from_non_ui_thread);
        assert_eq!(cvars.present_safe_area_x, 100);
    }

    #[test]
    fn test_partial_table() {
        let cvars = PresenterCvars::from_toml_str(
            r#"
            [presenter]
            present_letterbox = false
            present_safe_area_y = 90
            "#,
        )
        .unwrap();
        assert!(!cvars.present_letterbox);
        assert_eq!(cvars.present_safe_area_y, 90);
        assert!(cvars.present_render_pass_clear);
        assert!(cvars.vulkan_allow_present_mode_mailbox);
    }

    #[test]
    fn test_malformed_error() {
        let err = PresenterCvars::from_toml_str("[presenter]\npresent_letterbox = 3").unwrap_err();
        assert!(format!("{:?}", err).contains("presenter 配置解析失败"));
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("xenon-presenter-missing-config.toml");
        assert!(PresenterCvars::load(&path).is_err());
        assert_eq!(PresenterCvars::load_or_default(&path), PresenterCvars::default());
    }

    #[test]
    fn test_effective_safe_area() {
        assert_eq!(PresenterCvars::effective_safe_area(90, true), 90);
        assert_eq!(PresenterCvars::effective_safe_area(90, false), 100);
        assert_eq!(PresenterCvars::effective_safe_area(0, true), 100);
        assert_eq!(PresenterCvars::effective_safe_area(100, true), 100);
        assert_eq!(PresenterCvars::effective_safe_area(-5, true), 100);
    }
}
