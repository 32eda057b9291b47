use serde::Deserialize;

use xenon_crate_tools::{resource::XenonPath, toml_config::load_toml_or_default};
use xenon_presenter::paint_config::GuestOutputPaintConfig;

/// 演示窗口相关的配置，对应配置文件中的 `[window]` 表
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemoWindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// guest output 线程生成一帧的间隔
    pub frame_interval_ms: u64,
}

impl Default for DemoWindowConfig {
    fn default() -> Self {
        Self {
            title: "Xenon Presenter".to_string(),
            width: 1280,
            height: 720,
            frame_interval_ms: 16,
        }
    }
}

/// 演示程序的配置文件
///
/// `[presenter]` 表由 `PresenterCvars` 从同一个文件中读取
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub window: DemoWindowConfig,
    /// 启动时的 guest output 绘制配置
    pub guest_output: GuestOutputPaintConfig,
}

impl DemoConfig {
    pub const FILE_NAME: &'static str = "xenon.toml";

    /// 配置文件位于 workspace 根目录
    pub fn load_or_default() -> Self {
        load_toml_or_default(XenonPath::config_path(Self::FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xenon_presenter::paint_config::Effect;

    #[test]
    fn test_parse_partial() {
        let config: DemoConfig = toml::from_str(
            r#"
            [window]
            width = 800

            [guest_output]
            effect = "fsr"
            dither = true

            [presenter]
            present_letterbox = false
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, DemoWindowConfig::default().height);
        assert_eq!(config.guest_output.effect(), Effect::Fsr);
        assert!(config.guest_output.dither());
    }

    #[test]
    fn test_empty_is_default() {
        let config: DemoConfig = toml::from_str("").unwrap();
        assert_eq!(config, DemoConfig::default());
    }
}
