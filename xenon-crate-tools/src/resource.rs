use std::{
    env,
    path::{Path, PathBuf},
};

/// 统一路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
/// 避免使用硬编码相对路径，确保在不同构建环境下路径一致。
///
/// # 使用示例
/// ```ignore
/// let config = XenonPath::config_path("xenon.toml");                 // xenon.toml
/// let shader = XenonPath::shader_build_path_str("present/guest_output_rect.vs.hlsl");
/// ```
pub struct XenonPath {}
// 核心路径
impl XenonPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // 从当前包的位置推导workspace目录
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().map(Path::to_path_buf).unwrap_or_else(|| manifest_dir.to_path_buf())
    }

    pub fn target_path() -> PathBuf {
        Self::workspace_path().join("target")
    }
}
// 根目录下
impl XenonPath {
    pub fn engine_path() -> PathBuf {
        Self::workspace_path().join("engine")
    }

    /// 获取工作区根目录下的配置文件路径
    pub fn config_path(filename: &str) -> PathBuf {
        Self::workspace_path().join(filename)
    }

    /// 截图等输出文件存放的目录
    pub fn captures_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("captures").join(filename)
    }
}
// engine 目录下
impl XenonPath {
    pub fn shader_root_path() -> PathBuf {
        Self::engine_path().join("shader")
    }

    /// shader 源码目录：`engine/shader/src`
    pub fn shader_src_path(filename: &str) -> PathBuf {
        Self::shader_root_path().join("src").join(filename)
    }

    /// 获取 `shader/.build/` 目录下的着色器路径（编译后的 SPIR-V）
    pub fn shader_build_path(filename: &str) -> PathBuf {
        let mut shader_path = Self::shader_root_path().join(".build").join(filename).into_os_string();
        shader_path.push(".spv");
        PathBuf::from(shader_path)
    }

    pub fn shader_build_path_str(filename: &str) -> String {
        Self::shader_build_path(filename).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_build_path_appends_spv() {
        let path = XenonPath::shader_build_path_str("present/guest_output_rect.vs.hlsl");
        assert!(path.ends_with("guest_output_rect.vs.hlsl.spv"));
        assert!(path.contains(".build"));
    }

    #[test]
    fn test_workspace_contains_engine() {
        assert_eq!(XenonPath::engine_path().parent(), Some(XenonPath::workspace_path().as_path()));
    }
}
