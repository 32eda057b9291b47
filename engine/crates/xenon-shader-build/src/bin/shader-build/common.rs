//! 着色器编译的共享类型和工具

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use xenon_crate_tools::resource::XenonPath;

/// Shader 的执行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    /// HLSL Pixel shader
    Fragment,
    Compute,
}

/// 当前项目的环境路径，基于 workspace 根目录
pub struct EnvPath;

impl EnvPath {
    /// Shader 源码路径
    pub fn shader_src_path() -> &'static Path {
        static PATH: OnceLock<PathBuf> = OnceLock::new();
        PATH.get_or_init(|| XenonPath::shader_root_path().join("src"))
    }

    /// 编译 shader 的输出路径
    pub fn shader_build_path() -> &'static Path {
        static PATH: OnceLock<PathBuf> = OnceLock::new();
        PATH.get_or_init(|| XenonPath::shader_root_path().join(".build"))
    }
}

/// 一个具体的编译任务
#[derive(Debug)]
pub struct ShaderCompileTask {
    pub shader_path: PathBuf,
    pub output_path: PathBuf,
    pub shader_stage: ShaderStage,
}

impl ShaderCompileTask {
    /// 从目录项创建编译任务
    ///
    /// # return
    /// 文件不是可以单独编译的 shader 时（例如 `.hlsli`）返回 None
    pub fn new(entry: &walkdir::DirEntry) -> Option<Self> {
        let shader_path = entry.path();
        let relative_path = shader_path.strip_prefix(EnvPath::shader_src_path()).ok()?;
        let shader_name = entry.file_name().to_str()?;

        let shader_stage = Self::parse_shader_stage(shader_name)?;
        let output_path = Self::output_path(EnvPath::shader_build_path(), relative_path);

        Some(Self {
            shader_path: shader_path.to_path_buf(),
            output_path,
            shader_stage,
        })
    }

    /// 根据文件名解析 shader stage
    pub fn parse_shader_stage(shader_name: &str) -> Option<ShaderStage> {
        let stage = match () {
            _ if shader_name.ends_with(".vs.hlsl") => ShaderStage::Vertex,
            _ if shader_name.ends_with(".ps.hlsl") => ShaderStage::Fragment,
            _ if shader_name.ends_with(".cs.hlsl") => ShaderStage::Compute,
            _ => return None,
        };
        Some(stage)
    }

    /// 输出路径和源码的相对路径一致，在原有的扩展名之后追加 `.spv`
    ///
    /// 和 `XenonPath::shader_build_path` 的规则保持一致
    pub fn output_path(build_dir: &Path, relative_path: &Path) -> PathBuf {
        let mut output_path = build_dir.join(relative_path).into_os_string();
        output_path.push(".spv");
        PathBuf::from(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shader_stage() {
        assert_eq!(
            ShaderCompileTask::parse_shader_stage("guest_output_rect.vs.hlsl"),
            Some(ShaderStage::Vertex)
        );
        assert_eq!(
            ShaderCompileTask::parse_shader_stage("guest_output_fsr_easu.ps.hlsl"),
            Some(ShaderStage::Fragment)
        );
        assert_eq!(ShaderCompileTask::parse_shader_stage("guest_output_common.hlsli"), None);
        assert_eq!(ShaderCompileTask::parse_shader_stage("readme.md"), None);
    }

    #[test]
    fn test_output_path() {
        let output = ShaderCompileTask::output_path(
            Path::new("/shader/.build"),
            Path::new("present/guest_output_rect.vs.hlsl"),
        );
        assert_eq!(output, PathBuf::from("/shader/.build/present/guest_output_rect.vs.hlsl.spv"));
    }
}
