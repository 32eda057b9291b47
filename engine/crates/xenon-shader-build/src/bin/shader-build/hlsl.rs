//! 使用 dxc (来自 Vulkan SDK) 将 HLSL 编译为 SPIR-V
//!
//! D3D12 后端在运行时通过 `D3DCompile` 编译同一份源码，因此源码需要兼容 Shader Model 5
//!
//! # 参考
//! - [Vulkan HLSL Guide](https://docs.vulkan.org/guide/latest/hlsl.html)

use std::ffi::OsString;

use crate::common::{ShaderCompileTask, ShaderStage};

const SHADER_MODEL: &str = "6_0";
const ENTRY_POINT: &str = "main";

#[derive(Debug)]
pub struct HlslCompiler {
    dxc: OsString,
}

impl HlslCompiler {
    /// 可以通过 `XENON_DXC` 指定 dxc 的路径，默认从 PATH 中查找
    pub fn new() -> Self {
        Self {
            dxc: std::env::var_os("XENON_DXC").unwrap_or_else(|| "dxc".into()),
        }
    }

    pub fn target_profile(stage: ShaderStage) -> String {
        let prefix = match stage {
            ShaderStage::Vertex => "vs",
            ShaderStage::Fragment => "ps",
            ShaderStage::Compute => "cs",
        };
        format!("{prefix}_{SHADER_MODEL}")
    }

    /// include 目录为 shader 所在目录，`#include "include/xxx.hlsli"` 相对于它解析
    pub fn dxc_args(task: &ShaderCompileTask) -> Vec<OsString> {
        let include_dir = task.shader_path.parent().unwrap_or(&task.shader_path);
        vec![
            "-spirv".into(),
            "-T".into(),
            Self::target_profile(task.shader_stage).into(),
            "-E".into(),
            ENTRY_POINT.into(),
            "-I".into(),
            include_dir.into(),
            task.shader_path.clone().into(),
            "-Fo".into(),
            task.output_path.clone().into(),
        ]
    }

    /// 编译输出直接写入日志
    ///
    /// # return
    /// 是否编译成功
    pub fn compile(&self, task: &ShaderCompileTask) -> bool {
        let output = match std::process::Command::new(&self.dxc).args(Self::dxc_args(task)).output() {
            Ok(output) => output,
            Err(e) => {
                log::error!("failed to execute {:?}: {}", self.dxc, e);
                return false;
            }
        };

        if !output.stdout.is_empty() {
            log::info!("{:?} stdout: {}", task.shader_path, String::from_utf8_lossy(&output.stdout));
        }
        if !output.stderr.is_empty() {
            log::error!("{:?} stderr: {}", task.shader_path, String::from_utf8_lossy(&output.stderr));
        }
        output.status.success()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_target_profile() {
        assert_eq!(HlslCompiler::target_profile(ShaderStage::Vertex), "vs_6_0");
        assert_eq!(HlslCompiler::target_profile(ShaderStage::Fragment), "ps_6_0");
    }

    #[test]
    fn test_dxc_args() {
        let task = ShaderCompileTask {
            shader_path: PathBuf::from("/src/present/guest_output_bilinear.ps.hlsl"),
            output_path: PathBuf::from("/build/present/guest_output_bilinear.ps.hlsl.spv"),
            shader_stage: ShaderStage::Fragment,
        };
        let args = HlslCompiler::dxc_args(&task);
        assert_eq!(args[0], "-spirv");
        assert_eq!(args[2], "ps_6_0");
        assert_eq!(args[6], OsString::from("/src/present"));
        assert_eq!(args.last(), Some(&OsString::from("/build/present/guest_output_bilinear.ps.hlsl.spv")));
    }
}
