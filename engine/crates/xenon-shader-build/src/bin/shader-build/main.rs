//! 将 `engine/shader/src` 下的 HLSL shader 编译为 SPIR-V，输出到 `engine/shader/.build`
//!
//! `.hlsli` 只会被 include，不单独编译

mod common;
mod hlsl;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{EnvPath, ShaderCompileTask};
use hlsl::HlslCompiler;
use rayon::prelude::*;
use xenon_crate_tools::init_log::init_log;

fn main() {
    init_log();

    let src_dir = EnvPath::shader_src_path();
    log::info!("compiling shaders: {:?} -> {:?}", src_dir, EnvPath::shader_build_path());

    let tasks: Vec<_> = walkdir::WalkDir::new(src_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| ShaderCompileTask::new(&entry))
        .collect();

    let compiler = HlslCompiler::new();
    let failed = AtomicUsize::new(0);
    tasks.par_iter().for_each(|task| {
        log::info!("compiling {:?}", task.shader_path);
        if let Some(dir) = task.output_path.parent()
            && let Err(e) = std::fs::create_dir_all(dir)
        {
            log::error!("failed to create {:?}: {}", dir, e);
        }
        if !compiler.compile(task) {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    });

    let failed = failed.into_inner();
    if failed > 0 {
        log::error!("{}/{} shaders failed to compile", failed, tasks.len());
        std::process::exit(1);
    }
    log::info!("{} shaders compiled", tasks.len());
}
