//! 运行时编译的 HLSL 源码
//!
//! 和 Vulkan 后端共用 `engine/shader/src/present` 下的源码。
//! `D3DCompile` 没有提供文件系统的 include handler，因此在编译之前展开 `#include "..."`

use std::path::{Path, PathBuf};

use anyhow::Context;

use xenon_crate_tools::resource::XenonPath;

/// include 的最大嵌套深度，超过时视为循环 include
const MAX_INCLUDE_DEPTH: usize = 16;

/// 解析 `#include "path"`，其他形式的 include 不做处理
fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start().strip_prefix("include")?.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}

fn expand(
    source: &str,
    dir: &Path,
    depth: usize,
    load: &mut dyn FnMut(&Path) -> anyhow::Result<String>,
) -> anyhow::Result<String> {
    anyhow::ensure!(depth <= MAX_INCLUDE_DEPTH, "the include depth exceeds {}", MAX_INCLUDE_DEPTH);

    let mut expanded = String::with_capacity(source.len());
    for line in source.lines() {
        match parse_include(line) {
            Some(include) => {
                let path = dir.join(include);
                let included = load(&path).with_context(|| format!("failed to load {}", path.display()))?;
                let included_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                expanded.push_str(&expand(&included, &included_dir, depth + 1, load)?);
            }
            None => expanded.push_str(line),
        }
        expanded.push('\n');
    }
    Ok(expanded)
}

/// 展开 `source` 中的 `#include "..."`，路径相对于 `dir`
pub fn expand_includes(
    source: &str,
    dir: &Path,
    load: &mut dyn FnMut(&Path) -> anyhow::Result<String>,
) -> anyhow::Result<String> {
    expand(source, dir, 0, load)
}

/// 读取 `engine/shader/src` 下的 shader，并展开其中的 include
pub fn load_shader_source(relative_path: &str) -> anyhow::Result<String> {
    let path: PathBuf = XenonPath::shader_src_path(relative_path);
    let source = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    expand_includes(&source, &dir, &mut |path| Ok(std::fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_include() {
        assert_eq!(parse_include("#include \"include/common.hlsli\""), Some("include/common.hlsli"));
        assert_eq!(parse_include("  #  include   \"a.hlsli\"  "), Some("a.hlsli"));
        assert_eq!(parse_include("#include <a.hlsli>"), None);
        assert_eq!(parse_include("#define DITHER 1"), None);
    }

    #[test]
    fn test_expand_nested() {
        let mut load = |path: &Path| -> anyhow::Result<String> {
            match path.to_string_lossy().replace('\\', "/").as_str() {
                "present/include/a.hlsli" => Ok("#include \"b.hlsli\"\nfloat a;".to_string()),
                "present/include/b.hlsli" => Ok("float b;".to_string()),
                other => anyhow::bail!("unexpected {}", other),
            }
        };
        let expanded =
            expand_includes("#define DITHER 1\n#include \"include/a.hlsli\"\nfloat c;", Path::new("present"), &mut load)
                .unwrap();
        assert_eq!(expanded, "#define DITHER 1\nfloat b;\n\nfloat a;\n\nfloat c;\n");
    }

    #[test]
    fn test_expand_recursive_include() {
        let mut load = |_: &Path| -> anyhow::Result<String> { Ok("#include \"self.hlsli\"".to_string()) };
        assert!(expand_includes("#include \"self.hlsli\"", Path::new(""), &mut load).is_err());
    }
}
