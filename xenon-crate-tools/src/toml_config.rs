use anyhow::Context;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// 从 TOML 文件加载配置
pub fn load_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> anyhow::Result<T> {
    let content =
        fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;

    toml::from_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path.as_ref()))
}

/// 加载配置，文件不存在或者解析失败时，使用默认值
///
/// 解析失败会输出错误日志，但是不会中断程序
pub fn load_toml_or_default<T: DeserializeOwned + Default, P: AsRef<Path>>(path: P) -> T {
    let path = path.as_ref();
    if !path.exists() {
        log::info!("config file {:?} not found, using defaults", path);
        return T::default();
    }
    match load_toml(path) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{:#}, using defaults", err);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Default, Debug, PartialEq)]
    #[serde(default)]
    struct Sample {
        a: u32,
        b: bool,
    }

    #[test]
    fn test_missing_file_uses_default() {
        let sample: Sample = load_toml_or_default("this/file/does/not/exist.toml");
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_load_error_has_path_context() {
        let err = load_toml::<Sample, _>("this/file/does/not/exist.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("exist.toml"));
    }

    #[test]
    fn test_load_from_temp_file() {
        let path = std::env::temp_dir().join(format!("xenon-toml-config-{}.toml", std::process::id()));
        fs::write(&path, "a = 7\nb = true\n").unwrap();
        let sample: Sample = load_toml(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(sample, Sample { a: 7, b: true });
    }
}
