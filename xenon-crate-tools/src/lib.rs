//! Xenon 工具集
//!
//! 提供日志初始化、路径管理以及 TOML 配置读取等通用工具。
//!
//! # XenonPath
//! 基于工作区根目录的统一路径管理，避免硬编码相对路径。

pub mod init_log;
pub mod resource;
pub mod toml_config;
