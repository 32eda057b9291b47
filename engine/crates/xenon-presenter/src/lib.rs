//! 与图形 API 无关的 Presenter 核心
//!
//! Presenter 负责把模拟器 GPU 生成的 guest output 显示到宿主窗口的 surface 上：
//! - [`mailbox`]：guest output 线程与绘制线程之间的三缓冲
//! - [`paint_flow`]：根据 surface 尺寸以及配置，决定 bilinear / CAS / FSR 的组合
//! - [`presenter`]：surface 连接以及绘制模式的状态机
//!
//! 具体的图形 API 实现位于 `xenon-presenter-vulkan` 以及 `xenon-presenter-d3d12`。

pub mod backend;
pub mod capture;
pub mod config;
pub mod guest_output;
pub mod mailbox;
pub mod paint_config;
pub mod paint_flow;
pub mod presenter;
pub mod shader_constants;
pub mod ui_drawer;
