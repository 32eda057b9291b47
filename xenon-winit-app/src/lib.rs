//! Presenter 的演示程序
//!
//! - guest output 线程以固定的间隔生成测试画面，模拟模拟器 GPU 的输出
//! - UI 线程响应窗口事件，通过键盘切换 paint flow 的配置
//!
//! 按键：`1` / `2` / `3` 切换 bilinear / CAS / FSR，`D` 切换 dither，`O` 切换 overscan 裁剪，
//! `R` 切换 guest 的分辨率，`H` 显示或隐藏 overlay，`C` 截图，`Esc` 退出

pub mod app;
pub mod demo_config;
pub mod guest_output_producer;
pub mod overlay_drawer;
pub mod winit_event_adapter;
pub mod winit_surface;
