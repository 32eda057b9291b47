//! presenter 使用的 Vulkan 封装
//!
//! 只覆盖 presenter 需要的部分：单个全能 queue、dynamic rendering、push descriptor、
//! 2D color image、readback buffer 以及 swapchain。
//! 所有对象通过 [`gfx::Gfx`] 单例访问 device 以及 allocator。
//!
//! UI 线程以及 guest output 线程会同时访问 GPU，因此 queue 的提交以及 one-time command pool 都由 Mutex 保护。

pub mod basic;
pub mod commands;
pub mod descriptors;
pub mod foundation;
pub mod gfx;
pub mod gfx_core;
pub mod pipelines;
pub mod resources;
pub mod sampler;
pub mod swapchain;
