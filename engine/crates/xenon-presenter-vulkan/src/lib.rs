//! Presenter 的 Vulkan 后端
//!
//! - guest output 图像的格式为 A2B10G10R10，不被读写时处于 SHADER_READ_ONLY_OPTIMAL
//! - 使用 dynamic rendering 以及 push descriptor，不需要 render pass / framebuffer / descriptor pool
//! - 同时最多有 3 次绘制在 GPU 上执行，通过 timeline semaphore 追踪

pub mod guest_output_image;
pub mod paint;
pub mod paint_context;
pub mod pipelines;
pub mod swapchain_config;
pub mod ui_draw_context;
pub mod vulkan_presenter;

pub use vulkan_presenter::VulkanPresenterBackend;
