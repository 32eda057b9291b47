//! Presenter 的 Direct3D 12 后端
//!
//! - guest output 纹理的格式为 R10G10B10A2，不被读写时处于 PIXEL_SHADER_RESOURCE
//! - swap chain 使用 flip discard 模型，格式为 B8G8R8A8，支持时可以开启 tearing
//! - shader 在运行时通过 `D3DCompile` 从 `engine/shader/src` 编译
//!
//! 与平台无关的部分（descriptor 布局、shader include 展开、swap chain 尺寸）在所有平台上编译以便测试

pub mod descriptor_layout;
pub mod shader_source;
pub mod swap_chain_config;

#[cfg(windows)]
pub mod d3d12_presenter;
#[cfg(windows)]
pub mod guest_output_resource;
#[cfg(windows)]
pub mod paint;
#[cfg(windows)]
pub mod paint_context;
#[cfg(windows)]
pub mod pipelines;
#[cfg(windows)]
pub mod provider;
#[cfg(windows)]
pub mod submission_tracker;
#[cfg(windows)]
pub mod ui_draw_context;
#[cfg(windows)]
pub mod util;

#[cfg(windows)]
pub use d3d12_presenter::D3D12PresenterBackend;
#[cfg(windows)]
pub use provider::D3D12Provider;
