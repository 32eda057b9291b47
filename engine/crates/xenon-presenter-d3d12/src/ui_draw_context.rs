use std::any::Any;

use windows::Win32::Graphics::{Direct3D12::ID3D12GraphicsCommandList, Dxgi::Common::DXGI_FORMAT};

use xenon_presenter::ui_drawer::UiDrawContext;

/// 绘制 UI 时提供给 drawer 的上下文
///
/// 录制开始时 back buffer 已经处于 RENDER_TARGET 状态并且已经绑定，
/// drawer 可以修改 pipeline / root signature / descriptor heap，但是不能切换 render target
pub struct D3D12UiDrawContext {
    pub(crate) command_list: ID3D12GraphicsCommandList,
    pub(crate) render_target_format: DXGI_FORMAT,
    pub(crate) render_target_width: u32,
    pub(crate) render_target_height: u32,

    /// 本次绘制对应的 paint submission，drawer 可以据此延迟释放资源
    pub(crate) submission_index: u64,
    pub(crate) completed_submission_index: u64,
}

// getters
impl D3D12UiDrawContext {
    #[inline]
    pub fn command_list(&self) -> &ID3D12GraphicsCommandList {
        &self.command_list
    }

    #[inline]
    pub fn render_target_format(&self) -> DXGI_FORMAT {
        self.render_target_format
    }

    #[inline]
    pub fn submission_index(&self) -> u64 {
        self.submission_index
    }

    #[inline]
    pub fn completed_submission_index(&self) -> u64 {
        self.completed_submission_index
    }
}

impl UiDrawContext for D3D12UiDrawContext {
    fn render_target_width(&self) -> u32 {
        self.render_target_width
    }

    fn render_target_height(&self) -> u32 {
        self.render_target_height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
