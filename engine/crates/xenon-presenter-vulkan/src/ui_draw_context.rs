use std::any::Any;

use ash::vk;

use xenon_gfx::commands::command_buffer::GfxCommandBuffer;
use xenon_presenter::ui_drawer::UiDrawContext;

/// 绘制 UI 时提供给 drawer 的上下文
///
/// drawer 在 swapchain image 的 dynamic rendering 内部录制命令，
/// 不能开启新的 rendering，也不能录制 transfer 命令
pub struct VulkanUiDrawContext {
    pub(crate) command_buffer: GfxCommandBuffer,
    pub(crate) color_format: vk::Format,
    pub(crate) render_target_width: u32,
    pub(crate) render_target_height: u32,

    /// 本次绘制对应的 submission，drawer 可以据此延迟释放资源
    pub(crate) submission_index: u64,
    pub(crate) completed_submission_index: u64,
}

// getters
impl VulkanUiDrawContext {
    #[inline]
    pub fn command_buffer(&self) -> &GfxCommandBuffer {
        &self.command_buffer
    }

    /// drawer 的 pipeline 需要使用该格式作为 color attachment 格式
    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
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

impl UiDrawContext for VulkanUiDrawContext {
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
