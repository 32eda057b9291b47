use ash::vk;

use crate::commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore};

/// 一次 `vkQueueSubmit2` 的 batch
///
/// 可以不包含 command buffer，只用于 signal semaphore
#[derive(Default)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBufferSubmitInfo<'static>>,
    waits: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signals: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

// new & init
impl GfxSubmitInfo {
    pub fn new(commands: &[GfxCommandBuffer]) -> Self {
        Self {
            command_buffers: commands
                .iter()
                .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(cmd.vk_handle()))
                .collect(),
            ..Default::default()
        }
    }

    /// 等待 binary semaphore，例如 swapchain 的 acquire semaphore
    pub fn wait_binary(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.waits.push(Self::semaphore_info(semaphore, stage, 0));
        self
    }

    pub fn signal_binary(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signals.push(Self::semaphore_info(semaphore, stage, 0));
        self
    }

    /// 在 batch 完成时将 timeline semaphore 设置为 `value`
    pub fn signal_timeline(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2, value: u64) -> Self {
        self.signals.push(Self::semaphore_info(semaphore, stage, value));
        self
    }
}

// getters
impl GfxSubmitInfo {
    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo2<'_> {
        vk::SubmitInfo2::default()
            .command_buffer_infos(&self.command_buffers)
            .wait_semaphore_infos(&self.waits)
            .signal_semaphore_infos(&self.signals)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.command_buffers.is_empty() && self.waits.is_empty() && self.signals.is_empty()
    }
}

// tools
impl GfxSubmitInfo {
    fn semaphore_info(
        semaphore: &GfxSemaphore,
        stage: vk::PipelineStageFlags2,
        value: u64,
    ) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default().semaphore(semaphore.handle()).stage_mask(stage).value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_only_batch() {
        let batch = GfxSubmitInfo::new(&[]);
        assert!(batch.is_empty());
        let info = batch.submit_info();
        assert_eq!(info.command_buffer_info_count, 0);
        assert_eq!(info.signal_semaphore_info_count, 0);
    }
}
