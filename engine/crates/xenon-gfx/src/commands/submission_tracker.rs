use std::sync::atomic::{AtomicU64, Ordering};

use ash::{prelude::VkResult, vk};

use crate::commands::{command_queue::GfxCommandQueue, semaphore::GfxSemaphore, submit_info::GfxSubmitInfo};

/// 基于 timeline semaphore 的提交追踪
///
/// 每一次提交都有一个递增的编号（从 1 开始），提交完成时 timeline 的值会被设为该编号。
/// 用于保证 GPU 资源在 GPU 使用完毕之前不会被复用或销毁：
/// 资源记录最后一次使用它的提交编号，在复用或销毁之前等待该编号完成。
///
/// # Destroy
/// 需要手动调用 `destroy`，会先等待所有的提交完成
pub struct GfxSubmissionTracker {
    timeline: GfxSemaphore,

    /// 下一次提交将会使用的编号
    current_submission: u64,
    /// 最近一次查询到的已完成编号
    completed_submission: AtomicU64,

    name: String,
    destroyed: bool,
}

// 创建与销毁
impl GfxSubmissionTracker {
    pub fn new(name: impl AsRef<str>) -> anyhow::Result<Self> {
        let timeline = GfxSemaphore::new_timeline(0, &format!("{}-submission-tracker", name.as_ref()))?;
        Ok(Self {
            timeline,
            current_submission: 1,
            completed_submission: AtomicU64::new(0),
            name: name.as_ref().to_string(),
            destroyed: false,
        })
    }

    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    /// 重复调用不会有任何效果
    pub fn destroy_mut(&mut self) {
        if self.destroyed {
            return;
        }
        self.await_all_submissions_completion();
        self.timeline.clone().destroy();
        self.destroyed = true;
    }
}

// getters
impl GfxSubmissionTracker {
    /// 下一次提交的编号
    #[inline]
    pub fn current_submission(&self) -> u64 {
        self.current_submission
    }

    #[inline]
    pub fn timeline(&self) -> &GfxSemaphore {
        &self.timeline
    }
}

// tools
impl GfxSubmissionTracker {
    /// 查询 GPU 的进度，并返回已经完成的最大提交编号
    ///
    /// 查询失败（例如 device lost）时返回之前缓存的值
    pub fn update_and_get_completed_submission(&self) -> u64 {
        match self.timeline.counter() {
            Ok(value) => {
                self.completed_submission.fetch_max(value, Ordering::AcqRel);
            }
            Err(e) => {
                log::error!("[{}] failed to query the submission timeline: {:?}", self.name, e);
            }
        }
        self.completed_submission.load(Ordering::Acquire)
    }

    /// 阻塞等待某次提交完成
    ///
    /// 尚未提交的编号会被截断到最后一次提交
    ///
    /// # return
    /// 等待失败时返回 false，此时无法保证 GPU 已经不再使用相关资源
    pub fn await_submission_completion(&self, submission: u64) -> bool {
        let submission = submission.min(self.current_submission - 1);
        if self.completed_submission.load(Ordering::Acquire) >= submission {
            return true;
        }
        let _span = tracy_client::span!("GfxSubmissionTracker::await");
        match self.timeline.wait_for(submission, u64::MAX) {
            Ok(()) => {
                self.completed_submission.fetch_max(submission, Ordering::AcqRel);
                true
            }
            Err(e) => {
                log::error!("[{}] failed to await submission {}: {:?}", self.name, submission, e);
                false
            }
        }
    }

    #[inline]
    pub fn await_all_submissions_completion(&self) -> bool {
        self.await_submission_completion(self.current_submission - 1)
    }

    /// 提交一个 batch，并在 batch 完成时 signal 当前的提交编号
    ///
    /// batch 为 None 时，只提交一个 signal，
    /// 由于 queue 的提交顺序，signal 会在之前所有提交的命令完成之后发生
    ///
    /// # return
    /// 成功时返回这次提交的编号；失败时编号不会增加
    pub fn submit(&mut self, queue: &GfxCommandQueue, batch: Option<GfxSubmitInfo>) -> VkResult<u64> {
        let submission = self.current_submission;
        let batch =
            batch.unwrap_or_default().signal_timeline(&self.timeline, vk::PipelineStageFlags2::ALL_COMMANDS, submission);
        queue.submit(vec![batch], None)?;
        self.current_submission += 1;
        Ok(submission)
    }
}

impl Drop for GfxSubmissionTracker {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "GfxSubmissionTracker({}) must be destroyed manually.", self.name);
    }
}
