use anyhow::Context;
use windows::Win32::{
    Foundation::{CloseHandle, HANDLE},
    Graphics::Direct3D12::{D3D12_FENCE_FLAG_NONE, ID3D12CommandQueue, ID3D12Device, ID3D12Fence},
    System::Threading::{CreateEventW, INFINITE, WaitForSingleObject},
};

/// 基于 `ID3D12Fence` 的提交追踪
///
/// 每一次提交都有一个递增的编号（从 1 开始），由 queue 在之前的命令完成之后 signal。
/// 接口和 `GfxSubmissionTracker` 保持一致
///
/// # Destroy
/// drop 时会等待所有的提交完成
pub struct D3D12SubmissionTracker {
    queue: ID3D12CommandQueue,
    fence: ID3D12Fence,
    event: HANDLE,

    /// 下一次提交将会使用的编号
    current_submission: u64,

    name: String,
}

// 创建与销毁
impl D3D12SubmissionTracker {
    pub fn new(device: &ID3D12Device, queue: &ID3D12CommandQueue, name: impl AsRef<str>) -> anyhow::Result<Self> {
        let name = name.as_ref().to_string();
        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }
            .with_context(|| format!("[{}] failed to create the fence", name))?;
        let event = unsafe { CreateEventW(None, false, false, None) }
            .with_context(|| format!("[{}] failed to create the fence event", name))?;
        Ok(Self {
            queue: queue.clone(),
            fence,
            event,
            current_submission: 1,
            name,
        })
    }
}

// getters
impl D3D12SubmissionTracker {
    /// 下一次提交的编号
    #[inline]
    pub fn current_submission(&self) -> u64 {
        self.current_submission
    }
}

// tools
impl D3D12SubmissionTracker {
    /// 已经完成的最大提交编号
    ///
    /// 设备丢失时 fence 的值为 u64::MAX，所有的提交都视为已完成
    #[inline]
    pub fn completed_submission(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    /// 阻塞等待某次提交完成
    ///
    /// 尚未提交的编号会被截断到最后一次提交
    ///
    /// # return
    /// 等待失败时返回 false
    pub fn await_submission_completion(&self, submission: u64) -> bool {
        let submission = submission.min(self.current_submission - 1);
        if self.completed_submission() >= submission {
            return true;
        }
        let _span = tracy_client::span!("D3D12SubmissionTracker::await");
        if let Err(e) = unsafe { self.fence.SetEventOnCompletion(submission, self.event) } {
            log::error!("[{}] failed to await submission {}: {}", self.name, submission, e);
            return false;
        }
        unsafe { WaitForSingleObject(self.event, INFINITE) };
        true
    }

    #[inline]
    pub fn await_all_submissions_completion(&self) -> bool {
        self.await_submission_completion(self.current_submission - 1)
    }

    /// 在 queue 中 signal 当前的编号，之前提交到该 queue 的命令完成之后 signal 才会发生
    ///
    /// # return
    /// signal 失败时编号不会增加
    pub fn next_submission(&mut self) -> bool {
        if let Err(e) = unsafe { self.queue.Signal(&self.fence, self.current_submission) } {
            log::error!("[{}] failed to signal submission {}: {}", self.name, self.current_submission, e);
            return false;
        }
        self.current_submission += 1;
        true
    }
}

impl Drop for D3D12SubmissionTracker {
    fn drop(&mut self) {
        self.await_all_submissions_completion();
        if !self.event.is_invalid() {
            let _ = unsafe { CloseHandle(self.event) };
        }
    }
}
