//! 绘制线程使用的状态，由 paint 锁保护

use std::sync::Arc;

use ash::vk;

use xenon_gfx::{
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, semaphore::GfxSemaphore,
        submission_tracker::GfxSubmissionTracker,
    },
    gfx::Gfx,
    pipelines::graphics_pipeline::GfxGraphicsPipeline,
    swapchain::{surface::GfxSurface, swapchain::GfxSwapchain},
};
use xenon_presenter::paint_flow::{GuestOutputPaintEffect, MAX_GUEST_OUTPUT_PAINT_EFFECTS};

use crate::guest_output_image::GuestOutputImage;

/// 同时在 GPU 上执行的绘制数量
pub const PAINT_SUBMISSION_COUNT: usize = 3;

/// 一次绘制使用的 command buffer 以及 semaphore
///
/// 只有在该槽位上一次的提交完成之后才能复用
pub struct PaintSubmission {
    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,

    /// acquire swapchain image 时 signal，绘制时 wait
    acquire_semaphore: GfxSemaphore,
    /// 绘制完成时 signal，present 时 wait
    present_semaphore: GfxSemaphore,
}

// 创建与销毁
impl PaintSubmission {
    pub fn new(index: usize) -> anyhow::Result<Self> {
        let command_pool = GfxCommandPool::new(
            Gfx::get().gfx_queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            &format!("presenter-paint-{}", index),
        )?;
        let command_buffer = match GfxCommandBuffer::new(&command_pool, &format!("presenter-paint-{}", index)) {
            Ok(command_buffer) => command_buffer,
            Err(e) => {
                command_pool.destroy();
                return Err(e);
            }
        };

        let acquire_semaphore = match GfxSemaphore::new_binary(&format!("presenter-acquire-{}", index)) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                command_pool.destroy();
                return Err(e);
            }
        };
        let present_semaphore = match GfxSemaphore::new_binary(&format!("presenter-present-{}", index)) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                acquire_semaphore.destroy();
                command_pool.destroy();
                return Err(e);
            }
        };

        Ok(Self {
            command_pool,
            command_buffer,
            acquire_semaphore,
            present_semaphore,
        })
    }

    pub fn destroy(self) {
        self.acquire_semaphore.destroy();
        self.present_semaphore.destroy();
        // command buffer 随着 command pool 一起释放
        self.command_pool.destroy();
    }
}

// getters
impl PaintSubmission {
    #[inline]
    pub fn command_pool(&self) -> &GfxCommandPool {
        &self.command_pool
    }

    #[inline]
    pub fn command_buffer(&self) -> &GfxCommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn acquire_semaphore(&self) -> &GfxSemaphore {
        &self.acquire_semaphore
    }

    #[inline]
    pub fn present_semaphore(&self) -> &GfxSemaphore {
        &self.present_semaphore
    }
}

/// 与 surface 之间的连接
///
/// # Destroy
/// drop 时先销毁 swapchain 再销毁 surface，调用者需要先等待使用 swapchain 的提交完成
pub struct SurfaceConnection {
    /// 声明顺序决定 drop 顺序，swapchain 在 Drop 中被手动销毁
    pub swapchain: Option<GfxSwapchain>,
    pub surface: GfxSurface,

    /// 当前的 present mode 是否隐式开启了垂直同步
    pub is_vsync: bool,
}

impl Drop for SurfaceConnection {
    fn drop(&mut self) {
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy();
        }
    }
}

/// 绘制到 swapchain 使用的 pipeline，swapchain 的格式变化时需要重建
pub struct SwapchainPipeline {
    pub format: vk::Format,
    pub pipeline: GfxGraphicsPipeline,
}

pub struct VulkanPaintContext {
    pub connection: Option<SurfaceConnection>,

    pub submissions: Vec<PaintSubmission>,
    pub submission_tracker: GfxSubmissionTracker,

    /// 按照 `GuestOutputPaintEffect::index` 索引
    pub swapchain_pipelines: Vec<Option<SwapchainPipeline>>,
    /// 最后一次使用 swapchain pipeline 的提交
    pub guest_output_paint_last_submission: u64,

    /// paint flow 中间 effect 的输出
    pub intermediates: Vec<Option<GuestOutputImage>>,
    pub intermediate_last_submission: u64,

    /// 正在被 GPU 读取的 guest output 图像，以及最后一次读取它的提交
    ///
    /// guest output 线程可能在绘制期间重建图像，这里持有引用直到提交完成
    pub guest_output_paint_refs: Vec<(u64, Arc<GuestOutputImage>)>,
}

// 创建与销毁
impl VulkanPaintContext {
    pub fn new() -> anyhow::Result<Self> {
        let mut submissions = Vec::with_capacity(PAINT_SUBMISSION_COUNT);
        for index in 0..PAINT_SUBMISSION_COUNT {
            match PaintSubmission::new(index) {
                Ok(submission) => submissions.push(submission),
                Err(e) => {
                    submissions.into_iter().for_each(PaintSubmission::destroy);
                    return Err(e);
                }
            }
        }
        let submission_tracker = match GfxSubmissionTracker::new("presenter-paint") {
            Ok(tracker) => tracker,
            Err(e) => {
                submissions.into_iter().for_each(PaintSubmission::destroy);
                return Err(e);
            }
        };

        Ok(Self {
            connection: None,
            submissions,
            submission_tracker,
            swapchain_pipelines: (0..GuestOutputPaintEffect::COUNT).map(|_| None).collect(),
            guest_output_paint_last_submission: 0,
            intermediates: (0..MAX_GUEST_OUTPUT_PAINT_EFFECTS - 1).map(|_| None).collect(),
            intermediate_last_submission: 0,
            guest_output_paint_refs: Vec::new(),
        })
    }

    /// 等待所有的提交完成，之后释放所有的资源
    pub fn destroy(&mut self) {
        self.submission_tracker.await_all_submissions_completion();
        self.destroy_connection();
        self.guest_output_paint_refs.clear();
        self.intermediates.iter_mut().for_each(|intermediate| *intermediate = None);
        self.swapchain_pipelines.iter_mut().for_each(|pipeline| *pipeline = None);
        std::mem::take(&mut self.submissions).into_iter().for_each(PaintSubmission::destroy);
        self.submission_tracker.destroy_mut();
    }
}

// tools
impl VulkanPaintContext {
    /// 销毁 swapchain 以及 surface
    pub fn destroy_connection(&mut self) {
        if self.connection.is_some() {
            self.submission_tracker.await_all_submissions_completion();
            self.connection = None;
        }
    }

    /// 释放 GPU 已经不再读取的 guest output 图像
    pub fn release_completed_paint_refs(&mut self) {
        let completed = self.submission_tracker.update_and_get_completed_submission();
        self.guest_output_paint_refs.retain(|(submission, _)| *submission > completed);
    }

    /// 记录 guest output 图像被本次提交读取
    pub fn add_paint_ref(&mut self, image: &Arc<GuestOutputImage>, submission: u64) {
        match self.guest_output_paint_refs.iter_mut().find(|(_, existing)| Arc::ptr_eq(existing, image)) {
            Some((last_submission, _)) => *last_submission = submission,
            None => self.guest_output_paint_refs.push((submission, image.clone())),
        }
    }
}
