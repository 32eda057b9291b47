use std::sync::{Arc, Mutex};

use ash::{prelude::VkResult, vk};
use itertools::Itertools;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

#[derive(Clone, Debug)]
pub struct GfxQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

/// 随 `GfxDevice` 一起销毁
///
/// UI 线程的 paint 以及 guest output 线程的 `one_time_exec` 会同时使用 queue，
/// submit、present 以及 wait idle 都需要持有 `submit_lock`
pub struct GfxCommandQueue {
    pub(crate) vk_queue: vk::Queue,
    pub(crate) queue_family: GfxQueueFamily,
    pub(crate) gfx_device: Arc<GfxDevice>,

    pub(crate) submit_lock: Mutex<()>,
}
impl DebugType for GfxCommandQueue {
    fn debug_type_name() -> &'static str {
        "GfxCommandQueue"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_queue
    }
}

// getters
impl GfxCommandQueue {
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family.queue_family_index
    }
}

// tools
impl GfxCommandQueue {
    pub fn submit(&self, batches: Vec<GfxSubmitInfo>, fence: Option<vk::Fence>) -> VkResult<()> {
        // submit_infos 引用 batches 中的数组
        let submit_infos = batches.iter().map(|b| b.submit_info()).collect_vec();
        let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
        unsafe { self.gfx_device.queue_submit2(self.vk_queue, &submit_infos, fence.unwrap_or_default()) }
    }

    /// # return
    /// 和 `vkQueuePresentKHR` 一致：Ok(true) 表示 suboptimal
    pub fn present(&self, present_info: &vk::PresentInfoKHR) -> VkResult<bool> {
        let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
        unsafe { self.gfx_device.swapchain.queue_present(self.vk_queue, present_info) }
    }

    #[inline]
    pub fn wait_idle(&self) -> VkResult<()> {
        let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
        unsafe { self.gfx_device.queue_wait_idle(self.vk_queue) }
    }
}
