use anyhow::Context;
use ash::{prelude::VkResult, vk};

use crate::{
    commands::command_queue::GfxQueueFamily,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    gfx::Gfx,
};

/// 和 queue family 绑定的 command pool
///
/// 需要外部同步：presenter 的每个 paint submission 各自持有一个 pool，
/// `Gfx` 内部的 one-time pool 由 Mutex 保护
pub struct GfxCommandPool {
    handle: vk::CommandPool,
    queue_family_index: u32,

    debug_name: String,
    destroyed: bool,
}

// new & init
impl GfxCommandPool {
    #[inline]
    pub fn new(queue_family: GfxQueueFamily, flags: vk::CommandPoolCreateFlags, debug_name: &str) -> anyhow::Result<Self> {
        Self::new_internal(Gfx::get().gfx_device(), queue_family, flags, debug_name)
    }

    /// `Gfx` 初始化时单例还不可用，需要显式传入 device
    pub(crate) fn new_internal(
        gfx_device: &GfxDevice,
        queue_family: GfxQueueFamily,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let create_info =
            vk::CommandPoolCreateInfo::default().queue_family_index(queue_family.queue_family_index).flags(flags);
        let handle = unsafe { gfx_device.create_command_pool(&create_info, None) }
            .with_context(|| format!("failed to create command pool {}", debug_name))?;

        let pool = Self {
            handle,
            queue_family_index: queue_family.queue_family_index,
            debug_name: debug_name.to_string(),
            destroyed: false,
        };
        gfx_device.set_debug_name(&pool, debug_name);
        Ok(pool)
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

// tools
impl GfxCommandPool {
    /// 将 pool 内所有 command buffer 恢复到 initial 状态，调用者需要保证它们都不在 GPU 上执行
    pub fn reset(&self) -> VkResult<()> {
        unsafe { Gfx::get().gfx_device().reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty()) }
    }
}

// destroy
impl GfxCommandPool {
    pub fn destroy(mut self) {
        self.destroy_internal(Gfx::get().gfx_device());
    }

    pub(crate) fn destroy_internal(&mut self, gfx_device: &GfxDevice) {
        unsafe { gfx_device.destroy_command_pool(self.handle, None) };
        self.destroyed = true;
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "GfxCommandPool({}) must be destroyed manually.", self.debug_name);
    }
}
