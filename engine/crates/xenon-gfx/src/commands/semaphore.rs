use anyhow::Context;
use ash::{prelude::VkResult, vk};

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// binary 或者 timeline semaphore
///
/// 可以 Clone，所以不实现 Drop，需要手动 `destroy`
#[derive(Clone)]
pub struct GfxSemaphore {
    handle: vk::Semaphore,
    is_timeline: bool,
}

// new & init
impl GfxSemaphore {
    /// swapchain acquire 以及 present 使用的 binary semaphore
    pub fn new_binary(debug_name: &str) -> anyhow::Result<Self> {
        Self::create(&vk::SemaphoreCreateInfo::default(), false, debug_name)
    }

    pub fn new_timeline(initial_value: u64, debug_name: &str) -> anyhow::Result<Self> {
        let mut type_info =
            vk::SemaphoreTypeCreateInfo::default().semaphore_type(vk::SemaphoreType::TIMELINE).initial_value(initial_value);
        Self::create(&vk::SemaphoreCreateInfo::default().push_next(&mut type_info), true, debug_name)
    }

    fn create(create_info: &vk::SemaphoreCreateInfo, is_timeline: bool, debug_name: &str) -> anyhow::Result<Self> {
        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe { gfx_device.create_semaphore(create_info, None) }
            .with_context(|| format!("failed to create semaphore {}", debug_name))?;

        let semaphore = Self { handle, is_timeline };
        gfx_device.set_debug_name(&semaphore, debug_name);
        Ok(semaphore)
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }

    #[inline]
    pub fn is_timeline(&self) -> bool {
        self.is_timeline
    }
}

// tools
impl GfxSemaphore {
    /// 阻塞直到 timeline 的值不小于 `value`
    pub fn wait_for(&self, value: u64, timeout_ns: u64) -> VkResult<()> {
        debug_assert!(self.is_timeline);
        let semaphores = [self.handle];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default().semaphores(&semaphores).values(&values);
        unsafe { Gfx::get().gfx_device().wait_semaphores(&wait_info, timeout_ns) }
    }

    /// timeline 的当前值，不会阻塞
    #[inline]
    pub fn counter(&self) -> VkResult<u64> {
        debug_assert!(self.is_timeline);
        unsafe { Gfx::get().gfx_device().get_semaphore_counter_value(self.handle) }
    }
}

// destroy
impl GfxSemaphore {
    #[inline]
    pub fn destroy(self) {
        unsafe { Gfx::get().gfx_device().destroy_semaphore(self.handle, None) };
    }
}

impl DebugType for GfxSemaphore {
    fn debug_type_name() -> &'static str {
        "GfxSemaphore"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
