use anyhow::Context;
use ash::{prelude::VkResult, vk};

use crate::foundation::debug_messenger::DebugType;
use crate::gfx::Gfx;

/// # Destroy
/// drop 时自动销毁
pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

impl GfxSurface {
    pub fn new(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let gfx_core = &Gfx::get().gfx_core;
        let surface_pf = ash::khr::surface::Instance::new(&gfx_core.vk_entry, &gfx_core.instance.ash_instance);

        let surface = unsafe {
            ash_window::create_surface(
                &gfx_core.vk_entry,
                &gfx_core.instance.ash_instance,
                raw_display_handle,
                raw_window_handle,
                None,
            )
        }
        .with_context(|| format!("failed to create surface {}", debug_name))?;

        let surface = GfxSurface {
            handle: surface,
            pf: surface_pf,
        };
        gfx_core.gfx_device.set_debug_name(&surface, debug_name);

        Ok(surface)
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// 实时查询，窗口尺寸变化后结果也会变化
    pub fn capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.pf
                .get_physical_device_surface_capabilities(Gfx::get().physical_device().vk_handle, self.handle)
        }
    }

    pub fn formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.pf.get_physical_device_surface_formats(Gfx::get().physical_device().vk_handle, self.handle) }
    }

    pub fn present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.pf
                .get_physical_device_surface_present_modes(Gfx::get().physical_device().vk_handle, self.handle)
        }
    }

    /// 指定的 queue family 是否可以向该 surface 呈现
    pub fn supports_queue_family(&self, queue_family_index: u32) -> VkResult<bool> {
        unsafe {
            self.pf.get_physical_device_surface_support(
                Gfx::get().physical_device().vk_handle,
                queue_family_index,
                self.handle,
            )
        }
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
