use std::ffi::{CStr, CString};

use anyhow::Context;
use ash::vk;

use crate::foundation::debug_messenger::GfxDebugMessenger;

/// 总是开启的 instance extensions，窗口系统相关的 surface extension 由外部传入
///
/// - debug utils 提供 debug messenger、object debug name 以及 command label
/// - surface 是所有平台 surface extension 的基础
pub const BASE_INSTANCE_EXTENSIONS: [&CStr; 2] = [vk::EXT_DEBUG_UTILS_NAME, vk::KHR_SURFACE_NAME];

/// 合并 base 以及 extra extension 并去重，保持首次出现的顺序
///
/// # return
/// 有任何一个不被支持时返回 Err，包含所有缺失的 extension
pub fn resolve_instance_extensions<'a>(
    extra: &[&'static CStr],
    available: &[&'a CStr],
) -> anyhow::Result<Vec<&'static CStr>> {
    let mut resolved: Vec<&'static CStr> = Vec::new();
    for ext in BASE_INSTANCE_EXTENSIONS.iter().chain(extra).copied() {
        if !resolved.contains(&ext) {
            resolved.push(ext);
        }
    }

    let missing: Vec<_> = resolved.iter().filter(|ext| !available.contains(*ext)).collect();
    anyhow::ensure!(missing.is_empty(), "instance extensions not supported: {:?}", missing);
    Ok(resolved)
}

/// 只是函数指针以及裸的 handle，生命周期由 `GfxCore` 手动控制
pub struct GfxInstance {
    pub(crate) ash_instance: ash::Instance,
}

// new & init
impl GfxInstance {
    /// validation layer 不在这里开启，由 vulkan configurator 控制
    pub fn new(
        vk_entry: &ash::Entry,
        app_name: String,
        engine_name: String,
        extra_instance_exts: Vec<&'static CStr>,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GfxInstance::new");

        let app_name = CString::new(app_name).context("app name contains nul")?;
        let engine_name = CString::new(engine_name).context("engine name contains nul")?;
        // 版本过低时，有些函数无法正确加载
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3)
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let ext_props = unsafe { vk_entry.enumerate_instance_extension_properties(None) }
            .context("failed to enumerate instance extensions")?;
        let available: Vec<&CStr> = ext_props.iter().filter_map(|p| p.extension_name_as_c_str().ok()).collect();
        let extensions = resolve_instance_extensions(&extra_instance_exts, &available)?;
        log::info!("instance extensions: {:?}", extensions);

        let ext_names: Vec<_> = extensions.iter().map(|ext| ext.as_ptr()).collect();
        // instance 创建以及销毁过程中的消息也需要输出
        let mut debug_messenger_ci = GfxDebugMessenger::debug_utils_messenger_ci();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&ext_names)
            .push_next(&mut debug_messenger_ci);

        let ash_instance =
            unsafe { vk_entry.create_instance(&instance_ci, None) }.context("failed to create vulkan instance")?;
        Ok(Self { ash_instance })
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn vk_instance(&self) -> vk::Instance {
        self.ash_instance.handle()
    }
}

// destroy
impl GfxInstance {
    pub fn destroy(self) {
        log::info!("destroying instance");
        unsafe { self.ash_instance.destroy_instance(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_dedup_and_order() {
        let available = [vk::KHR_SURFACE_NAME, vk::EXT_DEBUG_UTILS_NAME, ash::khr::win32_surface::NAME];
        let resolved =
            resolve_instance_extensions(&[ash::khr::win32_surface::NAME, vk::KHR_SURFACE_NAME], &available).unwrap();
        assert_eq!(resolved, vec![vk::EXT_DEBUG_UTILS_NAME, vk::KHR_SURFACE_NAME, ash::khr::win32_surface::NAME]);
    }

    #[test]
    fn test_resolve_missing() {
        let available = [vk::KHR_SURFACE_NAME, vk::EXT_DEBUG_UTILS_NAME];
        let err = resolve_instance_extensions(&[ash::khr::xlib_surface::NAME], &available).unwrap_err();
        assert!(err.to_string().contains("VK_KHR_xlib_surface"));
    }
}
