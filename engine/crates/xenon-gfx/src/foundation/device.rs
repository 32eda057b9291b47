use anyhow::Context;
use ash::vk;
use std::{
    ffi::{CStr, CString},
    ops::Deref,
};

use crate::foundation::debug_messenger::DebugType;

/// Presenter 依赖的 device extensions
///
/// - dynamic rendering 已经提升到 core-1.3.0，为了使用 ext 的函数指针，依然显式开启
/// - guest output 以及中间图像的 descriptor 直接 push 到 command buffer 中
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 3] = [
    ash::khr::swapchain::NAME,
    ash::khr::dynamic_rendering::NAME,
    ash::khr::push_descriptor::NAME,
];

/// 找出 `available` 中缺失的必要 extension
pub fn missing_device_extensions<'a>(available: impl IntoIterator<Item = &'a CStr> + Clone) -> Vec<&'static CStr> {
    REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .copied()
        .filter(|required| !available.clone().into_iter().any(|ext| ext == *required))
        .collect()
}

/// Vulkan 逻辑设备，附带 presenter 用到的扩展函数指针
pub struct GfxDevice {
    pub(crate) device: ash::Device,
    pub(crate) dynamic_rendering: ash::khr::dynamic_rendering::Device,
    pub(crate) debug_utils: ash::ext::debug_utils::Device,
    pub(crate) swapchain: ash::khr::swapchain::Device,
    pub(crate) push_descriptor: ash::khr::push_descriptor::Device,

    #[cfg(debug_assertions)]
    destroyed: std::sync::atomic::AtomicBool,
}

// new & init
impl GfxDevice {
    pub fn new(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        queue_create_info: &[vk::DeviceQueueCreateInfo],
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GfxDevice::new");

        let available = unsafe { instance.enumerate_device_extension_properties(pdevice) }
            .context("failed to enumerate device extensions")?;
        let missing = missing_device_extensions(available.iter().filter_map(|p| p.extension_name_as_c_str().ok()));
        anyhow::ensure!(missing.is_empty(), "device extensions not supported: {:?}", missing);

        let ext_names = REQUIRED_DEVICE_EXTENSIONS.map(CStr::as_ptr);
        log::info!("device exts: {:?}", REQUIRED_DEVICE_EXTENSIONS);

        // submission tracker 使用 timeline semaphore 追踪 GPU 进度
        let mut timeline_semaphore = vk::PhysicalDeviceTimelineSemaphoreFeatures::default().timeline_semaphore(true);
        let mut sync2 = vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);
        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut timeline_semaphore)
            .push_next(&mut sync2)
            .push_next(&mut dynamic_rendering);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(queue_create_info)
            .enabled_extension_names(&ext_names)
            .push_next(&mut features);

        let device = unsafe { instance.create_device(pdevice, &device_create_info, None) }
            .context("failed to create vulkan device")?;

        Ok(Self {
            dynamic_rendering: ash::khr::dynamic_rendering::Device::new(instance, &device),
            debug_utils: ash::ext::debug_utils::Device::new(instance, &device),
            swapchain: ash::khr::swapchain::Device::new(instance, &device),
            push_descriptor: ash::khr::push_descriptor::Device::new(instance, &device),
            device,

            #[cfg(debug_assertions)]
            destroyed: std::sync::atomic::AtomicBool::new(false),
        })
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }
}

// tools
impl GfxDevice {
    /// debug name 设置失败只输出警告
    pub fn set_object_debug_name<T: vk::Handle>(&self, handle: T, name: impl AsRef<str>) {
        let Ok(name) = CString::new(name.as_ref()) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default().object_name(&name).object_handle(handle);
        if let Err(e) = unsafe { self.debug_utils.set_debug_utils_object_name(&info) } {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    /// 名称带上类型前缀，例如 `GfxSemaphore::xxx`
    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        self.set_object_debug_name(handle.vk_handle(), format!("{}::{}", T::debug_type_name(), name.as_ref()));
    }

    #[inline]
    pub fn wait_idle(&self) -> ash::prelude::VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

// destroy
impl GfxDevice {
    pub fn destroy(&self) {
        log::info!("destroying device");

        #[cfg(debug_assertions)]
        self.destroyed.store(true, std::sync::atomic::Ordering::Relaxed);

        unsafe { self.device.destroy_device(None) };
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
impl Drop for GfxDevice {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(
            self.destroyed.load(std::sync::atomic::Ordering::Relaxed),
            "GfxDevice must be destroyed before being dropped."
        );
    }
}
impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_extensions() {
        let all = REQUIRED_DEVICE_EXTENSIONS.to_vec();
        assert!(missing_device_extensions(all.iter().copied()).is_empty());

        let without_push = [ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];
        assert_eq!(missing_device_extensions(without_push.iter().copied()), vec![ash::khr::push_descriptor::NAME]);

        let none: [&CStr; 0] = [];
        assert_eq!(missing_device_extensions(none.iter().copied()).len(), 3);
    }
}
