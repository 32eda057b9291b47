use std::ffi::CStr;
use std::sync::Arc;

use anyhow::Context;
use ash::vk;

use crate::{
    commands::command_queue::GfxCommandQueue,
    foundation::{
        debug_messenger::GfxDebugMessenger, device::GfxDevice, instance::GfxInstance,
        physical_device::GfxPhysicalDevice,
    },
};

/// `Gfx` 持有的 Vulkan 核心对象，销毁顺序和创建顺序相反
pub struct GfxCore {
    /// drop 时会卸载 vulkan loader，因此需要最后 drop
    pub(crate) vk_entry: ash::Entry,

    pub(crate) instance: GfxInstance,
    pub(crate) physical_device: GfxPhysicalDevice,

    /// queue 会被 UI 线程以及 guest output 线程同时使用，因此共享 device
    pub(crate) gfx_device: Arc<GfxDevice>,

    pub(crate) debug_messenger: GfxDebugMessenger,

    /// guest output 的刷新、绘制以及 present 都使用这一个 queue
    pub(crate) gfx_queue: GfxCommandQueue,
}

// new & init
impl GfxCore {
    pub fn new(app_name: String, engine_name: String, instance_extra_exts: Vec<&'static CStr>) -> anyhow::Result<Self> {
        let vk_entry = unsafe { ash::Entry::load() }.context("failed to load vulkan entry")?;
        let instance = GfxInstance::new(&vk_entry, app_name, engine_name, instance_extra_exts)?;
        let physical_device = GfxPhysicalDevice::pick(instance.ash_instance())?;
        let family = physical_device.gfx_queue_family.clone();

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(family.queue_family_index)
            .queue_priorities(&queue_priorities)];
        let gfx_device = Arc::new(GfxDevice::new(instance.ash_instance(), physical_device.vk_handle, &queue_create_infos)?);

        let debug_messenger = GfxDebugMessenger::new(&vk_entry, instance.ash_instance())?;

        log::info!("gfx queue family: {:?}", family);
        let gfx_queue = GfxCommandQueue {
            vk_queue: unsafe { gfx_device.get_device_queue(family.queue_family_index, 0) },
            queue_family: family,
            gfx_device: gfx_device.clone(),
            submit_lock: Default::default(),
        };

        gfx_device.set_object_debug_name(instance.vk_instance(), "GfxInstance");
        gfx_device.set_object_debug_name(physical_device.vk_handle, "GfxPhysicalDevice");
        gfx_device.set_object_debug_name(gfx_device.vk_handle(), "GfxDevice");
        gfx_device.set_object_debug_name(gfx_queue.vk_queue, "GfxCommandQueue-gfx");

        Ok(Self {
            vk_entry,
            instance,
            physical_device,
            gfx_device,
            debug_messenger,
            gfx_queue,
        })
    }
}

// destroy
impl GfxCore {
    pub fn destroy(self) {
        drop(self.debug_messenger);
        self.gfx_device.destroy();
        self.instance.destroy();
    }
}
