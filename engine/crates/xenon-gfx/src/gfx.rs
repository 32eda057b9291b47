use std::ffi::CStr;
use std::sync::Mutex;

use anyhow::Context;
use ash::vk;

use crate::gfx_core::GfxCore;
use crate::{
    commands::{
        command_buffer::GfxCommandBuffer,
        command_pool::GfxCommandPool,
        command_queue::{GfxCommandQueue, GfxQueueFamily},
        submit_info::GfxSubmitInfo,
    },
    foundation::{
        device::GfxDevice, instance::GfxInstance, physical_device::GfxPhysicalDevice, vmem_allocator::VMemAllocator,
    },
};

/// 进程内唯一的 Vulkan 上下文
///
/// `init` 和 `destroy` 只在主线程调用。两者之间其他线程通过 `Gfx::get()` 共享只读访问，
/// 需要可变访问的部分（queue 提交、one-time command pool）自带 Mutex。
///
/// ```ignore
/// Gfx::init("xenon-demo".to_string(), surface_exts)?;
/// let backend = VulkanPresenterBackend::new(cvars)?;
/// // ...
/// drop(backend);
/// Gfx::destroy();
/// ```
pub struct Gfx {
    pub(crate) gfx_core: GfxCore,
    pub(crate) vm_allocator: VMemAllocator,

    /// `one_time_exec` 使用的 command pool，每次使用后释放 command buffer
    one_time_pool: Mutex<GfxCommandPool>,
}

static mut G_GFX: Option<Gfx> = None;

// new & init
impl Gfx {
    /// # Parameters
    /// - `instance_extra_exts`: 一般是窗口系统要求的 surface 扩展
    pub fn init(app_name: String, instance_extra_exts: Vec<&'static CStr>) -> anyhow::Result<()> {
        let gfx_core = GfxCore::new(app_name, "Xenon".to_string(), instance_extra_exts)?;

        // 单例还没有准备好，需要显式传递 device
        let one_time_pool = GfxCommandPool::new_internal(
            &gfx_core.gfx_device,
            gfx_core.physical_device.gfx_queue_family.clone(),
            vk::CommandPoolCreateFlags::TRANSIENT,
            "gfx-one-time",
        )?;
        let vm_allocator = VMemAllocator::new(
            &gfx_core.instance.ash_instance,
            gfx_core.physical_device.vk_handle,
            &gfx_core.gfx_device,
        )?;

        unsafe {
            let ptr = std::ptr::addr_of_mut!(G_GFX);
            anyhow::ensure!((*ptr).is_none(), "Gfx already initialized");
            *ptr = Some(Self {
                gfx_core,
                vm_allocator,
                one_time_pool: Mutex::new(one_time_pool),
            });
        }
        Ok(())
    }

    /// # Panics
    /// 在 `init` 之前或者 `destroy` 之后调用
    #[inline]
    pub fn get() -> &'static Gfx {
        // 不能直接对 static mut 创建引用
        let gfx = unsafe { (*std::ptr::addr_of!(G_GFX)).as_ref() };
        match gfx {
            Some(gfx) => gfx,
            None => panic!("Gfx::get() called outside of Gfx::init() .. Gfx::destroy()"),
        }
    }
}

// getters
impl Gfx {
    #[inline]
    pub fn instance(&self) -> &GfxInstance {
        &self.gfx_core.instance
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.gfx_core.physical_device
    }

    #[inline]
    pub fn gfx_device(&self) -> &GfxDevice {
        &self.gfx_core.gfx_device
    }

    #[inline]
    pub fn allocator(&self) -> &VMemAllocator {
        &self.vm_allocator
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> GfxQueueFamily {
        self.gfx_core.physical_device.gfx_queue_family.clone()
    }

    /// 绘制以及 present 都在这个 queue 上进行
    #[inline]
    pub fn gfx_queue(&self) -> &GfxCommandQueue {
        &self.gfx_core.gfx_queue
    }

    /// guest output 以及中间图像能够使用的最大尺寸
    #[inline]
    pub fn max_2d_framebuffer_extent(&self) -> vk::Extent2D {
        self.gfx_core.physical_device.max_2d_framebuffer_extent()
    }
}

// tools
impl Gfx {
    /// 录制并提交一次性的命令，等待 queue 空闲后返回
    pub fn one_time_exec<F, R>(&self, func: F, name: impl AsRef<str>) -> anyhow::Result<R>
    where
        F: FnOnce(&GfxCommandBuffer) -> R,
    {
        let name = name.as_ref();
        let pool = self.one_time_pool.lock().unwrap_or_else(|e| e.into_inner());
        let cmd = GfxCommandBuffer::new(&pool, &format!("one-time-{name}"))?;

        let record_and_submit = || -> anyhow::Result<R> {
            cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name)?;
            let result = func(&cmd);
            cmd.end()?;

            let queue = self.gfx_queue();
            queue.submit(vec![GfxSubmitInfo::new(std::slice::from_ref(&cmd))], None)?;
            queue.wait_idle()?;
            Ok(result)
        };
        let result = record_and_submit().with_context(|| format!("one time exec {name} failed"));

        unsafe { self.gfx_device().free_command_buffers(pool.handle(), &[cmd.vk_handle()]) };
        result
    }
}

// destroy
impl Gfx {
    /// 之后不能再调用 `Gfx::get()`
    pub fn destroy() {
        let gfx = unsafe { (*std::ptr::addr_of_mut!(G_GFX)).take() };
        let Some(gfx) = gfx else {
            log::warn!("Gfx::destroy called without init");
            return;
        };

        if let Err(e) = gfx.gfx_core.gfx_device.wait_idle() {
            log::error!("failed to wait device idle before destroy: {:?}", e);
        }

        gfx.vm_allocator.destroy();
        gfx.one_time_pool
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .destroy_internal(&gfx.gfx_core.gfx_device);
        gfx.gfx_core.destroy();
    }
}
