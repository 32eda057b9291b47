use anyhow::Context;
use ash::vk;
use ash::vk::Handle;
use vk_mem::{Alloc, Allocation};

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 由 VMA 分配的 2D color image，只有一个 mip level 以及一个 layer
///
/// swapchain image 由 [`crate::swapchain::swapchain::GfxSwapchain`] 直接以 `vk::Image` 持有，不经过该类型
pub struct GfxImage {
    handle: vk::Image,
    allocation: Allocation,

    extent: vk::Extent2D,

    name: String,
}
// new & init
impl GfxImage {
    /// 初始 layout 为 UNDEFINED，优先使用 device local 的独占内存
    pub fn new_2d(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let image_info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: extent.into(),
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: vk_mem::AllocationCreateFlags::DEDICATED_MEMORY,
            ..Default::default()
        };

        let (handle, allocation) = unsafe { Gfx::get().allocator().create_image(&image_info, &alloc_info) }
            .with_context(|| format!("failed to create the {}x{} image {}", extent.width, extent.height, debug_name))?;
        let image = Self {
            handle,
            allocation,
            extent,
            name: debug_name.to_string(),
        };
        Gfx::get().gfx_device().set_debug_name(&image, debug_name);
        Ok(image)
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// destroy
impl GfxImage {
    pub fn destroy_mut(&mut self) {
        if self.handle.is_null() {
            return;
        }
        log::debug!("Destroying GfxImage: {}", self.name);
        unsafe { Gfx::get().allocator().destroy_image(self.handle, &mut self.allocation) };
        self.handle = vk::Image::null();
    }
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxImage({}) must be destroyed manually.", self.name);
    }
}
