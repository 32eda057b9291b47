use ash::vk::Handle;
use ash::{prelude::VkResult, vk};

use crate::{
    commands::semaphore::GfxSemaphore,
    gfx::Gfx,
    resources::image_view::GfxImageView,
    swapchain::surface::GfxSurface,
};

pub struct GfxSwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_usage: vk::ImageUsageFlags,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// 期望的最少 image 数量，会被限制在 surface 支持的范围内
    pub min_image_count: u32,
}

/// 不持有 surface，surface 的生命周期由使用者管理
///
/// # Destroy
/// 需要手动调用 `destroy`
pub struct GfxSwapchain {
    handle: vk::SwapchainKHR,

    images: Vec<vk::Image>,
    image_views: Vec<GfxImageView>,

    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

// new & init
impl GfxSwapchain {
    /// # param
    /// * old_swapchain - 重建时传入旧的 swapchain，用于复用其资源；调用者仍需要销毁旧的 swapchain
    pub fn new(
        surface: &GfxSurface,
        desc: &GfxSwapchainDesc,
        old_swapchain: vk::SwapchainKHR,
        debug_name: &str,
    ) -> VkResult<Self> {
        let surface_capabilities = surface.capabilities()?;

        // 确定 image count
        // max_image_count == 0，表示不限制 image 数量
        let image_count = Self::calculate_image_count(&surface_capabilities, desc.min_image_count);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.image_usage)
            .pre_transform(desc.pre_transform)
            .composite_alpha(desc.composite_alpha)
            .present_mode(desc.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe { gfx_device.swapchain.create_swapchain(&create_info, None)? };
        gfx_device.set_object_debug_name(handle, debug_name);

        let images = match unsafe { gfx_device.swapchain.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { gfx_device.swapchain.destroy_swapchain(handle, None) };
                return Err(e);
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for (idx, image) in images.iter().enumerate() {
            gfx_device.set_object_debug_name(*image, format!("{}-image-{}", debug_name, idx));
            let view = GfxImageView::new_color_2d(*image, desc.surface_format.format, format!("{}-{}", debug_name, idx));
            match view {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    log::error!("failed to create swapchain image view: {:?}", e);
                    image_views.into_iter().for_each(GfxImageView::destroy);
                    unsafe { gfx_device.swapchain.destroy_swapchain(handle, None) };
                    return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
                }
            }
        }

        log::info!(
            "create swapchain {}: {}x{}, format: {:?}, present mode: {:?}, image count: {}",
            debug_name,
            desc.extent.width,
            desc.extent.height,
            desc.surface_format.format,
            desc.present_mode,
            images.len()
        );

        Ok(Self {
            handle,
            images,
            image_views,
            format: desc.surface_format.format,
            extent: desc.extent,
            present_mode: desc.present_mode,
        })
    }
}

// getters
impl GfxSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[GfxImageView] {
        &self.image_views
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

// tools
impl GfxSwapchain {
    /// 确定 window 的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == 0xFFFFFFFF || surface_extent.height == 0xFFFFFFFF {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    pub fn calculate_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR, desired: u32) -> u32 {
        let count = desired.max(surface_capabilities.min_image_count);
        if surface_capabilities.max_image_count == 0 {
            count
        } else {
            count.min(surface_capabilities.max_image_count)
        }
    }

    /// 不等待超时，由调用者根据返回值决定是否重建 swapchain
    ///
    /// # return
    /// (image index, is suboptimal)
    pub fn acquire_next_image(&self, semaphore: &GfxSemaphore) -> VkResult<(u32, bool)> {
        unsafe {
            Gfx::get().gfx_device().swapchain.acquire_next_image(
                self.handle,
                u64::MAX,
                semaphore.handle(),
                vk::Fence::null(),
            )
        }
    }
}

// destroy
impl GfxSwapchain {
    pub fn destroy(mut self) {
        std::mem::take(&mut self.image_views).into_iter().for_each(GfxImageView::destroy);
        unsafe {
            Gfx::get().gfx_device().swapchain.destroy_swapchain(self.handle, None);
        }
        self.handle = vk::SwapchainKHR::null();
    }
}
impl Drop for GfxSwapchain {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxSwapchain must be destroyed manually before drop.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_surface() {
        let extent =
            GfxSwapchain::calculate_swapchain_extent(&caps((1280, 720)), vk::Extent2D { width: 64, height: 64 });
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_extent_from_window_clamped() {
        let extent = GfxSwapchain::calculate_swapchain_extent(
            &caps((0xFFFFFFFF, 0xFFFFFFFF)),
            vk::Extent2D {
                width: 8000,
                height: 600,
            },
        );
        assert_eq!((extent.width, extent.height), (4096, 600));
    }

    #[test]
    fn test_image_count() {
        let mut caps = caps((640, 480));
        caps.min_image_count = 2;
        assert_eq!(GfxSwapchain::calculate_image_count(&caps, 3), 3);
        caps.max_image_count = 2;
        assert_eq!(GfxSwapchain::calculate_image_count(&caps, 3), 2);
        caps.min_image_count = 4;
        caps.max_image_count = 0;
        assert_eq!(GfxSwapchain::calculate_image_count(&caps, 3), 4);
    }
}
