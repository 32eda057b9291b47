use anyhow::Context;
use ash::vk;

use xenon_gfx::resources::{image::GfxImage, image_view::GfxImageView};
use xenon_presenter::guest_output::GuestOutputRefreshContext;

/// guest output 以及 intermediate 图像的格式
///
/// 10bpc 可以保留 guest 的 10 位精度，alpha 没有用到
pub const GUEST_OUTPUT_FORMAT: vk::Format = vk::Format::A2B10G10R10_UNORM_PACK32;

/// 不被读写时，guest output 图像所处的 layout
///
/// refresher 写入完成之后，需要将图像转换到该 layout，并使 fragment shader 的读取可见
pub const GUEST_OUTPUT_INTERNAL_LAYOUT: vk::ImageLayout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
pub const GUEST_OUTPUT_INTERNAL_STAGE_MASK: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::FRAGMENT_SHADER;
pub const GUEST_OUTPUT_INTERNAL_ACCESS_MASK: vk::AccessFlags2 = vk::AccessFlags2::SHADER_SAMPLED_READ;

/// guest output 以及 paint flow 中间结果使用的图像
///
/// # Destroy
/// drop 时自动销毁，调用者需要保证 GPU 不再使用该图像
pub struct GuestOutputImage {
    image: GfxImage,
    view: GfxImageView,
}

// new & init
impl GuestOutputImage {
    pub fn new(width: u32, height: u32, debug_name: &str) -> anyhow::Result<Self> {
        let usage = vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST;
        let mut image = GfxImage::new_2d(vk::Extent2D { width, height }, GUEST_OUTPUT_FORMAT, usage, debug_name)?;

        let view = match GfxImageView::new_color_2d(image.handle(), GUEST_OUTPUT_FORMAT, format!("{}-view", debug_name)) {
            Ok(view) => view,
            Err(e) => {
                image.destroy_mut();
                return Err(e).with_context(|| format!("failed to create the view of {}", debug_name));
            }
        };

        Ok(Self { image, view })
    }
}

// getters
impl GuestOutputImage {
    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        let extent = self.image.extent();
        (extent.width, extent.height)
    }
}

impl Drop for GuestOutputImage {
    fn drop(&mut self) {
        self.view.destroy_mut();
        self.image.destroy_mut();
    }
}

/// Vulkan 后端提供给 refresher 的上下文
///
/// refresher 通过 `as_any_mut` 转换到该类型之后，获取需要写入的图像
pub struct VulkanGuestOutputRefreshContext {
    is_8bpc: bool,

    image: vk::Image,
    image_view: vk::ImageView,
    extent: vk::Extent2D,
    image_version: u64,
    image_ever_written_previously: bool,
}

// new & init
impl VulkanGuestOutputRefreshContext {
    pub fn new(image: &GuestOutputImage, image_version: u64, image_ever_written_previously: bool) -> Self {
        Self {
            is_8bpc: false,
            image: image.image(),
            image_view: image.view(),
            extent: image.extent(),
            image_version,
            image_ever_written_previously,
        }
    }
}

// getters
impl VulkanGuestOutputRefreshContext {
    #[inline]
    pub fn is_8bpc(&self) -> bool {
        self.is_8bpc
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// 图像重新创建之后版本号会增加，refresher 可以据此判断缓存的 view / framebuffer 是否过期
    #[inline]
    pub fn image_version(&self) -> u64 {
        self.image_version
    }

    /// false 时图像处于 UNDEFINED layout，写入前的 barrier 需要以 UNDEFINED 作为 old layout；
    /// 否则处于 `GUEST_OUTPUT_INTERNAL_LAYOUT`
    #[inline]
    pub fn image_ever_written_previously(&self) -> bool {
        self.image_ever_written_previously
    }

    /// 写入之前的 layout
    #[inline]
    pub fn image_current_layout(&self) -> vk::ImageLayout {
        if self.image_ever_written_previously {
            GUEST_OUTPUT_INTERNAL_LAYOUT
        } else {
            vk::ImageLayout::UNDEFINED
        }
    }
}

impl GuestOutputRefreshContext for VulkanGuestOutputRefreshContext {
    fn set_is_8bpc(&mut self, is_8bpc: bool) {
        self.is_8bpc = is_8bpc;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(ever_written: bool) -> VulkanGuestOutputRefreshContext {
        VulkanGuestOutputRefreshContext {
            is_8bpc: false,
            image: vk::Image::null(),
            image_view: vk::ImageView::null(),
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            image_version: 3,
            image_ever_written_previously: ever_written,
        }
    }

    #[test]
    fn test_refresh_context_downcast() {
        let mut ctx = context(false);
        let dyn_ctx: &mut dyn GuestOutputRefreshContext = &mut ctx;
        dyn_ctx.set_is_8bpc(true);

        let vulkan_ctx = dyn_ctx.as_any_mut().downcast_mut::<VulkanGuestOutputRefreshContext>().unwrap();
        assert!(vulkan_ctx.is_8bpc());
        assert_eq!(vulkan_ctx.image_version(), 3);
        assert_eq!(vulkan_ctx.extent().width, 1280);
    }

    #[test]
    fn test_refresh_context_layout() {
        assert_eq!(context(false).image_current_layout(), vk::ImageLayout::UNDEFINED);
        assert_eq!(context(true).image_current_layout(), GUEST_OUTPUT_INTERNAL_LAYOUT);
    }
}
