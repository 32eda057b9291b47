use anyhow::Context;
use ash::vk;
use ash::vk::Handle;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 2D color image 的 view，覆盖唯一的 mip level 以及 layer
pub struct GfxImageView {
    handle: vk::ImageView,
}
// new & init
impl GfxImageView {
    /// # param
    /// * format - 可以是 image 格式的重解释
    pub fn new_color_2d(image: vk::Image, format: vk::Format, name: impl AsRef<str>) -> anyhow::Result<Self> {
        let gfx_device = Gfx::get().gfx_device();

        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let handle = unsafe { gfx_device.create_image_view(&info, None) }
            .with_context(|| format!("failed to create the image view {}", name.as_ref()))?;
        let image_view = Self { handle };
        gfx_device.set_debug_name(&image_view, name.as_ref());
        Ok(image_view)
    }
}
// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }
}
impl DebugType for GfxImageView {
    fn debug_type_name() -> &'static str {
        "GfxImageView"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// destroy
impl GfxImageView {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        if self.handle.is_null() {
            return;
        }
        unsafe { Gfx::get().gfx_device().destroy_image_view(self.handle, None) };
        self.handle = vk::ImageView::null();
    }
}
impl Drop for GfxImageView {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null());
    }
}
