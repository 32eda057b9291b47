use anyhow::Context;
use ash::vk;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// # Destroy
/// drop 时自动销毁
pub struct GfxDescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
}
// new & init
impl GfxDescriptorSetLayout {
    pub fn new(
        bindings: &[vk::DescriptorSetLayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
        debug_name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings).flags(flags);
        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe { gfx_device.create_descriptor_set_layout(&create_info, None) }
            .with_context(|| format!("failed to create descriptor set layout {}", debug_name.as_ref()))?;
        let layout = Self { handle };
        gfx_device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    /// 使用 push descriptor 的 layout，不需要分配 descriptor set
    #[inline]
    pub fn new_push(bindings: &[vk::DescriptorSetLayoutBinding], debug_name: impl AsRef<str>) -> anyhow::Result<Self> {
        Self::new(bindings, vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR, debug_name)
    }
}
// getters
impl GfxDescriptorSetLayout {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}
impl Drop for GfxDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_set_layout(self.handle, None);
        }
    }
}
impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
