use anyhow::Context;
use ash::vk;

use crate::gfx::Gfx;

/// presenter 的 shader 只需要一个线性过滤、边缘 clamp 的 sampler
///
/// 图像没有 mipmap，lod 固定为 0
///
/// # Destroy
/// drop 时自动销毁
pub struct GfxSampler {
    handle: vk::Sampler,
}
// new & init
impl GfxSampler {
    pub fn new_linear_clamp(name: impl AsRef<str>) -> anyhow::Result<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .min_lod(0.0)
            .max_lod(0.0)
            .anisotropy_enable(false)
            .compare_enable(false);

        let sampler = unsafe { Gfx::get().gfx_device().create_sampler(&create_info, None) }
            .with_context(|| format!("failed to create sampler {}", name.as_ref()))?;
        Gfx::get().gfx_device().set_object_debug_name(sampler, name.as_ref());

        Ok(Self { handle: sampler })
    }
}
// getters
impl GfxSampler {
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}
impl Drop for GfxSampler {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_sampler(self.handle, None);
        }
    }
}
