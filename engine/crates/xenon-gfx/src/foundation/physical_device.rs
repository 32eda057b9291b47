use std::ffi::CStr;

use anyhow::Context;
use ash::vk;

use crate::{commands::command_queue::GfxQueueFamily, foundation::debug_messenger::DebugType};

/// guest output 的刷新、绘制以及 present 都在同一个 queue 上进行
const GFX_QUEUE_FLAGS: vk::QueueFlags = vk::QueueFlags::from_raw(
    vk::QueueFlags::GRAPHICS.as_raw() | vk::QueueFlags::COMPUTE.as_raw() | vk::QueueFlags::TRANSFER.as_raw(),
);

/// 第一个同时支持 graphics、compute、transfer 的 queue family
pub fn find_gfx_queue_family(props: &[vk::QueueFamilyProperties]) -> Option<usize> {
    props.iter().position(|p| p.queue_count > 0 && p.queue_flags.contains(GFX_QUEUE_FLAGS))
}

/// 2D framebuffer 能够使用的最大尺寸，同时受 image 尺寸以及 framebuffer 尺寸的限制
pub fn max_2d_framebuffer_extent(limits: &vk::PhysicalDeviceLimits) -> vk::Extent2D {
    vk::Extent2D {
        width: limits.max_image_dimension2_d.min(limits.max_framebuffer_width),
        height: limits.max_image_dimension2_d.min(limits.max_framebuffer_height),
    }
}

pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,
    pub(crate) props: vk::PhysicalDeviceProperties,
    pub(crate) gfx_queue_family: GfxQueueFamily,
}

// new & init
impl GfxPhysicalDevice {
    /// 在可用的 gpu 中优先选择独立显卡
    pub fn pick(instance: &ash::Instance) -> anyhow::Result<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }.context("failed to enumerate gpus")?;
        let mut candidates: Vec<Self> =
            pdevices.into_iter().filter_map(|pdevice| Self::new(instance, pdevice)).collect();
        anyhow::ensure!(!candidates.is_empty(), "no gpu with a graphics + compute + transfer queue family");
        let index = candidates.iter().position(Self::is_discrete).unwrap_or(0);

        let picked = candidates.swap_remove(index);
        log::info!("picked gpu: {:?}", picked.name());
        Ok(picked)
    }

    fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice) -> Option<Self> {
        let props = unsafe { instance.get_physical_device_properties(pdevice) };
        let family_props = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        log::debug!("gpu {:?} queue families:\n{:#?}", props.device_name_as_c_str().unwrap_or_default(), family_props);

        let family_index = find_gfx_queue_family(&family_props)?;
        let family = &family_props[family_index];
        Some(Self {
            vk_handle: pdevice,
            props,
            gfx_queue_family: GfxQueueFamily {
                name: "gfx".to_string(),
                queue_family_index: family_index as u32,
                queue_flags: family.queue_flags,
                queue_count: family.queue_count,
            },
        })
    }
}

// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    #[inline]
    pub fn name(&self) -> &CStr {
        self.props.device_name_as_c_str().unwrap_or_default()
    }

    #[inline]
    pub fn is_discrete(&self) -> bool {
        self.props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    #[inline]
    pub fn max_2d_framebuffer_extent(&self) -> vk::Extent2D {
        max_2d_framebuffer_extent(&self.props.limits)
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_gfx_queue_family() {
        let props = [
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 4),
            family(GFX_QUEUE_FLAGS | vk::QueueFlags::SPARSE_BINDING, 1),
        ];
        assert_eq!(find_gfx_queue_family(&props), Some(2));
        assert_eq!(find_gfx_queue_family(&props[..2]), None);
        assert_eq!(find_gfx_queue_family(&[family(GFX_QUEUE_FLAGS, 0)]), None);
    }

    #[test]
    fn test_max_2d_framebuffer_extent() {
        let limits = vk::PhysicalDeviceLimits {
            max_image_dimension2_d: 16384,
            max_framebuffer_width: 8192,
            max_framebuffer_height: 16384,
            ..Default::default()
        };
        assert_eq!(max_2d_framebuffer_extent(&limits), vk::Extent2D { width: 8192, height: 16384 });
    }
}
