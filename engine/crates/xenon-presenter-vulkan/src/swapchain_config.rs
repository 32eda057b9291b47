//! swapchain 参数的选择

use ash::vk;

use xenon_gfx::{
    gfx::Gfx,
    swapchain::{
        surface::GfxSurface,
        swapchain::{GfxSwapchain, GfxSwapchainDesc},
    },
};
use xenon_presenter::config::PresenterCvars;

/// swapchain 中 image 的期望数量，与 paint submission 的数量一致
pub const SWAPCHAIN_MIN_IMAGE_COUNT: u32 = 3;

/// 根据 surface 的尺寸计算 swapchain 的 extent
///
/// 宽高先被限制在 framebuffer 的最大尺寸之内，再被限制在 surface 支持的范围之内
///
/// # return
/// None 表示当前无法创建 swapchain（例如窗口被最小化）
pub fn select_swapchain_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    surface_width: u32,
    surface_height: u32,
    max_extent: vk::Extent2D,
) -> Option<vk::Extent2D> {
    let width = surface_width
        .min(max_extent.width)
        .clamp(caps.min_image_extent.width, caps.max_image_extent.width.max(caps.min_image_extent.width));
    let height = surface_height
        .min(max_extent.height)
        .clamp(caps.min_image_extent.height, caps.max_image_extent.height.max(caps.min_image_extent.height));
    if width == 0 || height == 0 || width > max_extent.width || height > max_extent.height {
        return None;
    }
    Some(vk::Extent2D { width, height })
}

/// 选择 surface 的格式
///
/// 优先 sRGB 的 B8G8R8A8，其次 sRGB 的 R8G8B8A8，然后是未知 color space 的 8888 格式，
/// 再然后是任意 sRGB 格式，最后使用第一个格式
pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    const PRIMARY: vk::Format = vk::Format::B8G8R8A8_UNORM;
    const SECONDARY: vk::Format = vk::Format::R8G8B8A8_UNORM;
    let is_srgb = |format: &vk::SurfaceFormatKHR| format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR;

    // 没有限制
    if formats.is_empty() || (formats.len() == 1 && formats[0].format == vk::Format::UNDEFINED) {
        return vk::SurfaceFormatKHR {
            format: PRIMARY,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
    }

    // 同一格式出现多次时，使用第一个 sRGB 的，没有 sRGB 时使用第一个
    let best_of = |target: vk::Format| {
        let mut candidates = formats.iter().filter(|format| format.format == target);
        let first = candidates.clone().next();
        candidates.find(|format| is_srgb(format)).or(first)
    };

    match (best_of(PRIMARY), best_of(SECONDARY)) {
        (Some(primary), Some(secondary)) => {
            if is_srgb(primary) || !is_srgb(secondary) {
                *primary
            } else {
                *secondary
            }
        }
        (Some(primary), None) => *primary,
        (None, Some(secondary)) => *secondary,
        (None, None) => formats.iter().find(|format| is_srgb(format)).copied().unwrap_or(formats[0]),
    }
}

/// 选择 present mode
///
/// 优先级：IMMEDIATE > MAILBOX > FIFO_RELAXED > FIFO，前三者可以通过 cvar 禁用
///
/// # return
/// (present mode, 是否隐式开启了垂直同步)
pub fn select_present_mode(modes: &[vk::PresentModeKHR], cvars: &PresenterCvars) -> (vk::PresentModeKHR, bool) {
    let candidates = [
        (vk::PresentModeKHR::IMMEDIATE, cvars.vulkan_allow_present_mode_immediate),
        (vk::PresentModeKHR::MAILBOX, cvars.vulkan_allow_present_mode_mailbox),
        (vk::PresentModeKHR::FIFO_RELAXED, cvars.vulkan_allow_present_mode_fifo_relaxed),
    ];
    // FIFO 总是被支持
    let mode = candidates
        .iter()
        .find(|(mode, allowed)| *allowed && modes.contains(mode))
        .map_or(vk::PresentModeKHR::FIFO, |(mode, _)| *mode);
    let is_vsync = matches!(mode, vk::PresentModeKHR::FIFO | vk::PresentModeKHR::FIFO_RELAXED);
    (mode, is_vsync)
}

/// 优先不透明，其次继承窗口系统的设置，否则使用支持的最低位
pub fn select_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> Option<vk::CompositeAlphaFlagsKHR> {
    if supported.contains(vk::CompositeAlphaFlagsKHR::OPAQUE) {
        return Some(vk::CompositeAlphaFlagsKHR::OPAQUE);
    }
    if supported.contains(vk::CompositeAlphaFlagsKHR::INHERIT) {
        return Some(vk::CompositeAlphaFlagsKHR::INHERIT);
    }
    let raw = supported.as_raw();
    (raw != 0).then(|| vk::CompositeAlphaFlagsKHR::from_raw(raw & raw.wrapping_neg()))
}

/// 只支持不需要旋转的 transform
pub fn select_pre_transform(caps: &vk::SurfaceCapabilitiesKHR) -> Option<vk::SurfaceTransformFlagsKHR> {
    if caps.supported_transforms.contains(vk::SurfaceTransformFlagsKHR::IDENTITY) {
        Some(vk::SurfaceTransformFlagsKHR::IDENTITY)
    } else if caps.supported_transforms.contains(vk::SurfaceTransformFlagsKHR::INHERIT) {
        Some(vk::SurfaceTransformFlagsKHR::INHERIT)
    } else {
        None
    }
}

/// 当前的 surface 尺寸下 swapchain 的 extent，用于判断已有的 swapchain 是否可以复用
pub fn desired_swapchain_extent(surface: &GfxSurface, surface_width: u32, surface_height: u32) -> Option<vk::Extent2D> {
    let caps = surface.capabilities().ok()?;
    select_swapchain_extent(&caps, surface_width, surface_height, Gfx::get().max_2d_framebuffer_extent())
}

/// 为 surface 创建 swapchain
///
/// # param
/// * old_swapchain - 重建时的旧 swapchain，调用者仍需要将其销毁
///
/// # return
/// (swapchain, 是否隐式开启了垂直同步)，失败时返回 None
pub fn create_swapchain_for_surface(
    surface: &GfxSurface,
    surface_width: u32,
    surface_height: u32,
    old_swapchain: vk::SwapchainKHR,
    cvars: &PresenterCvars,
) -> Option<(GfxSwapchain, bool)> {
    let caps = surface
        .capabilities()
        .inspect_err(|e| log::error!("VulkanPresenter: failed to get the surface capabilities: {:?}", e))
        .ok()?;

    let extent = select_swapchain_extent(
        &caps,
        surface_width,
        surface_height,
        Gfx::get().max_2d_framebuffer_extent(),
    )?;

    // 只在 graphics queue 上 present
    let queue_family_index = Gfx::get().gfx_queue_family().queue_family_index;
    match surface.supports_queue_family(queue_family_index) {
        Ok(true) => (),
        Ok(false) => {
            log::error!(
                "VulkanPresenter: the surface can't be presented from the graphics queue family {}",
                queue_family_index
            );
            return None;
        }
        Err(e) => {
            log::error!("VulkanPresenter: failed to query the surface presentation support: {:?}", e);
            return None;
        }
    }

    let Some(pre_transform) = select_pre_transform(&caps) else {
        log::error!(
            "VulkanPresenter: the surface supports neither the identity nor the inherited transform ({:?})",
            caps.supported_transforms
        );
        return None;
    };

    let Some(composite_alpha) = select_composite_alpha(caps.supported_composite_alpha) else {
        log::error!("VulkanPresenter: the surface doesn't support any composite alpha mode");
        return None;
    };

    let formats = surface
        .formats()
        .inspect_err(|e| log::error!("VulkanPresenter: failed to get the surface formats: {:?}", e))
        .ok()?;
    let surface_format = select_surface_format(&formats);

    let present_modes = surface
        .present_modes()
        .inspect_err(|e| log::error!("VulkanPresenter: failed to get the surface present modes: {:?}", e))
        .ok()?;
    let (present_mode, is_vsync) = select_present_mode(&present_modes, cvars);

    let desc = GfxSwapchainDesc {
        surface_format,
        present_mode,
        extent,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        composite_alpha,
        pre_transform,
        min_image_count: SWAPCHAIN_MIN_IMAGE_COUNT,
    };
    let swapchain = GfxSwapchain::new(surface, &desc, old_swapchain, "presenter")
        .inspect_err(|e| log::error!("VulkanPresenter: failed to create the swapchain: {:?}", e))
        .ok()?;

    log::info!(
        "VulkanPresenter: created a {}x{} swapchain, format {:?}, color space {:?}, present mode {:?}",
        extent.width,
        extent.height,
        surface_format.format,
        surface_format.color_space,
        present_mode
    );
    Some((swapchain, is_vsync))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_extent: vk::Extent2D { width: min, height: min },
            max_image_extent: vk::Extent2D { width: max, height: max },
            ..Default::default()
        }
    }

    const MAX_EXTENT: vk::Extent2D = vk::Extent2D {
        width: 8192,
        height: 8192,
    };

    #[test]
    fn test_surface_format_preference() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(select_surface_format(&formats), formats[2]);

        // B8G8R8A8 不是 sRGB 时，使用 sRGB 的 R8G8B8A8
        assert_eq!(select_surface_format(&formats[..2]), formats[0]);

        // 都不是 sRGB 时使用 B8G8R8A8
        let unknown = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(select_surface_format(&unknown), unknown[1]);

        let others = [
            surface_format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            surface_format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(select_surface_format(&others), others[1]);
        assert_eq!(select_surface_format(&others[..1]), others[0]);
    }

    #[test]
    fn test_surface_format_unrestricted() {
        let expected = surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(select_surface_format(&[]), expected);
        assert_eq!(
            select_surface_format(&[surface_format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)]),
            expected
        );
    }

    #[test]
    fn test_present_mode() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::FIFO_RELAXED,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        let mut cvars = PresenterCvars::default();
        assert_eq!(select_present_mode(&all, &cvars), (vk::PresentModeKHR::IMMEDIATE, false));

        cvars.vulkan_allow_present_mode_immediate = false;
        assert_eq!(select_present_mode(&all, &cvars), (vk::PresentModeKHR::MAILBOX, false));

        cvars.vulkan_allow_present_mode_mailbox = false;
        assert_eq!(select_present_mode(&all, &cvars), (vk::PresentModeKHR::FIFO_RELAXED, true));

        cvars.vulkan_allow_present_mode_fifo_relaxed = false;
        assert_eq!(select_present_mode(&all, &cvars), (vk::PresentModeKHR::FIFO, true));

        let defaults = PresenterCvars::default();
        assert_eq!(select_present_mode(&[vk::PresentModeKHR::FIFO], &defaults), (vk::PresentModeKHR::FIFO, true));
    }

    #[test]
    fn test_composite_alpha() {
        use vk::CompositeAlphaFlagsKHR as Alpha;
        assert_eq!(select_composite_alpha(Alpha::OPAQUE | Alpha::INHERIT), Some(Alpha::OPAQUE));
        assert_eq!(select_composite_alpha(Alpha::INHERIT | Alpha::PRE_MULTIPLIED), Some(Alpha::INHERIT));
        assert_eq!(
            select_composite_alpha(Alpha::POST_MULTIPLIED | Alpha::PRE_MULTIPLIED),
            Some(Alpha::PRE_MULTIPLIED)
        );
        assert_eq!(select_composite_alpha(Alpha::empty()), None);
    }

    #[test]
    fn test_pre_transform() {
        let mut caps = caps(1, 4096);
        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::IDENTITY | vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(select_pre_transform(&caps), Some(vk::SurfaceTransformFlagsKHR::IDENTITY));
        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::INHERIT;
        assert_eq!(select_pre_transform(&caps), Some(vk::SurfaceTransformFlagsKHR::INHERIT));
        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_180;
        assert_eq!(select_pre_transform(&caps), None);
    }

    #[test]
    fn test_swapchain_extent() {
        let caps = caps(1, 4096);
        assert_eq!(
            select_swapchain_extent(&caps, 1280, 720, MAX_EXTENT),
            Some(vk::Extent2D {
                width: 1280,
                height: 720
            })
        );
        // 被 surface 支持的最大尺寸限制
        assert_eq!(
            select_swapchain_extent(&caps, 10000, 720, MAX_EXTENT),
            Some(vk::Extent2D {
                width: 4096,
                height: 720
            })
        );
        // 最小化的窗口
        assert_eq!(select_swapchain_extent(&self::caps(0, 0), 0, 0, MAX_EXTENT), None);
    }
}
