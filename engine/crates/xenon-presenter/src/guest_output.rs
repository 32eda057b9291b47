use std::any::Any;

/// mailbox 中 guest output 的槽位数量，三缓冲
pub const GUEST_OUTPUT_MAILBOX_SIZE: usize = 3;

/// 一帧 guest output 的描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuestOutputProperties {
    pub frontbuffer_width: u32,
    pub frontbuffer_height: u32,
    pub display_aspect_ratio_x: u32,
    pub display_aspect_ratio_y: u32,
    /// 图像的内容是否只有 8bpc 的精度，此时 1:1 复制不需要 dither
    pub is_8bpc: bool,
}

impl GuestOutputProperties {
    /// 尺寸以及宽高比都不为 0 时，才有内容可以显示
    #[inline]
    pub fn is_active(&self) -> bool {
        self.frontbuffer_width != 0
            && self.frontbuffer_height != 0
            && self.display_aspect_ratio_x != 0
            && self.display_aspect_ratio_y != 0
    }

    #[inline]
    pub fn set_inactive(&mut self) {
        *self = Self::default();
    }
}

/// CPU 端的 R8G8B8X8 图像，用于截图
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// 每一行的字节数，等于 `4 * width`
    pub stride: usize,
    pub data: Vec<u8>,
}

/// guest output 刷新时，refresher 通过该接口写入 guest output 图像
///
/// 各个后端提供自己的实现，refresher 通过 `as_any_mut` 转换到具体类型，
/// 以获取可以写入的 GPU 图像
pub trait GuestOutputRefreshContext: Any {
    /// refresher 报告写入的内容是否只有 8bpc 的精度，默认为 false
    fn set_is_8bpc(&mut self, is_8bpc: bool);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// 由 guest output 线程提供，向 guest output 图像中写入一帧
///
/// 返回 false 表示写入失败，这一帧不会被显示
pub type GuestOutputRefresher<'a> = Box<dyn FnOnce(&mut dyn GuestOutputRefreshContext) -> bool + 'a>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_active() {
        let mut props = GuestOutputProperties {
            frontbuffer_width: 1280,
            frontbuffer_height: 720,
            display_aspect_ratio_x: 16,
            display_aspect_ratio_y: 9,
            is_8bpc: true,
        };
        assert!(props.is_active());

        props.display_aspect_ratio_y = 0;
        assert!(!props.is_active());

        props.set_inactive();
        assert_eq!(props, GuestOutputProperties::default());
        assert!(!props.is_8bpc);
    }
}
