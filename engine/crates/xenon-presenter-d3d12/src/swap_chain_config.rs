/// D3D12_REQ_TEXTURE2D_U_OR_V_DIMENSION
pub const MAX_TEXTURE2D_DIMENSION: u32 = 16384;

/// swap chain 的尺寸，超过纹理的最大尺寸时截断
#[inline]
pub fn swap_chain_size(surface_width: u32, surface_height: u32) -> (u32, u32) {
    (surface_width.min(MAX_TEXTURE2D_DIMENSION), surface_height.min(MAX_TEXTURE2D_DIMENSION))
}

/// swap chain 无法覆盖整个 surface 时才需要拉伸
///
/// 拉伸会导致调整窗口大小时画面抖动
#[inline]
pub fn swap_chain_needs_stretch(surface_size: (u32, u32), swap_chain_size: (u32, u32)) -> bool {
    surface_size != swap_chain_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_chain_size() {
        assert_eq!(swap_chain_size(1920, 1080), (1920, 1080));
        assert_eq!(swap_chain_size(20000, 1080), (16384, 1080));
        assert!(!swap_chain_needs_stretch((1920, 1080), swap_chain_size(1920, 1080)));
        assert!(swap_chain_needs_stretch((20000, 1080), swap_chain_size(20000, 1080)));
    }
}
