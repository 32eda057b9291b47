//! guest output 截图时的格式转换

use crate::guest_output::RawImage;

/// 将 R10G10B10A2（R 位于低位）转换为按字节排列的 R8G8B8X8
///
/// 返回值按照小端序写入内存时，字节顺序为 R, G, B, 0xFF
#[inline]
pub fn packed_10bpc_rgb_to_8bpc_bytes(packed: u32) -> u32 {
    const SCALE: f32 = 255.0 / 1023.0;
    let convert = |shift: u32| ((((packed >> shift) & 1023) as f32) * SCALE + 0.5) as u32;
    convert(0) | (convert(10) << 8) | (convert(20) << 16) | (0xFF << 24)
}

impl RawImage {
    /// 从 GPU 读回的 10bpc 数据创建图像
    ///
    /// # param
    /// * rows - 读回的数据，每一行 `pitch` 字节，行内为小端序的 packed 10bpc 像素
    pub fn from_packed_10bpc_rows(width: u32, height: u32, rows: &[u8], pitch: usize) -> Self {
        let stride = width as usize * 4;
        debug_assert!(pitch >= stride);
        let mut data = Vec::with_capacity(stride * height as usize);
        for row in rows.chunks(pitch).take(height as usize) {
            for pixel in row[..stride].chunks_exact(4) {
                let packed = u32::from_le_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]);
                data.extend_from_slice(&packed_10bpc_rgb_to_8bpc_bytes(packed).to_le_bytes());
            }
        }
        Self {
            width,
            height,
            stride,
            data,
        }
    }

    /// 按照 RGBA8 解释，alpha 总是 0xFF
    #[inline]
    pub fn as_rgba8(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(r: u32, g: u32, b: u32, a: u32) -> u32 {
        r | (g << 10) | (b << 20) | (a << 30)
    }

    #[test]
    fn test_convert_pixel() {
        assert_eq!(packed_10bpc_rgb_to_8bpc_bytes(0), 0xFF00_0000);
        assert_eq!(packed_10bpc_rgb_to_8bpc_bytes(pack(1023, 1023, 1023, 0)), 0xFFFF_FFFF);
        assert_eq!(packed_10bpc_rgb_to_8bpc_bytes(pack(1023, 0, 0, 3)).to_le_bytes(), [255, 0, 0, 255]);
        // 512 * 255 / 1023 = 127.6
        assert_eq!(packed_10bpc_rgb_to_8bpc_bytes(pack(0, 512, 0, 0)).to_le_bytes(), [0, 128, 0, 255]);
        // 2 * 255 / 1023 = 0.498
        assert_eq!(packed_10bpc_rgb_to_8bpc_bytes(pack(0, 0, 2, 0)).to_le_bytes(), [0, 0, 0, 255]);
    }

    #[test]
    fn test_rows_with_padding() {
        let pitch = 16;
        let mut rows = vec![0xEEu8; pitch * 2];
        rows[0..4].copy_from_slice(&pack(1023, 0, 0, 0).to_le_bytes());
        rows[4..8].copy_from_slice(&pack(0, 1023, 0, 0).to_le_bytes());
        rows[pitch..pitch + 4].copy_from_slice(&pack(0, 0, 1023, 0).to_le_bytes());
        rows[pitch + 4..pitch + 8].copy_from_slice(&0u32.to_le_bytes());

        let image = RawImage::from_packed_10bpc_rows(2, 2, &rows, pitch);
        assert_eq!(image.stride, 8);
        assert_eq!(
            image.as_rgba8(),
            &[255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 0, 0, 0, 255]
        );
    }
}
