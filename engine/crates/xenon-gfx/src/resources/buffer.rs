use anyhow::Context;
use ash::{prelude::VkResult, vk};

use vk_mem::Alloc;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 常驻映射的回读 buffer，用于将 GPU 上的图像复制回 CPU
///
/// # Destroy
/// drop 时自动销毁
pub struct GfxReadbackBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,
    map_ptr: *mut u8,
}
impl DebugType for GfxReadbackBuffer {
    fn debug_type_name() -> &'static str {
        "GfxReadbackBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// new & init
impl GfxReadbackBuffer {
    pub fn new(size: vk::DeviceSize, name: impl AsRef<str>) -> anyhow::Result<Self> {
        let buffer_ci = vk::BufferCreateInfo::default().size(size).usage(vk::BufferUsageFlags::TRANSFER_DST);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferHost,
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
            ..Default::default()
        };

        let allocator = Gfx::get().allocator();
        let (buffer, mut alloc) = unsafe { allocator.create_buffer(&buffer_ci, &alloc_ci) }
            .with_context(|| format!("failed to create the readback buffer {}", name.as_ref()))?;

        let map_ptr = match unsafe { allocator.map_memory(&mut alloc) } {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { allocator.destroy_buffer(buffer, &mut alloc) };
                return Err(e).with_context(|| format!("failed to map the readback buffer {}", name.as_ref()));
            }
        };

        let buffer = Self {
            handle: buffer,
            allocation: alloc,
            size,
            map_ptr,
        };
        Gfx::get().gfx_device().set_debug_name(&buffer, name.as_ref());
        Ok(buffer)
    }
}
// getters
impl GfxReadbackBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }
}
// tools
impl GfxReadbackBuffer {
    /// 使 GPU 写入的数据对 CPU 可见，然后以 slice 的形式读取
    ///
    /// 调用前 GPU 的写入需要已经完成，并通过 HOST 的 barrier 可见
    pub fn read_mapped<R>(&self, f: impl FnOnce(&[u8]) -> R) -> VkResult<R> {
        Gfx::get().allocator().invalidate_allocation(&self.allocation, 0, self.size)?;
        let data = unsafe { std::slice::from_raw_parts(self.map_ptr as *const u8, self.size as usize) };
        Ok(f(data))
    }
}
// destroy
impl Drop for GfxReadbackBuffer {
    fn drop(&mut self) {
        let allocator = Gfx::get().allocator();
        unsafe {
            allocator.unmap_memory(&mut self.allocation);
            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
