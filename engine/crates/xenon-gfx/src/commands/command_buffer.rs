use anyhow::Context;
use ash::{prelude::VkResult, vk};

use crate::{
    basic::color::LabelColor,
    commands::{
        barrier::{GfxBufferBarrier, GfxImageBarrier},
        command_pool::GfxCommandPool,
    },
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
};

/// primary command buffer，释放由所属的 pool 负责
///
/// ```ignore
/// let cmd = GfxCommandBuffer::new(&pool, "present")?;
/// cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "present")?;
/// cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);
/// cmd.cmd_draw_rect();
/// cmd.end()?;
/// ```
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
}

// new & init
impl GfxCommandBuffer {
    pub fn new(command_pool: &GfxCommandPool, debug_name: &str) -> anyhow::Result<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let gfx_device = Gfx::get().gfx_device();
        let handles = unsafe { gfx_device.allocate_command_buffers(&alloc_info) }
            .with_context(|| format!("failed to allocate command buffer {}", debug_name))?;
        let cmd = Self { vk_handle: handles[0] };
        gfx_device.set_debug_name(&cmd, debug_name);
        Ok(cmd)
    }
}

// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}

// begin & end
impl GfxCommandBuffer {
    /// 整个录制过程包裹在一个名为 `label` 的 debug label 中
    pub fn begin(&self, usage: vk::CommandBufferUsageFlags, label: &str) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage);
        unsafe { Gfx::get().gfx_device().begin_command_buffer(self.vk_handle, &begin_info)? };
        self.begin_label(label, LabelColor::COLOR_CMD);
        Ok(())
    }

    pub fn end(&self) -> VkResult<()> {
        self.end_label();
        unsafe { Gfx::get().gfx_device().end_command_buffer(self.vk_handle) }
    }
}

// transfer
impl GfxCommandBuffer {
    #[inline]
    pub fn cmd_copy_image_to_buffer(
        &self,
        src_image: vk::Image,
        src_layout: vk::ImageLayout,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            Gfx::get().gfx_device().cmd_copy_image_to_buffer(self.vk_handle, src_image, src_layout, dst_buffer, regions)
        };
    }

    /// 需要在 rendering 之外，image 处于 TRANSFER_DST_OPTIMAL 或者 GENERAL
    #[inline]
    pub fn cmd_clear_color_image(
        &self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        unsafe { Gfx::get().gfx_device().cmd_clear_color_image(self.vk_handle, image, layout, color, ranges) };
    }
}

// pipeline state
impl GfxCommandBuffer {
    #[inline]
    pub fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { Gfx::get().gfx_device().cmd_bind_pipeline(self.vk_handle, bind_point, pipeline) };
    }

    #[inline]
    pub fn cmd_push_constants(&self, layout: vk::PipelineLayout, stage: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        unsafe { Gfx::get().gfx_device().cmd_push_constants(self.vk_handle, layout, stage, offset, data) };
    }

    /// layout 的对应 set 需要以 PUSH_DESCRIPTOR 创建
    #[inline]
    pub fn cmd_push_descriptor_set(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: u32,
        writes: &[vk::WriteDescriptorSet],
    ) {
        let push_descriptor = &Gfx::get().gfx_device().push_descriptor;
        unsafe { push_descriptor.cmd_push_descriptor_set(self.vk_handle, bind_point, layout, set, writes) };
    }

    /// viewport 以及 scissor 都覆盖整个 render target
    pub fn cmd_set_full_viewport(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport::default()
            .width(extent.width as f32)
            .height(extent.height as f32)
            .max_depth(1.0);
        let scissor = vk::Rect2D::default().extent(extent);
        let device = Gfx::get().gfx_device();
        unsafe {
            device.cmd_set_viewport(self.vk_handle, 0, &[viewport]);
            device.cmd_set_scissor(self.vk_handle, 0, &[scissor]);
        }
    }
}

// rendering
impl GfxCommandBuffer {
    #[inline]
    pub fn cmd_begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        let dynamic_rendering = &Gfx::get().gfx_device().dynamic_rendering;
        unsafe { dynamic_rendering.cmd_begin_rendering(self.vk_handle, rendering_info) };
    }

    #[inline]
    pub fn cmd_end_rendering(&self) {
        unsafe { Gfx::get().gfx_device().dynamic_rendering.cmd_end_rendering(self.vk_handle) };
    }

    /// 4 个顶点的 triangle strip，顶点由 vertex shader 根据 `SV_VertexID` 生成
    #[inline]
    pub fn cmd_draw_rect(&self) {
        unsafe { Gfx::get().gfx_device().cmd_draw(self.vk_handle, 4, 1, 0, 0) };
    }

    /// 只能在 rendering 内部使用
    #[inline]
    pub fn cmd_clear_attachments(&self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]) {
        unsafe { Gfx::get().gfx_device().cmd_clear_attachments(self.vk_handle, attachments, rects) };
    }
}

// synchronization2
impl GfxCommandBuffer {
    pub fn image_barriers(&self, barriers: &[GfxImageBarrier]) {
        let barriers: Vec<_> = barriers.iter().map(|b| *b.inner()).collect();
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { Gfx::get().gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info) };
    }

    pub fn buffer_barriers(&self, barriers: &[GfxBufferBarrier]) {
        let barriers: Vec<_> = barriers.iter().map(|b| *b.inner()).collect();
        let dependency_info = vk::DependencyInfo::default().buffer_memory_barriers(&barriers);
        unsafe { Gfx::get().gfx_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info) };
    }
}

// debug label
impl GfxCommandBuffer {
    pub fn begin_label(&self, name: &str, color: glam::Vec4) {
        // 和 end_label 成对出现，名称不合法时也需要 begin
        let name = std::ffi::CString::new(name.replace('\0', " ")).unwrap_or_default();
        let label = vk::DebugUtilsLabelEXT::default().label_name(&name).color(color.to_array());
        unsafe { Gfx::get().gfx_device().debug_utils.cmd_begin_debug_utils_label(self.vk_handle, &label) };
    }

    pub fn end_label(&self) {
        unsafe { Gfx::get().gfx_device().debug_utils.cmd_end_debug_utils_label(self.vk_handle) };
    }
}

impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
