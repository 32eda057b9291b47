use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU64, Ordering},
};

use anyhow::Context;
use ash::vk;

use xenon_gfx::{
    commands::{
        barrier::{GfxBufferBarrier, GfxImageBarrier},
        submission_tracker::GfxSubmissionTracker,
    },
    gfx::Gfx,
    resources::buffer::GfxReadbackBuffer,
    swapchain::surface::GfxSurface,
};
use xenon_presenter::{
    backend::{PaintFrameContext, PaintResult, PresenterBackend, PresenterSurface, SurfacePaintConnectResult},
    config::PresenterCvars,
    guest_output::{GUEST_OUTPUT_MAILBOX_SIZE, GuestOutputRefresher, RawImage},
    mailbox::ConsumedGuestOutput,
};

use crate::{
    guest_output_image::{
        GUEST_OUTPUT_INTERNAL_ACCESS_MASK, GUEST_OUTPUT_INTERNAL_LAYOUT, GUEST_OUTPUT_INTERNAL_STAGE_MASK,
        GuestOutputImage, VulkanGuestOutputRefreshContext,
    },
    paint_context::{SurfaceConnection, VulkanPaintContext},
    pipelines::GuestOutputPaintPipelines,
    swapchain_config::{create_swapchain_for_surface, desired_swapchain_extent},
};

/// mailbox 一个槽位中的 guest output 图像
#[derive(Default)]
struct GuestOutputImageInstance {
    /// 绘制线程可能仍在读取旧的图像，因此使用 Arc 共享
    image: Option<Arc<GuestOutputImage>>,
    version: u64,
    ever_successfully_refreshed: bool,

    /// 最后一次写入该图像的 refresher 提交
    last_refresher_submission: u64,
}

/// Presenter 的 Vulkan 后端
///
/// 需要在 [`Gfx::init`] 之后创建，在 [`Gfx::destroy`] 之前销毁
pub struct VulkanPresenterBackend {
    pub(crate) cvars: PresenterCvars,

    pub(crate) pipelines: GuestOutputPaintPipelines,
    pub(crate) paint_context: Mutex<VulkanPaintContext>,

    /// 每个槽位单独加锁：生产者只会写入 writable 槽位，消费者只会读取 acquired 槽位
    guest_output_images: [Mutex<GuestOutputImageInstance>; GUEST_OUTPUT_MAILBOX_SIZE],
    next_guest_output_image_version: AtomicU64,
    /// refresher 的提交，用于在重建图像之前等待 refresher 的写入完成
    guest_output_refresher_tracker: Mutex<GfxSubmissionTracker>,
}

// new & init
impl VulkanPresenterBackend {
    pub fn new(cvars: PresenterCvars) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("VulkanPresenterBackend::new");

        let pipelines = GuestOutputPaintPipelines::new().context("failed to create the guest output paint pipelines")?;
        let paint_context = VulkanPaintContext::new().context("failed to create the paint context")?;
        let guest_output_refresher_tracker = match GfxSubmissionTracker::new("presenter-guest-output-refresher") {
            Ok(tracker) => tracker,
            Err(e) => {
                let mut paint_context = paint_context;
                paint_context.destroy();
                return Err(e);
            }
        };

        Ok(Self {
            cvars,
            pipelines,
            paint_context: Mutex::new(paint_context),
            guest_output_images: Default::default(),
            next_guest_output_image_version: AtomicU64::new(1),
            guest_output_refresher_tracker: Mutex::new(guest_output_refresher_tracker),
        })
    }
}

// getters
impl VulkanPresenterBackend {
    #[inline]
    pub(crate) fn lock_paint_context(&self) -> MutexGuard<'_, VulkanPaintContext> {
        self.paint_context.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 绘制线程读取 acquired 槽位的图像
    pub(crate) fn guest_output_image(&self, mailbox_index: usize) -> Option<Arc<GuestOutputImage>> {
        let instance = self.guest_output_images[mailbox_index].lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(instance.image.is_none() || instance.ever_successfully_refreshed);
        instance.image.clone()
    }
}

// surface 连接
impl VulkanPresenterBackend {
    fn connect_impl(
        &self,
        surface: &dyn PresenterSurface,
        surface_width: u32,
        surface_height: u32,
        was_paintable: bool,
    ) -> (SurfacePaintConnectResult, bool) {
        let mut paint_context = self.lock_paint_context();
        let ctx = &mut *paint_context;

        let mut recreation_failed = false;
        if let Some(connection) = ctx.connection.as_mut() {
            // 尺寸没有变化时复用已有的 swapchain
            if was_paintable
                && let Some(swapchain) = &connection.swapchain
                && desired_swapchain_extent(&connection.surface, surface_width, surface_height)
                    .is_some_and(|extent| extent == swapchain.extent())
            {
                return (SurfacePaintConnectResult::SuccessUnchanged, connection.is_vsync);
            }

            ctx.submission_tracker.await_all_submissions_completion();
            let old_swapchain = connection.swapchain.take();
            let new_swapchain = create_swapchain_for_surface(
                &connection.surface,
                surface_width,
                surface_height,
                old_swapchain.as_ref().map_or(vk::SwapchainKHR::null(), |swapchain| swapchain.handle()),
                &self.cvars,
            );
            if let Some(old_swapchain) = old_swapchain {
                old_swapchain.destroy();
            }

            match new_swapchain {
                Some((swapchain, is_vsync)) => {
                    let format = swapchain.format();
                    connection.swapchain = Some(swapchain);
                    connection.is_vsync = is_vsync;
                    Self::invalidate_swapchain_pipelines(ctx, format);
                    return (SurfacePaintConnectResult::Success, is_vsync);
                }
                // surface 本身可能已经失效，重新创建 surface
                None => recreation_failed = true,
            }
        }
        if recreation_failed {
            ctx.connection = None;
        }

        let (display_handle, window_handle) = match (surface.raw_display_handle(), surface.raw_window_handle()) {
            (Ok(display_handle), Ok(window_handle)) => (display_handle, window_handle),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("VulkanPresenter: failed to get the native handles of the surface: {}", e);
                return (SurfacePaintConnectResult::FailureSurfaceUnusable, false);
            }
        };
        let gfx_surface = match GfxSurface::new(display_handle, window_handle, "presenter") {
            Ok(gfx_surface) => gfx_surface,
            Err(e) => {
                log::error!("VulkanPresenter: {:#}", e);
                return (SurfacePaintConnectResult::Failure, false);
            }
        };

        let Some((swapchain, is_vsync)) =
            create_swapchain_for_surface(&gfx_surface, surface_width, surface_height, vk::SwapchainKHR::null(), &self.cvars)
        else {
            return (SurfacePaintConnectResult::Failure, false);
        };
        Self::invalidate_swapchain_pipelines(ctx, swapchain.format());
        ctx.connection = Some(SurfaceConnection {
            swapchain: Some(swapchain),
            surface: gfx_surface,
            is_vsync,
        });
        (SurfacePaintConnectResult::Success, is_vsync)
    }

    /// swapchain 的格式变化时，销毁使用旧格式的 pipeline
    fn invalidate_swapchain_pipelines(ctx: &mut VulkanPaintContext, format: vk::Format) {
        if ctx.swapchain_pipelines.iter().flatten().all(|pipeline| pipeline.format == format) {
            return;
        }
        ctx.submission_tracker.await_submission_completion(ctx.guest_output_paint_last_submission);
        for pipeline in ctx.swapchain_pipelines.iter_mut() {
            if pipeline.as_ref().is_some_and(|pipeline| pipeline.format != format) {
                *pipeline = None;
            }
        }
    }

    fn disconnect_impl(&self) {
        self.lock_paint_context().destroy_connection();
    }
}

// guest output
impl VulkanPresenterBackend {
    fn refresh_impl(
        &self,
        mailbox_index: usize,
        frontbuffer_width: u32,
        frontbuffer_height: u32,
        is_8bpc: &mut bool,
        refresher: GuestOutputRefresher<'_>,
    ) -> bool {
        let _span = tracy_client::span!("VulkanPresenterBackend::refresh_guest_output");

        let max_extent = Gfx::get().max_2d_framebuffer_extent();
        if frontbuffer_width > max_extent.width || frontbuffer_height > max_extent.height {
            log::error!(
                "VulkanPresenter: the guest output size {}x{} exceeds the maximum {}x{}",
                frontbuffer_width,
                frontbuffer_height,
                max_extent.width,
                max_extent.height
            );
            return false;
        }

        let mut instance = self.guest_output_images[mailbox_index].lock().unwrap_or_else(|e| e.into_inner());

        if instance.image.as_ref().is_some_and(|image| image.size() != (frontbuffer_width, frontbuffer_height)) {
            // 绘制线程持有自己的引用，这里只需要等待 refresher 的写入完成
            let tracker = self.guest_output_refresher_tracker.lock().unwrap_or_else(|e| e.into_inner());
            tracker.await_submission_completion(instance.last_refresher_submission);
            instance.image = None;
        }

        if instance.image.is_none() {
            let debug_name = format!("guest-output-{}", mailbox_index);
            match GuestOutputImage::new(frontbuffer_width, frontbuffer_height, &debug_name) {
                Ok(image) => {
                    instance.image = Some(Arc::new(image));
                    instance.version = self.next_guest_output_image_version.fetch_add(1, Ordering::Relaxed);
                    instance.ever_successfully_refreshed = false;
                }
                Err(e) => {
                    log::error!("VulkanPresenter: {:#}", e);
                    return false;
                }
            }
        }
        let Some(image) = instance.image.clone() else {
            return false;
        };

        let mut context = VulkanGuestOutputRefreshContext::new(&image, instance.version, instance.ever_successfully_refreshed);
        let succeeded = refresher(&mut context);
        *is_8bpc = context.is_8bpc();
        if succeeded {
            instance.ever_successfully_refreshed = true;
        }

        // refresher 的命令已经提交到同一个 queue，这里的空提交用于追踪它们的完成
        let mut tracker = self.guest_output_refresher_tracker.lock().unwrap_or_else(|e| e.into_inner());
        instance.last_refresher_submission = tracker.current_submission();
        if let Err(e) = tracker.submit(Gfx::get().gfx_queue(), None) {
            log::error!("VulkanPresenter: failed to submit the guest output refresher completion signal: {:?}", e);
        }

        succeeded
    }

    fn capture_impl(&self, consumed: &ConsumedGuestOutput<'_>) -> Option<RawImage> {
        let _span = tracy_client::span!("VulkanPresenterBackend::capture_guest_output");

        let image = self.guest_output_image(consumed.mailbox_index()?)?;
        let (width, height) = image.size();
        let pitch = width as usize * 4;
        let size = (pitch * height as usize) as vk::DeviceSize;

        let buffer = GfxReadbackBuffer::new(size, "guest-output-capture")
            .inspect_err(|e| log::error!("VulkanPresenter: {:#}", e))
            .ok()?;

        Gfx::get()
            .one_time_exec(
                |cmd| {
                    let to_transfer = GfxImageBarrier::color(image.image())
                        .layout_transfer(GUEST_OUTPUT_INTERNAL_LAYOUT, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                        .src_mask(GUEST_OUTPUT_INTERNAL_STAGE_MASK, vk::AccessFlags2::NONE)
                        .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ);
                    cmd.image_barriers(&[to_transfer]);

                    let region = vk::BufferImageCopy::default()
                        .buffer_row_length(width)
                        .buffer_image_height(height)
                        .image_subresource(vk::ImageSubresourceLayers {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: 1,
                        })
                        .image_extent(vk::Extent3D {
                            width,
                            height,
                            depth: 1,
                        });
                    cmd.cmd_copy_image_to_buffer(
                        image.image(),
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        buffer.vk_buffer(),
                        &[region],
                    );

                    let to_internal = GfxImageBarrier::color(image.image())
                        .layout_transfer(vk::ImageLayout::TRANSFER_SRC_OPTIMAL, GUEST_OUTPUT_INTERNAL_LAYOUT)
                        .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::NONE)
                        .dst_mask(GUEST_OUTPUT_INTERNAL_STAGE_MASK, GUEST_OUTPUT_INTERNAL_ACCESS_MASK);
                    cmd.image_barriers(&[to_internal]);

                    let to_host = GfxBufferBarrier::whole(buffer.vk_buffer())
                        .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                        .dst_mask(vk::PipelineStageFlags2::HOST, vk::AccessFlags2::HOST_READ);
                    cmd.buffer_barriers(&[to_host]);
                },
                "guest-output-capture",
            )
            .inspect_err(|e| log::error!("VulkanPresenter: {:#}", e))
            .ok()?;

        buffer
            .read_mapped(|data| RawImage::from_packed_10bpc_rows(width, height, data, pitch))
            .inspect_err(|e| log::error!("VulkanPresenter: failed to read the captured guest output: {:?}", e))
            .ok()
    }
}

impl PresenterBackend for VulkanPresenterBackend {
    fn connect_or_reconnect_paint_connection(
        &self,
        surface: &dyn PresenterSurface,
        surface_width: u32,
        surface_height: u32,
        was_paintable: bool,
    ) -> (SurfacePaintConnectResult, bool) {
        self.connect_impl(surface, surface_width, surface_height, was_paintable)
    }

    fn disconnect_paint_connection(&self) {
        self.disconnect_impl();
    }

    fn paint_and_present_impl(&self, frame: &PaintFrameContext<'_>) -> PaintResult {
        self.paint_and_present(frame)
    }

    fn refresh_guest_output_impl(
        &self,
        mailbox_index: usize,
        frontbuffer_width: u32,
        frontbuffer_height: u32,
        is_8bpc: &mut bool,
        refresher: GuestOutputRefresher<'_>,
    ) -> bool {
        self.refresh_impl(mailbox_index, frontbuffer_width, frontbuffer_height, is_8bpc, refresher)
    }

    fn capture_guest_output(&self, consumed: &ConsumedGuestOutput<'_>) -> Option<RawImage> {
        self.capture_impl(consumed)
    }
}

// destroy
impl Drop for VulkanPresenterBackend {
    fn drop(&mut self) {
        self.paint_context.get_mut().unwrap_or_else(|e| e.into_inner()).destroy();

        self.guest_output_refresher_tracker.get_mut().unwrap_or_else(|e| e.into_inner()).destroy_mut();
        for instance in self.guest_output_images.iter_mut() {
            instance.get_mut().unwrap_or_else(|e| e.into_inner()).image = None;
        }
    }
}
