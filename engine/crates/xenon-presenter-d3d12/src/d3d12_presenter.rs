use std::{
    ffi::c_void,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::Context;
use raw_window_handle::RawWindowHandle;
use windows::{
    Win32::{
        Foundation::HWND,
        Graphics::{
            Direct3D12::*,
            Dxgi::{
                Common::{DXGI_ALPHA_MODE_IGNORE, DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC},
                DXGI_MWA_NO_ALT_ENTER, DXGI_SCALING_NONE, DXGI_SCALING_STRETCH, DXGI_SWAP_CHAIN_DESC1,
                DXGI_SWAP_CHAIN_FLAG, DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING, DXGI_SWAP_EFFECT_FLIP_DISCARD,
                DXGI_USAGE_RENDER_TARGET_OUTPUT, IDXGISwapChain1, IDXGISwapChain3,
            },
        },
    },
    core::Interface,
};

use xenon_presenter::{
    backend::{PaintFrameContext, PaintResult, PresenterBackend, PresenterSurface, SurfacePaintConnectResult},
    config::PresenterCvars,
    guest_output::{GUEST_OUTPUT_MAILBOX_SIZE, GuestOutputRefresher, RawImage},
    mailbox::ConsumedGuestOutput,
};

use crate::{
    descriptor_layout::SWAP_CHAIN_BUFFER_COUNT,
    guest_output_resource::{D3D12GuestOutputRefreshContext, GUEST_OUTPUT_INTERNAL_STATE, create_guest_output_texture},
    paint_context::{D3D12PaintContext, SwapChainConnection},
    pipelines::{GuestOutputPaintPipelines, SWAP_CHAIN_FORMAT},
    provider::D3D12Provider,
    submission_tracker::D3D12SubmissionTracker,
    swap_chain_config::{MAX_TEXTURE2D_DIMENSION, swap_chain_needs_stretch, swap_chain_size},
    util,
};

/// mailbox 一个槽位中的 guest output 纹理
#[derive(Default)]
struct GuestOutputResourceInstance {
    /// 绘制线程通过 paint ref 持有自己的引用
    resource: Option<ID3D12Resource>,

    /// 最后一次写入该纹理的 refresher 提交
    last_refresher_submission: u64,
}

/// Presenter 的 Direct3D 12 后端
///
/// refresher 需要通过 [`D3D12PresenterBackend::provider`] 获取 device 以及 direct queue，
/// 并且将写入 guest output 纹理的命令提交到该 queue 上
pub struct D3D12PresenterBackend {
    provider: Arc<D3D12Provider>,
    cvars: PresenterCvars,

    pub(crate) pipelines: GuestOutputPaintPipelines,
    paint_context: Mutex<D3D12PaintContext>,

    /// 每个槽位单独加锁：生产者只会写入 writable 槽位，消费者只会读取 acquired 槽位
    guest_output_resources: [Mutex<GuestOutputResourceInstance>; GUEST_OUTPUT_MAILBOX_SIZE],
    /// refresher 的提交，用于在重建纹理之前等待 refresher 的写入完成
    guest_output_refresher_tracker: Mutex<D3D12SubmissionTracker>,
}

// COM 对象的引用计数是线程安全的，其余的状态由锁保护
unsafe impl Send for D3D12PresenterBackend {}
unsafe impl Sync for D3D12PresenterBackend {}

// new & init
impl D3D12PresenterBackend {
    pub fn new(provider: Arc<D3D12Provider>, cvars: PresenterCvars) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("D3D12PresenterBackend::new");

        let pipelines = GuestOutputPaintPipelines::new(provider.device())
            .context("failed to create the guest output paint pipelines")?;
        let paint_context = D3D12PaintContext::new(&provider).context("failed to create the paint context")?;
        let guest_output_refresher_tracker = D3D12SubmissionTracker::new(
            provider.device(),
            provider.direct_queue(),
            "presenter-guest-output-refresher",
        )?;

        Ok(Self {
            provider,
            cvars,
            pipelines,
            paint_context: Mutex::new(paint_context),
            guest_output_resources: Default::default(),
            guest_output_refresher_tracker: Mutex::new(guest_output_refresher_tracker),
        })
    }
}

// getters
impl D3D12PresenterBackend {
    #[inline]
    pub fn provider(&self) -> &Arc<D3D12Provider> {
        &self.provider
    }

    #[inline]
    pub(crate) fn lock_paint_context(&self) -> MutexGuard<'_, D3D12PaintContext> {
        self.paint_context.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 读取某个槽位的 guest output 纹理
    pub(crate) fn guest_output_resource(&self, mailbox_index: usize) -> Option<ID3D12Resource> {
        let instance = self.guest_output_resources[mailbox_index].lock().unwrap_or_else(|e| e.into_inner());
        instance.resource.clone()
    }
}

// surface 连接
impl D3D12PresenterBackend {
    fn connect_impl(
        &self,
        surface: &dyn PresenterSurface,
        surface_width: u32,
        surface_height: u32,
        was_paintable: bool,
    ) -> (SurfacePaintConnectResult, bool) {
        let (width, height) = swap_chain_size(surface_width, surface_height);

        let mut paint_context = self.lock_paint_context();
        let ctx = &mut *paint_context;

        // DXGI 不会隐式地开启垂直同步
        if ctx.connection.is_some() {
            if was_paintable
                && ctx.connection.as_ref().is_some_and(|connection| (connection.width, connection.height) == (width, height))
            {
                return (SurfacePaintConnectResult::SuccessUnchanged, false);
            }

            ctx.await_swap_chain_usage_completion();
            let resized = ctx.connection.as_mut().map(|connection| Self::resize_swap_chain(connection, width, height));
            if let Some(Err(e)) = resized {
                log::error!("D3D12Presenter: {:#}", e);
                ctx.connection = None;
            }
        }

        if ctx.connection.is_none() {
            let hwnd = match surface.raw_window_handle() {
                Ok(RawWindowHandle::Win32(handle)) => HWND(handle.hwnd.get() as *mut c_void),
                Ok(handle) => {
                    log::error!("D3D12Presenter: unsupported window handle {:?}", handle);
                    return (SurfacePaintConnectResult::FailureSurfaceUnusable, false);
                }
                Err(e) => {
                    log::error!("D3D12Presenter: failed to get the native handle of the surface: {}", e);
                    return (SurfacePaintConnectResult::FailureSurfaceUnusable, false);
                }
            };
            let stretch = swap_chain_needs_stretch((surface_width, surface_height), (width, height));
            match self.create_swap_chain(hwnd, width, height, stretch) {
                Ok(connection) => ctx.connection = Some(connection),
                Err(e) => {
                    log::error!("D3D12Presenter: {:#}", e);
                    return (SurfacePaintConnectResult::Failure, false);
                }
            }
        }

        ctx.create_swap_chain_rtvs(self.provider.device(), SWAP_CHAIN_FORMAT);
        (SurfacePaintConnectResult::Success, false)
    }

    fn create_swap_chain(&self, hwnd: HWND, width: u32, height: u32, stretch: bool) -> anyhow::Result<SwapChainConnection> {
        let _span = tracy_client::span!("D3D12PresenterBackend::create_swap_chain");

        let allows_tearing = self.cvars.d3d12_allow_variable_refresh_rate_and_tearing && self.provider.supports_tearing();
        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: SWAP_CHAIN_FORMAT,
            Stereo: false.into(),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: SWAP_CHAIN_BUFFER_COUNT,
            Scaling: if stretch { DXGI_SCALING_STRETCH } else { DXGI_SCALING_NONE },
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: DXGI_ALPHA_MODE_IGNORE,
            Flags: if allows_tearing { DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32 } else { 0 },
        };

        let factory = self.provider.factory();
        let swap_chain: IDXGISwapChain1 =
            unsafe { factory.CreateSwapChainForHwnd(self.provider.direct_queue(), hwnd, &desc, None, None) }
                .with_context(|| format!("failed to create a {}x{} swap chain", width, height))?;
        // 全屏由窗口自己处理
        if let Err(e) = unsafe { factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) } {
            log::warn!("D3D12Presenter: failed to disable Alt+Enter: {}", e);
        }
        let swap_chain = swap_chain.cast::<IDXGISwapChain3>().context("IDXGISwapChain3 is not supported")?;
        let buffers = D3D12PaintContext::get_swap_chain_buffers(&swap_chain)?;

        log::info!(
            "D3D12Presenter: created a {}x{} swap chain, tearing: {}, stretch: {}",
            width,
            height,
            allows_tearing,
            stretch
        );
        Ok(SwapChainConnection {
            swap_chain,
            buffers,
            width,
            height,
            allows_tearing,
        })
    }

    /// 调用者需要先等待 swap chain 的使用完成
    fn resize_swap_chain(connection: &mut SwapChainConnection, width: u32, height: u32) -> anyhow::Result<()> {
        // ResizeBuffers 之前需要释放所有 buffer 的引用
        connection.buffers.clear();
        let flags = if connection.allows_tearing { DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING } else { DXGI_SWAP_CHAIN_FLAG(0) };
        unsafe { connection.swap_chain.ResizeBuffers(0, width, height, DXGI_FORMAT_UNKNOWN, flags) }
            .with_context(|| format!("failed to resize the swap chain to {}x{}", width, height))?;
        connection.buffers = D3D12PaintContext::get_swap_chain_buffers(&connection.swap_chain)?;
        connection.width = width;
        connection.height = height;
        Ok(())
    }

    fn disconnect_impl(&self) {
        self.lock_paint_context().destroy_swap_chain();
    }
}

// guest output
impl D3D12PresenterBackend {
    fn refresh_impl(
        &self,
        mailbox_index: usize,
        frontbuffer_width: u32,
        frontbuffer_height: u32,
        is_8bpc: &mut bool,
        refresher: GuestOutputRefresher<'_>,
    ) -> bool {
        let _span = tracy_client::span!("D3D12PresenterBackend::refresh_guest_output");

        if frontbuffer_width > MAX_TEXTURE2D_DIMENSION || frontbuffer_height > MAX_TEXTURE2D_DIMENSION {
            log::error!(
                "D3D12Presenter: the guest output size {}x{} exceeds the maximum {}",
                frontbuffer_width,
                frontbuffer_height,
                MAX_TEXTURE2D_DIMENSION
            );
            return false;
        }

        let mut instance = self.guest_output_resources[mailbox_index].lock().unwrap_or_else(|e| e.into_inner());

        if instance
            .resource
            .as_ref()
            .is_some_and(|resource| util::resource_size(resource) != (frontbuffer_width, frontbuffer_height))
        {
            let tracker = self.guest_output_refresher_tracker.lock().unwrap_or_else(|e| e.into_inner());
            tracker.await_submission_completion(instance.last_refresher_submission);
            instance.resource = None;
        }

        if instance.resource.is_none() {
            match create_guest_output_texture(self.provider.device(), frontbuffer_width, frontbuffer_height) {
                Ok(resource) => instance.resource = Some(resource),
                Err(e) => {
                    log::error!("D3D12Presenter: {:#}", e);
                    return false;
                }
            }
        }
        let Some(resource) = instance.resource.clone() else {
            return false;
        };

        let mut context = D3D12GuestOutputRefreshContext::new(resource);
        let succeeded = refresher(&mut context);
        *is_8bpc = context.is_8bpc();

        // refresher 的命令已经提交到 direct queue，这里 signal 用于追踪它们的完成
        let mut tracker = self.guest_output_refresher_tracker.lock().unwrap_or_else(|e| e.into_inner());
        instance.last_refresher_submission = tracker.current_submission();
        tracker.next_submission();

        succeeded
    }

    fn capture_impl(&self, consumed: &ConsumedGuestOutput<'_>) -> Option<RawImage> {
        let _span = tracy_client::span!("D3D12PresenterBackend::capture_guest_output");

        let resource = self.guest_output_resource(consumed.mailbox_index()?)?;
        self.read_back_guest_output(&resource)
            .inspect_err(|e| log::error!("D3D12Presenter: failed to capture the guest output: {:#}", e))
            .ok()
    }

    fn read_back_guest_output(&self, resource: &ID3D12Resource) -> anyhow::Result<RawImage> {
        let device = self.provider.device();
        let queue = self.provider.direct_queue();

        let desc = unsafe { resource.GetDesc() };
        let mut footprint = D3D12_PLACED_SUBRESOURCE_FOOTPRINT::default();
        let mut total_bytes = 0u64;
        unsafe { device.GetCopyableFootprints(&desc, 0, 1, 0, Some(&mut footprint), None, None, Some(&mut total_bytes)) };

        let readback_buffer = util::create_committed_resource(
            device,
            D3D12_HEAP_TYPE_READBACK,
            &util::buffer_desc(total_bytes),
            D3D12_RESOURCE_STATE_COPY_DEST,
        )
        .context("failed to create the readback buffer")?;

        let allocator: ID3D12CommandAllocator = unsafe { device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT) }?;
        let cmd: ID3D12GraphicsCommandList =
            unsafe { device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &allocator, None) }?;

        let dst = D3D12_TEXTURE_COPY_LOCATION {
            pResource: unsafe { std::mem::transmute_copy(&readback_buffer) },
            Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                PlacedFootprint: footprint,
            },
        };
        let src = D3D12_TEXTURE_COPY_LOCATION {
            pResource: unsafe { std::mem::transmute_copy(resource) },
            Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { SubresourceIndex: 0 },
        };
        unsafe {
            cmd.ResourceBarrier(&[util::transition_barrier(
                resource,
                GUEST_OUTPUT_INTERNAL_STATE,
                D3D12_RESOURCE_STATE_COPY_SOURCE,
            )]);
            cmd.CopyTextureRegion(&dst, 0, 0, 0, &src, None);
            cmd.ResourceBarrier(&[util::transition_barrier(
                resource,
                D3D12_RESOURCE_STATE_COPY_SOURCE,
                GUEST_OUTPUT_INTERNAL_STATE,
            )]);
            cmd.Close()?;
            queue.ExecuteCommandLists(&[Some(cmd.cast::<ID3D12CommandList>()?)]);
        }
        let mut tracker = D3D12SubmissionTracker::new(device, queue, "guest-output-capture")?;
        if !tracker.next_submission() {
            anyhow::bail!("failed to signal the capture submission");
        }
        tracker.await_all_submissions_completion();

        let width = desc.Width as u32;
        let height = desc.Height;
        let read_range = D3D12_RANGE {
            Begin: footprint.Offset as usize,
            End: total_bytes as usize,
        };
        let mut mapped: *mut c_void = std::ptr::null_mut();
        unsafe { readback_buffer.Map(0, Some(&read_range), Some(&mut mapped)) }
            .context("failed to map the readback buffer")?;
        let image = {
            let rows = unsafe {
                std::slice::from_raw_parts(
                    (mapped as *const u8).add(footprint.Offset as usize),
                    (total_bytes - footprint.Offset) as usize,
                )
            };
            RawImage::from_packed_10bpc_rows(width, height, rows, footprint.Footprint.RowPitch as usize)
        };
        unsafe { readback_buffer.Unmap(0, Some(&D3D12_RANGE { Begin: 0, End: 0 })) };
        Ok(image)
    }
}

impl PresenterBackend for D3D12PresenterBackend {
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
impl Drop for D3D12PresenterBackend {
    fn drop(&mut self) {
        self.paint_context.get_mut().unwrap_or_else(|e| e.into_inner()).destroy();

        self.guest_output_refresher_tracker
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .await_all_submissions_completion();
        for instance in self.guest_output_resources.iter_mut() {
            instance.get_mut().unwrap_or_else(|e| e.into_inner()).resource = None;
        }
    }
}
