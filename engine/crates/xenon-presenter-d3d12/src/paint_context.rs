//! 绘制线程使用的状态，由 paint 锁保护

use anyhow::Context;
use windows::Win32::Graphics::{
    Direct3D12::*,
    Dxgi::{Common::DXGI_FORMAT, IDXGISwapChain3},
};

use xenon_presenter::guest_output::GUEST_OUTPUT_MAILBOX_SIZE;

use crate::{
    descriptor_layout::{
        INTERMEDIATE_TEXTURE_COUNT, PaintRef, RTV_COUNT, RTV_INDEX_SWAP_CHAIN_BUFFER_0, SWAP_CHAIN_BUFFER_COUNT,
        VIEW_COUNT,
    },
    provider::D3D12Provider,
    submission_tracker::D3D12SubmissionTracker,
    util,
};

/// 同时在 GPU 上执行的绘制数量
pub const PAINT_SUBMISSION_COUNT: usize = 3;

/// 与窗口之间的连接
pub struct SwapChainConnection {
    pub swap_chain: IDXGISwapChain3,
    pub buffers: Vec<ID3D12Resource>,
    pub width: u32,
    pub height: u32,

    /// 创建时是否带有 DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING，ResizeBuffers 时需要保持一致
    pub allows_tearing: bool,
}

pub struct D3D12PaintContext {
    pub connection: Option<SwapChainConnection>,

    /// 绘制命令的提交
    pub paint_tracker: D3D12SubmissionTracker,
    /// present 的提交，present 会在 queue 上排队，swap chain 的 buffer 需要等待它完成之后才能释放
    pub present_tracker: D3D12SubmissionTracker,

    pub command_allocators: Vec<ID3D12CommandAllocator>,
    pub command_list: ID3D12GraphicsCommandList,

    pub rtv_heap: ID3D12DescriptorHeap,
    pub rtv_heap_start: D3D12_CPU_DESCRIPTOR_HANDLE,
    /// shader visible
    pub view_heap: ID3D12DescriptorHeap,
    pub view_heap_cpu_start: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub view_heap_gpu_start: D3D12_GPU_DESCRIPTOR_HANDLE,

    /// 正在被 GPU 读取的 guest output 纹理，槽位和 view heap 中的 SRV 一一对应
    pub guest_output_paint_refs: [PaintRef<ID3D12Resource>; GUEST_OUTPUT_MAILBOX_SIZE],

    /// paint flow 中间 effect 的输出
    pub intermediates: [Option<ID3D12Resource>; INTERMEDIATE_TEXTURE_COUNT],
    pub intermediate_last_submission: u64,

    rtv_descriptor_size: u32,
    view_descriptor_size: u32,
}

// 与 Provider 一样，只在 paint 锁内使用
unsafe impl Send for D3D12PaintContext {}

// 创建与销毁
impl D3D12PaintContext {
    pub fn new(provider: &D3D12Provider) -> anyhow::Result<Self> {
        let device = provider.device();

        let paint_tracker = D3D12SubmissionTracker::new(device, provider.direct_queue(), "presenter-paint")?;
        let present_tracker = D3D12SubmissionTracker::new(device, provider.direct_queue(), "presenter-present")?;

        let command_allocators = (0..PAINT_SUBMISSION_COUNT)
            .map(|i| {
                unsafe { device.CreateCommandAllocator::<ID3D12CommandAllocator>(D3D12_COMMAND_LIST_TYPE_DIRECT) }
                    .with_context(|| format!("failed to create the paint command allocator {}", i))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let command_list: ID3D12GraphicsCommandList = unsafe {
            device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &command_allocators[0], None)
        }
        .context("failed to create the paint command list")?;
        // 每一次绘制开始时 Reset
        unsafe { command_list.Close() }.context("failed to close the paint command list")?;

        let rtv_heap: ID3D12DescriptorHeap = unsafe {
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                NumDescriptors: RTV_COUNT,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
                NodeMask: 0,
            })
        }
        .context("failed to create the paint RTV heap")?;
        let view_heap: ID3D12DescriptorHeap = unsafe {
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
                NumDescriptors: VIEW_COUNT,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
                NodeMask: 0,
            })
        }
        .context("failed to create the paint view heap")?;

        let rtv_heap_start = unsafe { rtv_heap.GetCPUDescriptorHandleForHeapStart() };
        let view_heap_cpu_start = unsafe { view_heap.GetCPUDescriptorHandleForHeapStart() };
        let view_heap_gpu_start = unsafe { view_heap.GetGPUDescriptorHandleForHeapStart() };

        Ok(Self {
            connection: None,
            paint_tracker,
            present_tracker,
            command_allocators,
            command_list,
            rtv_heap,
            rtv_heap_start,
            view_heap,
            view_heap_cpu_start,
            view_heap_gpu_start,
            guest_output_paint_refs: Default::default(),
            intermediates: Default::default(),
            intermediate_last_submission: 0,
            rtv_descriptor_size: provider.rtv_descriptor_size(),
            view_descriptor_size: provider.view_descriptor_size(),
        })
    }

    /// 等待所有的提交完成，之后释放所有引用的资源
    pub fn destroy(&mut self) {
        self.await_swap_chain_usage_completion();
        self.connection = None;
        self.guest_output_paint_refs = Default::default();
        self.intermediates = Default::default();
    }
}

// getters
impl D3D12PaintContext {
    #[inline]
    pub fn rtv(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        util::offset_cpu_descriptor(self.rtv_heap_start, index, self.rtv_descriptor_size)
    }

    #[inline]
    pub fn view_cpu(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        util::offset_cpu_descriptor(self.view_heap_cpu_start, index, self.view_descriptor_size)
    }

    #[inline]
    pub fn view_gpu(&self, index: u32) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        util::offset_gpu_descriptor(self.view_heap_gpu_start, index, self.view_descriptor_size)
    }
}

// tools
impl D3D12PaintContext {
    /// 等待所有使用 swap chain buffer 的绘制以及 present 完成
    pub fn await_swap_chain_usage_completion(&self) {
        self.present_tracker.await_all_submissions_completion();
        self.paint_tracker.await_all_submissions_completion();
    }

    /// 释放 swap chain，调用者需要先等待其使用完成
    pub fn destroy_swap_chain(&mut self) {
        if self.connection.is_some() {
            self.await_swap_chain_usage_completion();
            self.connection = None;
        }
    }

    /// 为 swap chain 的 buffer 创建 RTV
    pub fn create_swap_chain_rtvs(&self, device: &ID3D12Device, format: DXGI_FORMAT) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        debug_assert_eq!(connection.buffers.len(), SWAP_CHAIN_BUFFER_COUNT as usize);
        let desc = util::texture_2d_rtv_desc(format);
        for (i, buffer) in connection.buffers.iter().enumerate() {
            let handle = self.rtv(RTV_INDEX_SWAP_CHAIN_BUFFER_0 + i as u32);
            unsafe { device.CreateRenderTargetView(buffer, Some(&desc), handle) };
        }
    }

    /// 获取 swap chain 的所有 buffer
    pub fn get_swap_chain_buffers(swap_chain: &IDXGISwapChain3) -> anyhow::Result<Vec<ID3D12Resource>> {
        (0..SWAP_CHAIN_BUFFER_COUNT)
            .map(|i| {
                unsafe { swap_chain.GetBuffer::<ID3D12Resource>(i) }
                    .with_context(|| format!("failed to get the swap chain buffer {}", i))
            })
            .collect()
    }
}
