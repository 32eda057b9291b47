use anyhow::Context;
use windows::{
    Win32::{
        Foundation::BOOL,
        Graphics::{
            Direct3D::D3D_FEATURE_LEVEL_11_0,
            Direct3D12::*,
            Dxgi::{
                CreateDXGIFactory2, DXGI_ADAPTER_FLAG_SOFTWARE, DXGI_CREATE_FACTORY_FLAGS,
                DXGI_FEATURE_PRESENT_ALLOW_TEARING, IDXGIAdapter1, IDXGIFactory4, IDXGIFactory5,
            },
        },
    },
    core::Interface,
};

/// D3D12 设备以及 direct queue
///
/// presenter 以及 guest output 的 refresher 都需要使用同一个 direct queue
pub struct D3D12Provider {
    factory: IDXGIFactory4,
    adapter: IDXGIAdapter1,
    device: ID3D12Device,
    direct_queue: ID3D12CommandQueue,

    rtv_descriptor_size: u32,
    view_descriptor_size: u32,

    /// DXGI 是否支持 DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING，取决于 Windows 版本以及硬件
    supports_tearing: bool,
}

// 与 Gfx 一样，D3D12 的对象可以在任意线程使用
unsafe impl Send for D3D12Provider {}
unsafe impl Sync for D3D12Provider {}

// new & init
impl D3D12Provider {
    pub fn new() -> anyhow::Result<Self> {
        let _span = tracy_client::span!("D3D12Provider::new");

        let factory: IDXGIFactory4 =
            unsafe { CreateDXGIFactory2(DXGI_CREATE_FACTORY_FLAGS(0)) }.context("failed to create the DXGI factory")?;

        let (adapter, device) = Self::create_device(&factory)?;
        let direct_queue: ID3D12CommandQueue = unsafe {
            device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                ..Default::default()
            })
        }
        .context("failed to create the direct command queue")?;

        let rtv_descriptor_size = unsafe { device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) };
        let view_descriptor_size =
            unsafe { device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV) };

        let supports_tearing = Self::check_tearing_support(&factory);
        log::info!("D3D12Provider: DXGI tearing support: {}", supports_tearing);

        Ok(Self {
            factory,
            adapter,
            device,
            direct_queue,
            rtv_descriptor_size,
            view_descriptor_size,
            supports_tearing,
        })
    }

    /// 选择第一个支持 feature level 11_0 的硬件 adapter
    fn create_device(factory: &IDXGIFactory4) -> anyhow::Result<(IDXGIAdapter1, ID3D12Device)> {
        for i in 0.. {
            let Ok(adapter) = (unsafe { factory.EnumAdapters1(i) }) else {
                break;
            };
            let desc = unsafe { adapter.GetDesc1() }?;
            if (desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0 {
                continue;
            }

            let mut device: Option<ID3D12Device> = None;
            if unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device) }.is_err() {
                continue;
            }
            if let Some(device) = device {
                let name_len = desc.Description.iter().position(|&c| c == 0).unwrap_or(desc.Description.len());
                log::info!(
                    "D3D12Provider: using adapter {}",
                    String::from_utf16_lossy(&desc.Description[..name_len])
                );
                return Ok((adapter, device));
            }
        }
        anyhow::bail!("no hardware adapter supports Direct3D 12")
    }

    fn check_tearing_support(factory: &IDXGIFactory4) -> bool {
        let Ok(factory_5) = factory.cast::<IDXGIFactory5>() else {
            return false;
        };
        let mut allow_tearing = BOOL(0);
        let result = unsafe {
            factory_5.CheckFeatureSupport(
                DXGI_FEATURE_PRESENT_ALLOW_TEARING,
                &mut allow_tearing as *mut BOOL as *mut _,
                size_of::<BOOL>() as u32,
            )
        };
        result.is_ok() && allow_tearing.as_bool()
    }
}

// getters
impl D3D12Provider {
    #[inline]
    pub fn factory(&self) -> &IDXGIFactory4 {
        &self.factory
    }

    #[inline]
    pub fn adapter(&self) -> &IDXGIAdapter1 {
        &self.adapter
    }

    #[inline]
    pub fn device(&self) -> &ID3D12Device {
        &self.device
    }

    #[inline]
    pub fn direct_queue(&self) -> &ID3D12CommandQueue {
        &self.direct_queue
    }

    #[inline]
    pub fn rtv_descriptor_size(&self) -> u32 {
        self.rtv_descriptor_size
    }

    #[inline]
    pub fn view_descriptor_size(&self) -> u32 {
        self.view_descriptor_size
    }

    #[inline]
    pub fn supports_tearing(&self) -> bool {
        self.supports_tearing
    }
}
