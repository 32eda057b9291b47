use std::any::Any;

use anyhow::Context;
use windows::Win32::Graphics::{
    Direct3D12::*,
    Dxgi::Common::{DXGI_FORMAT, DXGI_FORMAT_R10G10B10A2_UNORM},
};

use xenon_presenter::guest_output::GuestOutputRefreshContext;

use crate::util;

/// guest output 纹理的格式
pub const GUEST_OUTPUT_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R10G10B10A2_UNORM;
/// paint flow 中间结果的格式
pub const GUEST_OUTPUT_INTERMEDIATE_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R10G10B10A2_UNORM;

/// 不被读写时，guest output 以及 intermediate 纹理所处的状态
///
/// refresher 写入完成之后，需要将纹理转换回该状态
pub const GUEST_OUTPUT_INTERNAL_STATE: D3D12_RESOURCE_STATES = D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE;

/// refresher 可以通过 UAV 写入 guest output 纹理
pub fn create_guest_output_texture(device: &ID3D12Device, width: u32, height: u32) -> anyhow::Result<ID3D12Resource> {
    let desc = util::texture_2d_desc(width, height, GUEST_OUTPUT_FORMAT, D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS);
    util::create_committed_resource(device, D3D12_HEAP_TYPE_DEFAULT, &desc, GUEST_OUTPUT_INTERNAL_STATE)
        .with_context(|| format!("failed to create the {}x{} guest output texture", width, height))
}

pub fn create_intermediate_texture(device: &ID3D12Device, width: u32, height: u32) -> anyhow::Result<ID3D12Resource> {
    let desc = util::texture_2d_desc(
        width,
        height,
        GUEST_OUTPUT_INTERMEDIATE_FORMAT,
        D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET,
    );
    util::create_committed_resource(device, D3D12_HEAP_TYPE_DEFAULT, &desc, GUEST_OUTPUT_INTERNAL_STATE)
        .with_context(|| format!("failed to create the {}x{} guest output intermediate texture", width, height))
}

/// D3D12 后端提供给 refresher 的上下文
///
/// refresher 需要使用 provider 的 direct queue 提交命令，
/// 提交之前纹理处于 [`GUEST_OUTPUT_INTERNAL_STATE`]，提交的命令结束时也需要处于该状态
pub struct D3D12GuestOutputRefreshContext {
    is_8bpc: bool,
    resource: ID3D12Resource,
}

// new & init
impl D3D12GuestOutputRefreshContext {
    pub fn new(resource: ID3D12Resource) -> Self {
        Self {
            is_8bpc: false,
            resource,
        }
    }
}

// getters
impl D3D12GuestOutputRefreshContext {
    #[inline]
    pub fn resource(&self) -> &ID3D12Resource {
        &self.resource
    }

    #[inline]
    pub fn is_8bpc(&self) -> bool {
        self.is_8bpc
    }
}

impl GuestOutputRefreshContext for D3D12GuestOutputRefreshContext {
    fn set_is_8bpc(&mut self, is_8bpc: bool) {
        self.is_8bpc = is_8bpc;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
