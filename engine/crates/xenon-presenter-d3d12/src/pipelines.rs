//! paint flow 中各个 effect 使用的 root signature 以及 pipeline state
//!
//! root signature 按照 [`PaintConstantsLayout`] 区分：
//! - param 0：输入纹理的 SRV descriptor table，t0
//! - param 1：vertex shader 的 [`RectangleConstants`]，root constant b0
//! - param 2：pixel shader 的 effect 常量，root constant b0
//! - static sampler s0：linear clamp

use std::ffi::CString;

use anyhow::Context;
use windows::{
    Win32::Graphics::{
        Direct3D::{
            Fxc::{D3DCOMPILE_OPTIMIZATION_LEVEL3, D3DCompile},
            ID3DBlob,
        },
        Direct3D12::*,
        Dxgi::Common::{DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC},
    },
    core::PCSTR,
};

use xenon_presenter::{
    paint_flow::GuestOutputPaintEffect,
    shader_constants::{GUEST_OUTPUT_VERTEX_SHADER, PaintConstantsLayout, RectangleConstants, guest_output_pixel_shader},
};

use crate::{guest_output_resource::GUEST_OUTPUT_INTERMEDIATE_FORMAT, shader_source::load_shader_source};

/// Windows 合成器内部使用的格式
pub const SWAP_CHAIN_FORMAT: DXGI_FORMAT = DXGI_FORMAT_B8G8R8A8_UNORM;

pub const ROOT_PARAMETER_SOURCE: u32 = 0;
pub const ROOT_PARAMETER_RECTANGLE: u32 = 1;
pub const ROOT_PARAMETER_EFFECT_CONSTANTS: u32 = 2;

/// vertex shader 的 root constant 数量
pub const RECTANGLE_CONSTANTS_DWORDS: u32 = (size_of::<RectangleConstants>() / 4) as u32;

fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize()) }
}

/// 使用 `D3DCompile` 编译 `engine/shader/src` 下的 HLSL
fn compile_shader(relative_path: &str, target: &str) -> anyhow::Result<ID3DBlob> {
    let _span = tracy_client::span!("compile_shader");

    let source = load_shader_source(relative_path)?;
    let source_name = CString::new(relative_path)?;
    let entry_point = CString::new("main")?;
    let target = CString::new(target)?;

    let mut blob: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    let result = unsafe {
        D3DCompile(
            source.as_ptr() as *const _,
            source.len(),
            PCSTR(source_name.as_ptr() as *const u8),
            None,
            None,
            PCSTR(entry_point.as_ptr() as *const u8),
            PCSTR(target.as_ptr() as *const u8),
            D3DCOMPILE_OPTIMIZATION_LEVEL3,
            0,
            &mut blob,
            Some(&mut errors),
        )
    };
    if let Some(errors) = errors {
        let message = String::from_utf8_lossy(blob_bytes(&errors));
        if result.is_err() {
            anyhow::bail!("failed to compile {}:\n{}", relative_path, message);
        }
        log::warn!("D3D12Presenter: {}:\n{}", relative_path, message);
    }
    result.with_context(|| format!("failed to compile {}", relative_path))?;
    blob.with_context(|| format!("D3DCompile returned no bytecode for {}", relative_path))
}

fn create_root_signature(device: &ID3D12Device, layout: PaintConstantsLayout) -> anyhow::Result<ID3D12RootSignature> {
    let source_range = D3D12_DESCRIPTOR_RANGE {
        RangeType: D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
        NumDescriptors: 1,
        BaseShaderRegister: 0,
        RegisterSpace: 0,
        OffsetInDescriptorsFromTableStart: 0,
    };
    let parameters = [
        D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                    NumDescriptorRanges: 1,
                    pDescriptorRanges: &source_range,
                },
            },
            ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
        },
        D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                Constants: D3D12_ROOT_CONSTANTS {
                    ShaderRegister: 0,
                    RegisterSpace: 0,
                    Num32BitValues: RECTANGLE_CONSTANTS_DWORDS,
                },
            },
            ShaderVisibility: D3D12_SHADER_VISIBILITY_VERTEX,
        },
        D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                Constants: D3D12_ROOT_CONSTANTS {
                    ShaderRegister: 0,
                    RegisterSpace: 0,
                    Num32BitValues: layout.size() / 4,
                },
            },
            ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
        },
    ];
    let sampler = D3D12_STATIC_SAMPLER_DESC {
        Filter: D3D12_FILTER_MIN_MAG_MIP_LINEAR,
        AddressU: D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
        AddressV: D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
        AddressW: D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
        MipLODBias: 0.0,
        MaxAnisotropy: 1,
        ComparisonFunc: D3D12_COMPARISON_FUNC_NEVER,
        BorderColor: D3D12_STATIC_BORDER_COLOR_OPAQUE_BLACK,
        MinLOD: 0.0,
        MaxLOD: 0.0,
        ShaderRegister: 0,
        RegisterSpace: 0,
        ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
    };
    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: parameters.len() as u32,
        pParameters: parameters.as_ptr(),
        NumStaticSamplers: 1,
        pStaticSamplers: &sampler,
        Flags: D3D12_ROOT_SIGNATURE_FLAG_NONE,
    };

    let mut blob: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    let result = unsafe { D3D12SerializeRootSignature(&desc, D3D_ROOT_SIGNATURE_VERSION_1, &mut blob, Some(&mut errors)) };
    if let (Err(e), Some(errors)) = (&result, &errors) {
        anyhow::bail!("failed to serialize the root signature: {}: {}", e, String::from_utf8_lossy(blob_bytes(errors)));
    }
    result.context("failed to serialize the root signature")?;
    let blob = blob.context("D3D12SerializeRootSignature returned no blob")?;

    let root_signature: ID3D12RootSignature = unsafe { device.CreateRootSignature(0, blob_bytes(&blob)) }?;
    Ok(root_signature)
}

fn create_pipeline_state(
    device: &ID3D12Device,
    root_signature: &ID3D12RootSignature,
    vs: &ID3DBlob,
    ps: &ID3DBlob,
    format: DXGI_FORMAT,
) -> anyhow::Result<ID3D12PipelineState> {
    let mut blend_state = D3D12_BLEND_DESC::default();
    blend_state.RenderTarget[0].RenderTargetWriteMask = D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8;
    let mut rtv_formats = [DXGI_FORMAT_UNKNOWN; 8];
    rtv_formats[0] = format;

    let desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
        // 不持有引用计数，root signature 的生命周期长于 pipeline 的创建
        pRootSignature: unsafe { std::mem::transmute_copy(root_signature) },
        VS: D3D12_SHADER_BYTECODE {
            pShaderBytecode: unsafe { vs.GetBufferPointer() },
            BytecodeLength: unsafe { vs.GetBufferSize() },
        },
        PS: D3D12_SHADER_BYTECODE {
            pShaderBytecode: unsafe { ps.GetBufferPointer() },
            BytecodeLength: unsafe { ps.GetBufferSize() },
        },
        BlendState: blend_state,
        SampleMask: u32::MAX,
        RasterizerState: D3D12_RASTERIZER_DESC {
            FillMode: D3D12_FILL_MODE_SOLID,
            CullMode: D3D12_CULL_MODE_NONE,
            DepthClipEnable: true.into(),
            ..Default::default()
        },
        PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
        NumRenderTargets: 1,
        RTVFormats: rtv_formats,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        ..Default::default()
    };
    let pipeline: ID3D12PipelineState = unsafe { device.CreateGraphicsPipelineState(&desc) }?;
    Ok(pipeline)
}

/// 与 swap chain 无关的绘制资源
pub struct GuestOutputPaintPipelines {
    /// 按照 `PaintConstantsLayout::index` 索引
    root_signatures: Vec<ID3D12RootSignature>,

    /// 按照 `GuestOutputPaintEffect::index` 索引，写入 intermediate 纹理
    intermediate_pipelines: Vec<Option<ID3D12PipelineState>>,
    /// 按照 `GuestOutputPaintEffect::index` 索引，写入 swap chain
    final_pipelines: Vec<Option<ID3D12PipelineState>>,
}

// new & init
impl GuestOutputPaintPipelines {
    pub fn new(device: &ID3D12Device) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GuestOutputPaintPipelines::new");

        let root_signatures = PaintConstantsLayout::ALL
            .iter()
            .map(|&layout| {
                create_root_signature(device, layout)
                    .with_context(|| format!("failed to create the {} root signature", layout.name()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let vs = compile_shader(GUEST_OUTPUT_VERTEX_SHADER, "vs_5_0")?;

        let mut intermediate_pipelines = vec![None; GuestOutputPaintEffect::COUNT];
        let mut final_pipelines = vec![None; GuestOutputPaintEffect::COUNT];
        for effect in GuestOutputPaintEffect::ALL {
            let ps = match compile_shader(&guest_output_pixel_shader(effect), "ps_5_0") {
                Ok(ps) => ps,
                Err(e) => {
                    log::error!("D3D12Presenter: {:#}", e);
                    continue;
                }
            };
            let root_signature = &root_signatures[PaintConstantsLayout::for_effect(effect).index()];

            let targets = [
                (effect.can_be_intermediate(), GUEST_OUTPUT_INTERMEDIATE_FORMAT, &mut intermediate_pipelines),
                (effect.can_be_final(), SWAP_CHAIN_FORMAT, &mut final_pipelines),
            ];
            for (needed, format, pipelines) in targets {
                if !needed {
                    continue;
                }
                match create_pipeline_state(device, root_signature, &vs, &ps, format) {
                    Ok(pipeline) => pipelines[effect.index()] = Some(pipeline),
                    Err(e) => log::error!(
                        "D3D12Presenter: failed to create the {} pipeline writing to {:?}: {:#}",
                        effect.name(),
                        format,
                        e
                    ),
                }
            }
        }

        Ok(Self {
            root_signatures,
            intermediate_pipelines,
            final_pipelines,
        })
    }
}

// getters
impl GuestOutputPaintPipelines {
    #[inline]
    pub fn root_signature(&self, layout: PaintConstantsLayout) -> &ID3D12RootSignature {
        &self.root_signatures[layout.index()]
    }

    #[inline]
    pub fn intermediate_pipeline(&self, effect: GuestOutputPaintEffect) -> Option<&ID3D12PipelineState> {
        self.intermediate_pipelines[effect.index()].as_ref()
    }

    #[inline]
    pub fn final_pipeline(&self, effect: GuestOutputPaintEffect) -> Option<&ID3D12PipelineState> {
        self.final_pipelines[effect.index()].as_ref()
    }
}
