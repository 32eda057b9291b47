//! 按照 paint flow 将 guest output 绘制到 swap chain 的 back buffer 上

use std::ffi::c_void;

use windows::{
    Win32::{
        Foundation::RECT,
        Graphics::{
            Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
            Direct3D12::*,
            Dxgi::{
                DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_DEVICE_RESET, DXGI_PRESENT, DXGI_PRESENT_ALLOW_TEARING,
                DXGI_PRESENT_RESTART,
            },
        },
    },
    core::{HRESULT, Interface},
};

use xenon_presenter::{
    backend::{PaintFrameContext, PaintResult},
    paint_flow::ClearRectangle,
    shader_constants::{PaintConstantsLayout, PaintEffectConstants, RectangleConstants},
};

use crate::{
    d3d12_presenter::D3D12PresenterBackend,
    descriptor_layout::{
        INTERMEDIATE_TEXTURE_COUNT, RTV_INDEX_INTERMEDIATE_0, RTV_INDEX_SWAP_CHAIN_BUFFER_0,
        VIEW_INDEX_GUEST_OUTPUT_0_SRV, VIEW_INDEX_INTERMEDIATE_0_SRV, find_paint_ref_slot,
        release_completed_paint_refs,
    },
    guest_output_resource::{
        GUEST_OUTPUT_FORMAT, GUEST_OUTPUT_INTERMEDIATE_FORMAT, GUEST_OUTPUT_INTERNAL_STATE, create_intermediate_texture,
    },
    pipelines::{
        RECTANGLE_CONSTANTS_DWORDS, ROOT_PARAMETER_EFFECT_CONSTANTS, ROOT_PARAMETER_RECTANGLE, ROOT_PARAMETER_SOURCE,
        SWAP_CHAIN_FORMAT,
    },
    swap_chain_config::MAX_TEXTURE2D_DIMENSION,
    ui_draw_context::D3D12UiDrawContext,
    util,
};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Present 的结果
///
/// DXGI_STATUS_OCCLUDED 等成功状态码都视为已经显示
pub fn present_result_to_paint_result(result: HRESULT) -> PaintResult {
    if result == DXGI_ERROR_DEVICE_REMOVED {
        PaintResult::GpuLostExternally
    } else if result == DXGI_ERROR_DEVICE_RESET {
        PaintResult::GpuLostResponsible
    } else if result.is_ok() {
        PaintResult::Presented
    } else {
        PaintResult::NotPresented
    }
}

/// Present 的 flags，DXGI_PRESENT_ALLOW_TEARING 只能用于带有对应 flag 的 swap chain
pub fn present_flags(allows_tearing: bool) -> DXGI_PRESENT {
    if allows_tearing { DXGI_PRESENT_RESTART | DXGI_PRESENT_ALLOW_TEARING } else { DXGI_PRESENT_RESTART }
}

fn to_rect(rect: &ClearRectangle) -> RECT {
    RECT {
        left: rect.x as i32,
        top: rect.y as i32,
        right: (rect.x + rect.width) as i32,
        bottom: (rect.y + rect.height) as i32,
    }
}

impl D3D12PresenterBackend {
    pub(crate) fn paint_and_present(&self, frame: &PaintFrameContext<'_>) -> PaintResult {
        let _span = tracy_client::span!("D3D12PresenterBackend::paint_and_present");

        let device = self.provider().device();

        let mut paint_context = self.lock_paint_context();
        let ctx = &mut *paint_context;

        let Some(connection) = ctx.connection.as_ref() else {
            return PaintResult::NotPresented;
        };
        let swap_chain = connection.swap_chain.clone();
        let allows_tearing = connection.allows_tearing;
        let rt_size = (connection.width, connection.height);
        let back_buffer_index = unsafe { swap_chain.GetCurrentBackBufferIndex() };
        let Some(back_buffer) = connection.buffers.get(back_buffer_index as usize).cloned() else {
            log::error!("D3D12Presenter: invalid back buffer index {}", back_buffer_index);
            return PaintResult::NotPresentedConnectionOutdated;
        };
        let back_buffer_rtv = ctx.rtv(RTV_INDEX_SWAP_CHAIN_BUFFER_0 + back_buffer_index);

        // =======================================
        // === 准备本次绘制使用的 command list

        // 复用 allocator 之前，等待它上一次的提交完成
        let current_submission = ctx.paint_tracker.current_submission();
        let allocator_count = ctx.command_allocators.len() as u64;
        if current_submission > allocator_count {
            ctx.paint_tracker.await_submission_completion(current_submission - allocator_count);
        }
        let allocator = ctx.command_allocators[(current_submission % allocator_count) as usize].clone();
        if let Err(e) = unsafe { allocator.Reset() } {
            log::error!("D3D12Presenter: failed to reset the paint command allocator: {}", e);
            return PaintResult::NotPresented;
        }
        let cmd = ctx.command_list.clone();
        if let Err(e) = unsafe { cmd.Reset(&allocator, None) } {
            log::error!("D3D12Presenter: failed to reset the paint command list: {}", e);
            return PaintResult::NotPresented;
        }

        // back buffer 是否已经转换到 RENDER_TARGET，以及是否已经绑定
        let mut back_buffer_acquired = false;
        let mut back_buffer_bound = false;
        let mut back_buffer_clear_needed = true;

        let acquire_back_buffer = |acquired: &mut bool| {
            if !*acquired {
                let barrier = util::transition_barrier(
                    &back_buffer,
                    D3D12_RESOURCE_STATE_PRESENT,
                    D3D12_RESOURCE_STATE_RENDER_TARGET,
                );
                unsafe { cmd.ResourceBarrier(&[barrier]) };
                *acquired = true;
            }
        };
        let bind_back_buffer = |bound: &mut bool| {
            if !*bound {
                unsafe { cmd.OMSetRenderTargets(1, Some(&back_buffer_rtv), false, None) };
                *bound = true;
            }
        };

        // =======================================
        // === 获取 guest output

        {
            // 录制读取 guest output 的命令期间持有，UI drawer 执行之前释放
            let (consumed, config) = frame.consume_guest_output();
            let guest_output = consumed.mailbox_index().and_then(|index| self.guest_output_resource(index));

            let mut flow = frame.guest_output_paint_flow(
                consumed.properties(),
                rt_size.0,
                rt_size.1,
                MAX_TEXTURE2D_DIMENSION,
                MAX_TEXTURE2D_DIMENSION,
                &config,
            );
            if guest_output.is_none() {
                flow.effect_count = 0;
            }
            let pipelines_missing = flow.effects().split_last().is_some_and(|(&final_effect, intermediate_effects)| {
                self.pipelines.final_pipeline(final_effect).is_none()
                    || intermediate_effects.iter().any(|&effect| self.pipelines.intermediate_pipeline(effect).is_none())
            });
            if pipelines_missing {
                flow.effect_count = 0;
            }

            // =======================================
            // === guest output 的 SRV

            let mut guest_output_slot = None;
            if let Some(resource) = guest_output.as_ref().filter(|_| flow.effect_count > 0) {
                let slot = find_paint_ref_slot(&ctx.guest_output_paint_refs, resource);
                if let Some(submission) = slot.await_submission {
                    ctx.paint_tracker.await_submission_completion(submission);
                }
                if slot.is_new {
                    ctx.guest_output_paint_refs[slot.index] = (0, Some(resource.clone()));
                    let desc = util::texture_2d_srv_desc(GUEST_OUTPUT_FORMAT);
                    let handle = ctx.view_cpu(VIEW_INDEX_GUEST_OUTPUT_0_SRV + slot.index as u32);
                    unsafe { device.CreateShaderResourceView(resource, Some(&desc), handle) };
                }
                guest_output_slot = Some(slot.index);
            }

            // =======================================
            // === 准备 intermediate 纹理

            if guest_output_slot.is_some() {
                for i in 0..INTERMEDIATE_TEXTURE_COUNT {
                    let needed_size = if i + 1 < flow.effect_count { flow.effect_output_sizes[i] } else { (0, 0) };
                    let current_size = ctx.intermediates[i].as_ref().map_or((0, 0), util::resource_size);
                    if current_size == needed_size {
                        continue;
                    }
                    if needed_size.0 != 0 && needed_size.1 != 0 {
                        if ctx.intermediates[i].is_some() {
                            ctx.paint_tracker.await_submission_completion(ctx.intermediate_last_submission);
                            ctx.intermediates[i] = None;
                        }
                        match create_intermediate_texture(device, needed_size.0, needed_size.1) {
                            Ok(texture) => {
                                let srv_desc = util::texture_2d_srv_desc(GUEST_OUTPUT_INTERMEDIATE_FORMAT);
                                let rtv_desc = util::texture_2d_rtv_desc(GUEST_OUTPUT_INTERMEDIATE_FORMAT);
                                unsafe {
                                    device.CreateShaderResourceView(
                                        &texture,
                                        Some(&srv_desc),
                                        ctx.view_cpu(VIEW_INDEX_INTERMEDIATE_0_SRV + i as u32),
                                    );
                                    device.CreateRenderTargetView(
                                        &texture,
                                        Some(&rtv_desc),
                                        ctx.rtv(RTV_INDEX_INTERMEDIATE_0 + i as u32),
                                    );
                                }
                                ctx.intermediates[i] = Some(texture);
                            }
                            Err(e) => {
                                log::error!("D3D12Presenter: {:#}", e);
                                flow.effect_count = 0;
                            }
                        }
                    } else if ctx.paint_tracker.completed_submission() >= ctx.intermediate_last_submission {
                        // 不再需要，且 GPU 已经不再使用
                        ctx.intermediates[i] = None;
                    }
                }
            }

            // =======================================
            // === 绘制 guest output

            if let Some(slot_index) = guest_output_slot.filter(|_| flow.effect_count > 0) {
                ctx.guest_output_paint_refs[slot_index].0 = current_submission;
                if flow.effect_count > 1 {
                    ctx.intermediate_last_submission = current_submission;
                }

                unsafe { cmd.SetDescriptorHeaps(&[Some(ctx.view_heap.clone())]) };

                for i in 0..flow.effect_count {
                    let effect = flow.effects[i];
                    let is_final = flow.is_final_effect(i);

                    let (pipeline, target_size) = if is_final {
                        let Some(pipeline) = self.pipelines.final_pipeline(effect) else {
                            continue;
                        };
                        acquire_back_buffer(&mut back_buffer_acquired);
                        bind_back_buffer(&mut back_buffer_bound);
                        (pipeline, rt_size)
                    } else {
                        let (Some(target), Some(pipeline)) =
                            (ctx.intermediates[i].as_ref(), self.pipelines.intermediate_pipeline(effect))
                        else {
                            continue;
                        };
                        let target_rtv = ctx.rtv(RTV_INDEX_INTERMEDIATE_0 + i as u32);
                        unsafe {
                            cmd.ResourceBarrier(&[util::transition_barrier(
                                target,
                                GUEST_OUTPUT_INTERNAL_STATE,
                                D3D12_RESOURCE_STATE_RENDER_TARGET,
                            )]);
                            // 之前的内容不需要保留
                            cmd.DiscardResource(target, None);
                            cmd.OMSetRenderTargets(1, Some(&target_rtv), false, None);
                        }
                        back_buffer_bound = false;
                        (pipeline, util::resource_size(target))
                    };

                    let source_view = if i == 0 {
                        ctx.view_gpu(VIEW_INDEX_GUEST_OUTPUT_0_SRV + slot_index as u32)
                    } else {
                        ctx.view_gpu(VIEW_INDEX_INTERMEDIATE_0_SRV + (i - 1) as u32)
                    };

                    let rect_constants =
                        RectangleConstants::new_y_up(flow.effect_output_offset(i), flow.effect_output_sizes[i], target_size);
                    let effect_constants = PaintEffectConstants::for_effect(&flow, i, &config);
                    let effect_dwords = effect_constants.as_dwords();

                    unsafe {
                        cmd.RSSetViewports(&[D3D12_VIEWPORT {
                            TopLeftX: 0.0,
                            TopLeftY: 0.0,
                            Width: target_size.0 as f32,
                            Height: target_size.1 as f32,
                            MinDepth: 0.0,
                            MaxDepth: 1.0,
                        }]);
                        cmd.RSSetScissorRects(&[RECT {
                            left: 0,
                            top: 0,
                            right: target_size.0 as i32,
                            bottom: target_size.1 as i32,
                        }]);
                        cmd.SetPipelineState(pipeline);
                        cmd.SetGraphicsRootSignature(self.pipelines.root_signature(PaintConstantsLayout::for_effect(effect)));
                        cmd.SetGraphicsRootDescriptorTable(ROOT_PARAMETER_SOURCE, source_view);
                        cmd.SetGraphicsRoot32BitConstants(
                            ROOT_PARAMETER_RECTANGLE,
                            RECTANGLE_CONSTANTS_DWORDS,
                            bytemuck::bytes_of(&rect_constants).as_ptr() as *const c_void,
                            0,
                        );
                        cmd.SetGraphicsRoot32BitConstants(
                            ROOT_PARAMETER_EFFECT_CONSTANTS,
                            effect_dwords.len() as u32,
                            effect_dwords.as_ptr() as *const c_void,
                            0,
                        );
                        cmd.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP);
                        cmd.DrawInstanced(4, 1, 0, 0);
                    }

                    if is_final {
                        // guest output 之外的区域（letterbox）
                        if back_buffer_clear_needed {
                            let rects = flow.clear_rectangles().iter().map(to_rect).collect::<Vec<_>>();
                            if !rects.is_empty() {
                                unsafe { cmd.ClearRenderTargetView(back_buffer_rtv, &CLEAR_COLOR, Some(&rects)) };
                            }
                            back_buffer_clear_needed = false;
                        }
                    } else if let Some(target) = ctx.intermediates[i].as_ref() {
                        unsafe {
                            cmd.ResourceBarrier(&[util::transition_barrier(
                                target,
                                D3D12_RESOURCE_STATE_RENDER_TARGET,
                                GUEST_OUTPUT_INTERNAL_STATE,
                            )]);
                        }
                    }
                }
            }

            let completed_submission = ctx.paint_tracker.completed_submission();
            release_completed_paint_refs(
                &mut ctx.guest_output_paint_refs,
                guest_output.as_ref().filter(|_| guest_output_slot.is_some()),
                completed_submission,
            );
        }

        acquire_back_buffer(&mut back_buffer_acquired);
        if back_buffer_clear_needed {
            unsafe { cmd.ClearRenderTargetView(back_buffer_rtv, &CLEAR_COLOR, None) };
        }

        // =======================================
        // === UI

        if frame.execute_ui() {
            bind_back_buffer(&mut back_buffer_bound);
            unsafe {
                cmd.RSSetViewports(&[D3D12_VIEWPORT {
                    TopLeftX: 0.0,
                    TopLeftY: 0.0,
                    Width: rt_size.0 as f32,
                    Height: rt_size.1 as f32,
                    MinDepth: 0.0,
                    MaxDepth: 1.0,
                }]);
            }
            let ui_draw_context = D3D12UiDrawContext {
                command_list: cmd.clone(),
                render_target_format: SWAP_CHAIN_FORMAT,
                render_target_width: rt_size.0,
                render_target_height: rt_size.1,
                submission_index: current_submission,
                completed_submission_index: ctx.paint_tracker.completed_submission(),
            };
            frame.execute_ui_drawers(&ui_draw_context);
        }

        unsafe {
            cmd.ResourceBarrier(&[util::transition_barrier(
                &back_buffer,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
                D3D12_RESOURCE_STATE_PRESENT,
            )]);
        }

        // =======================================
        // === 提交以及 present

        if let Err(e) = unsafe { cmd.Close() } {
            log::error!("D3D12Presenter: failed to close the paint command list: {}", e);
            return PaintResult::NotPresented;
        }
        let command_list = match cmd.cast::<ID3D12CommandList>() {
            Ok(command_list) => command_list,
            Err(e) => {
                log::error!("D3D12Presenter: {}", e);
                return PaintResult::NotPresented;
            }
        };
        unsafe { self.provider().direct_queue().ExecuteCommandLists(&[Some(command_list)]) };
        ctx.paint_tracker.next_submission();

        let present_hr = unsafe { swap_chain.Present(0, present_flags(allows_tearing)) };
        ctx.present_tracker.next_submission();

        let result = present_result_to_paint_result(present_hr);
        if result != PaintResult::Presented {
            log::warn!("D3D12Presenter: Present failed: {}", present_hr.message());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_result() {
        assert_eq!(present_result_to_paint_result(HRESULT(0)), PaintResult::Presented);
        assert_eq!(present_result_to_paint_result(DXGI_ERROR_DEVICE_REMOVED), PaintResult::GpuLostExternally);
        assert_eq!(present_result_to_paint_result(DXGI_ERROR_DEVICE_RESET), PaintResult::GpuLostResponsible);
        assert_eq!(
            present_result_to_paint_result(windows::Win32::Foundation::E_INVALIDARG),
            PaintResult::NotPresented
        );
    }

    #[test]
    fn test_present_flags() {
        assert_eq!(present_flags(false), DXGI_PRESENT_RESTART);
        assert_eq!(present_flags(true), DXGI_PRESENT_RESTART | DXGI_PRESENT_ALLOW_TEARING);
    }

    #[test]
    fn test_clear_rect() {
        let rect = to_rect(&ClearRectangle {
            x: 10,
            y: 20,
            width: 30,
            height: 40,
        });
        assert_eq!((rect.left, rect.top, rect.right, rect.bottom), (10, 20, 40, 60));
    }
}
