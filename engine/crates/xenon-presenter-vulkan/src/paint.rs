//! 按照 paint flow 将 guest output 绘制到 swapchain 上

use ash::{prelude::VkResult, vk};

use xenon_gfx::{
    basic::color::LabelColor,
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer, submit_info::GfxSubmitInfo},
    gfx::Gfx,
    pipelines::shader::GfxShaderModuleCache,
};
use xenon_presenter::{
    backend::{PaintFrameContext, PaintResult},
    paint_flow::{ClearRectangle, MAX_GUEST_OUTPUT_PAINT_EFFECTS},
    shader_constants::{PaintConstantsLayout, PaintEffectConstants, RectangleConstants},
};

use crate::{
    guest_output_image::{
        GUEST_OUTPUT_INTERNAL_ACCESS_MASK, GUEST_OUTPUT_INTERNAL_LAYOUT, GUEST_OUTPUT_INTERNAL_STAGE_MASK,
        GuestOutputImage,
    },
    paint_context::SwapchainPipeline,
    pipelines::RECTANGLE_CONSTANTS_SIZE,
    ui_draw_context::VulkanUiDrawContext,
    vulkan_presenter::VulkanPresenterBackend,
};

const CLEAR_COLOR: vk::ClearColorValue = vk::ClearColorValue {
    float32: [0.0, 0.0, 0.0, 1.0],
};

/// acquire 失败时的绘制结果
pub fn acquire_error_to_paint_result(error: vk::Result) -> PaintResult {
    match error {
        vk::Result::ERROR_DEVICE_LOST => PaintResult::GpuLostResponsible,
        vk::Result::ERROR_OUT_OF_DATE_KHR
        | vk::Result::ERROR_SURFACE_LOST_KHR
        | vk::Result::ERROR_FULL_SCREEN_EXCLUSIVE_MODE_LOST_EXT => PaintResult::NotPresentedConnectionOutdated,
        _ => PaintResult::NotPresented,
    }
}

/// present 的结果
///
/// image 已经被 acquire，present 失败时该 image 无法再被使用，因此除了 device lost 之外都需要重建 swapchain
pub fn present_result_to_paint_result(result: VkResult<bool>) -> PaintResult {
    match result {
        Ok(false) => PaintResult::Presented,
        Ok(true) => PaintResult::PresentedSuboptimal,
        Err(vk::Result::ERROR_DEVICE_LOST) => PaintResult::GpuLostResponsible,
        Err(_) => PaintResult::NotPresentedConnectionOutdated,
    }
}

fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

fn begin_rendering(cmd: &GfxCommandBuffer, view: vk::ImageView, extent: vk::Extent2D, load_op: vk::AttachmentLoadOp) {
    let color_attachments = [vk::RenderingAttachmentInfo::default()
        .image_view(view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(load_op)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(vk::ClearValue { color: CLEAR_COLOR })];
    let rendering_info = vk::RenderingInfo::default()
        .render_area(full_rect(extent))
        .layer_count(1)
        .color_attachments(&color_attachments);
    cmd.cmd_begin_rendering(&rendering_info);
}

fn clear_rectangles(cmd: &GfxCommandBuffer, rectangles: &[ClearRectangle]) {
    if rectangles.is_empty() {
        return;
    }
    let attachments = [vk::ClearAttachment {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        color_attachment: 0,
        clear_value: vk::ClearValue { color: CLEAR_COLOR },
    }];
    let rects = rectangles
        .iter()
        .map(|rect| vk::ClearRect {
            rect: vk::Rect2D {
                offset: vk::Offset2D {
                    x: rect.x as i32,
                    y: rect.y as i32,
                },
                extent: vk::Extent2D {
                    width: rect.width,
                    height: rect.height,
                },
            },
            base_array_layer: 0,
            layer_count: 1,
        })
        .collect::<Vec<_>>();
    cmd.begin_label("clear", LabelColor::COLOR_CLEAR);
    cmd.cmd_clear_attachments(&attachments, &rects);
    cmd.end_label();
}

impl VulkanPresenterBackend {
    pub(crate) fn paint_and_present(&self, frame: &PaintFrameContext<'_>) -> PaintResult {
        let _span = tracy_client::span!("VulkanPresenterBackend::paint_and_present");

        let mut paint_context = self.lock_paint_context();
        let ctx = &mut *paint_context;

        if ctx.connection.as_ref().is_none_or(|connection| connection.swapchain.is_none()) {
            return PaintResult::NotPresented;
        }

        // =======================================
        // === 准备本次绘制使用的 command buffer

        // 复用槽位之前，等待该槽位上一次的提交完成
        let current_submission = ctx.submission_tracker.current_submission();
        let submission_count = ctx.submissions.len() as u64;
        if current_submission > submission_count {
            ctx.submission_tracker.await_submission_completion(current_submission - submission_count);
        }
        let submission = &ctx.submissions[(current_submission % submission_count) as usize];
        if let Err(e) = submission.command_pool().reset() {
            log::error!("VulkanPresenter: failed to reset the paint command pool: {:?}", e);
            return PaintResult::NotPresented;
        }
        let cmd = submission.command_buffer().clone();
        let acquire_semaphore = submission.acquire_semaphore().clone();
        let present_semaphore = submission.present_semaphore().clone();

        if let Err(e) = cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "presenter-paint") {
            log::error!("VulkanPresenter: failed to begin the paint command buffer: {:?}", e);
            return PaintResult::NotPresented;
        }

        // =======================================
        // === acquire swapchain image

        let Some(swapchain) = ctx.connection.as_ref().and_then(|connection| connection.swapchain.as_ref()) else {
            return PaintResult::NotPresented;
        };
        let swapchain_image_index = match swapchain.acquire_next_image(&acquire_semaphore) {
            Ok((index, _is_suboptimal)) => index,
            Err(e) => {
                let result = acquire_error_to_paint_result(e);
                log::warn!("VulkanPresenter: failed to acquire the swapchain image: {:?}", e);
                return result;
            }
        };
        let swapchain_handle = swapchain.handle();
        let swapchain_extent = swapchain.extent();
        let swapchain_format = swapchain.format();
        let swapchain_image = swapchain.images()[swapchain_image_index as usize];
        let swapchain_image_view = swapchain.image_views()[swapchain_image_index as usize].handle();
        let rt_size = (swapchain_extent.width, swapchain_extent.height);

        cmd.image_barriers(
            &[GfxImageBarrier::color(swapchain_image)
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::NONE)
                .dst_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)],
        );

        // =======================================
        // === 获取 guest output

        // 图像由 Arc 持有，不需要在录制期间持有 mailbox 的消费者锁
        let (guest_output_image, properties, config) = {
            let (consumed, config) = frame.consume_guest_output();
            let image = consumed.mailbox_index().and_then(|index| self.guest_output_image(index));
            (image, *consumed.properties(), config)
        };

        let max_extent = Gfx::get().max_2d_framebuffer_extent();
        let mut flow = frame.guest_output_paint_flow(
            &properties,
            swapchain_extent.width,
            swapchain_extent.height,
            max_extent.width,
            max_extent.height,
            &config,
        );
        if guest_output_image.is_none() {
            flow.effect_count = 0;
        }

        // =======================================
        // === 准备 intermediate 图像以及 pipeline

        if flow.effect_count > 0 {
            for i in 0..MAX_GUEST_OUTPUT_PAINT_EFFECTS - 1 {
                let needed_size = if i + 1 < flow.effect_count { flow.effect_output_sizes[i] } else { (0, 0) };
                let current_size = ctx.intermediates[i].as_ref().map_or((0, 0), GuestOutputImage::size);
                if current_size == needed_size {
                    continue;
                }
                if needed_size.0 != 0 && needed_size.1 != 0 {
                    if ctx.intermediates[i].is_some() {
                        ctx.submission_tracker.await_submission_completion(ctx.intermediate_last_submission);
                        ctx.intermediates[i] = None;
                    }
                    match GuestOutputImage::new(needed_size.0, needed_size.1, &format!("presenter-intermediate-{}", i)) {
                        Ok(image) => ctx.intermediates[i] = Some(image),
                        Err(e) => {
                            log::error!("VulkanPresenter: {:#}", e);
                            // 之后的 intermediate 都不再需要
                            flow.effect_count = 0;
                        }
                    }
                } else if ctx.submission_tracker.update_and_get_completed_submission() >= ctx.intermediate_last_submission
                {
                    // 不再需要，且 GPU 已经不再使用
                    ctx.intermediates[i] = None;
                }
            }
        }

        if flow.effects().iter().take(flow.effect_count.saturating_sub(1)).any(|&effect| {
            self.pipelines.intermediate_pipeline(effect).is_none()
        }) {
            flow.effect_count = 0;
        }

        if flow.effect_count > 0 {
            let final_effect = flow.effects[flow.effect_count - 1];
            let pipeline_slot = &mut ctx.swapchain_pipelines[final_effect.index()];
            if pipeline_slot.as_ref().is_some_and(|pipeline| pipeline.format != swapchain_format) {
                ctx.submission_tracker.await_submission_completion(ctx.guest_output_paint_last_submission);
                *pipeline_slot = None;
            }
            if pipeline_slot.is_none() {
                let mut shader_modules = GfxShaderModuleCache::new();
                match self.pipelines.create_pipeline(final_effect, swapchain_format, "swapchain", &mut shader_modules) {
                    Ok(pipeline) => {
                        *pipeline_slot = Some(SwapchainPipeline {
                            format: swapchain_format,
                            pipeline,
                        })
                    }
                    Err(e) => {
                        log::error!("VulkanPresenter: {:#}", e);
                        flow.effect_count = 0;
                    }
                }
                shader_modules.destroy();
            }
        }

        // =======================================
        // === 绘制 guest output

        let clear_by_load_op = frame.cvars().present_render_pass_clear;
        let swapchain_load_op =
            if clear_by_load_op { vk::AttachmentLoadOp::CLEAR } else { vk::AttachmentLoadOp::DONT_CARE };
        let mut swapchain_rendering_begun = false;
        let mut swapchain_clear_needed = true;

        if let Some(guest_output_image) = guest_output_image.as_ref().filter(|_| flow.effect_count > 0) {
            ctx.guest_output_paint_last_submission = current_submission;
            if flow.effect_count > 1 {
                ctx.intermediate_last_submission = current_submission;
            }

            for i in 0..flow.effect_count {
                let effect = flow.effects[i];
                let is_final = flow.is_final_effect(i);

                let source_view = if i == 0 {
                    guest_output_image.view()
                } else {
                    match ctx.intermediates[i - 1].as_ref() {
                        Some(source) => source.view(),
                        None => continue,
                    }
                };

                let (pipeline, target_size) = if is_final {
                    let Some(pipeline) = ctx.swapchain_pipelines[effect.index()].as_ref() else {
                        continue;
                    };
                    begin_rendering(&cmd, swapchain_image_view, swapchain_extent, swapchain_load_op);
                    swapchain_rendering_begun = true;
                    if clear_by_load_op {
                        swapchain_clear_needed = false;
                    }
                    (pipeline.pipeline.handle(), rt_size)
                } else {
                    let (Some(target), Some(pipeline)) =
                        (ctx.intermediates[i].as_ref(), self.pipelines.intermediate_pipeline(effect))
                    else {
                        continue;
                    };
                    // 之前的内容不需要保留
                    cmd.image_barriers(
                        &[GfxImageBarrier::color(target.image())
                            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                            .src_mask(GUEST_OUTPUT_INTERNAL_STAGE_MASK, vk::AccessFlags2::NONE)
                            .dst_mask(
                                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                            )],
                    );
                    begin_rendering(&cmd, target.view(), target.extent(), vk::AttachmentLoadOp::DONT_CARE);
                    (pipeline.handle(), target.size())
                };

                cmd.cmd_set_full_viewport(vk::Extent2D {
                    width: target_size.0,
                    height: target_size.1,
                });
                cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);

                let pipeline_layout = self.pipelines.pipeline_layout(PaintConstantsLayout::for_effect(effect));
                let image_infos = [vk::DescriptorImageInfo::default()
                    .image_view(source_view)
                    .image_layout(GUEST_OUTPUT_INTERNAL_LAYOUT)];
                let sampler_infos = [vk::DescriptorImageInfo::default().sampler(self.pipelines.sampler())];
                let writes = [
                    vk::WriteDescriptorSet::default()
                        .dst_binding(0)
                        .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                        .image_info(&image_infos),
                    vk::WriteDescriptorSet::default()
                        .dst_binding(1)
                        .descriptor_type(vk::DescriptorType::SAMPLER)
                        .image_info(&sampler_infos),
                ];
                cmd.cmd_push_descriptor_set(vk::PipelineBindPoint::GRAPHICS, pipeline_layout, 0, &writes);

                let rect_constants =
                    RectangleConstants::new_y_down(flow.effect_output_offset(i), flow.effect_output_sizes[i], target_size);
                cmd.cmd_push_constants(
                    pipeline_layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&rect_constants),
                );
                let effect_constants = PaintEffectConstants::for_effect(&flow, i, &config);
                cmd.cmd_push_constants(
                    pipeline_layout,
                    vk::ShaderStageFlags::FRAGMENT,
                    RECTANGLE_CONSTANTS_SIZE,
                    effect_constants.as_bytes(),
                );

                cmd.begin_label(&format!("guest-output-{}", effect.name()), LabelColor::COLOR_EFFECT);
                cmd.cmd_draw_rect();
                cmd.end_label();

                if is_final {
                    // guest output 之外的区域（letterbox）
                    if swapchain_clear_needed {
                        clear_rectangles(&cmd, flow.clear_rectangles());
                        swapchain_clear_needed = false;
                    }
                } else {
                    cmd.cmd_end_rendering();
                    if let Some(target) = ctx.intermediates[i].as_ref() {
                        cmd.image_barriers(
                            &[GfxImageBarrier::color(target.image())
                                .layout_transfer(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, GUEST_OUTPUT_INTERNAL_LAYOUT)
                                .src_mask(
                                    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                                    vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                                )
                                .dst_mask(GUEST_OUTPUT_INTERNAL_STAGE_MASK, GUEST_OUTPUT_INTERNAL_ACCESS_MASK)],
                        );
                    }
                }
            }

            ctx.release_completed_paint_refs();
            ctx.add_paint_ref(guest_output_image, current_submission);
        } else {
            ctx.release_completed_paint_refs();
        }

        if !swapchain_rendering_begun {
            begin_rendering(&cmd, swapchain_image_view, swapchain_extent, swapchain_load_op);
            if clear_by_load_op {
                swapchain_clear_needed = false;
            }
        }
        if swapchain_clear_needed {
            clear_rectangles(
                &cmd,
                &[ClearRectangle {
                    x: 0,
                    y: 0,
                    width: swapchain_extent.width,
                    height: swapchain_extent.height,
                }],
            );
        }

        // =======================================
        // === UI

        if frame.execute_ui() {
            let ui_draw_context = VulkanUiDrawContext {
                command_buffer: cmd.clone(),
                color_format: swapchain_format,
                render_target_width: swapchain_extent.width,
                render_target_height: swapchain_extent.height,
                submission_index: current_submission,
                completed_submission_index: ctx.submission_tracker.update_and_get_completed_submission(),
            };
            cmd.begin_label("ui", LabelColor::COLOR_UI);
            frame.execute_ui_drawers(&ui_draw_context);
            cmd.end_label();
        }

        cmd.cmd_end_rendering();
        cmd.image_barriers(
            &[GfxImageBarrier::color(swapchain_image)
                .layout_transfer(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
                .src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                .dst_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE)],
        );

        // =======================================
        // === 提交以及 present

        // image 已经被 acquire，失败之后只能重建 swapchain
        if let Err(e) = cmd.end() {
            log::error!("VulkanPresenter: failed to end the paint command buffer: {:?}", e);
            return PaintResult::NotPresentedConnectionOutdated;
        }
        let submit_info = GfxSubmitInfo::new(std::slice::from_ref(&cmd))
            .wait_binary(&acquire_semaphore, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .signal_binary(&present_semaphore, vk::PipelineStageFlags2::ALL_COMMANDS);
        if let Err(e) = ctx.submission_tracker.submit(Gfx::get().gfx_queue(), Some(submit_info)) {
            log::error!("VulkanPresenter: failed to submit the paint commands: {:?}", e);
            return PaintResult::NotPresentedConnectionOutdated;
        }

        let wait_semaphores = [present_semaphore.handle()];
        let swapchains = [swapchain_handle];
        let image_indices = [swapchain_image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let result = present_result_to_paint_result(Gfx::get().gfx_queue().present(&present_info));
        if result == PaintResult::NotPresentedConnectionOutdated || result.is_gpu_lost() {
            log::warn!("VulkanPresenter: present failed: {:?}", result);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_error() {
        assert_eq!(acquire_error_to_paint_result(vk::Result::ERROR_DEVICE_LOST), PaintResult::GpuLostResponsible);
        assert_eq!(
            acquire_error_to_paint_result(vk::Result::ERROR_OUT_OF_DATE_KHR),
            PaintResult::NotPresentedConnectionOutdated
        );
        assert_eq!(
            acquire_error_to_paint_result(vk::Result::ERROR_SURFACE_LOST_KHR),
            PaintResult::NotPresentedConnectionOutdated
        );
        assert_eq!(acquire_error_to_paint_result(vk::Result::TIMEOUT), PaintResult::NotPresented);
        assert_eq!(
            acquire_error_to_paint_result(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            PaintResult::NotPresented
        );
    }

    #[test]
    fn test_present_result() {
        assert_eq!(present_result_to_paint_result(Ok(false)), PaintResult::Presented);
        assert_eq!(present_result_to_paint_result(Ok(true)), PaintResult::PresentedSuboptimal);
        assert_eq!(
            present_result_to_paint_result(Err(vk::Result::ERROR_DEVICE_LOST)),
            PaintResult::GpuLostResponsible
        );
        assert_eq!(
            present_result_to_paint_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            PaintResult::NotPresentedConnectionOutdated
        );
    }
}
