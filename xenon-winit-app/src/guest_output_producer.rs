//! 模拟模拟器 GPU 的 guest output 线程
//!
//! 以固定的间隔将 guest output 图像清除为随时间变化的颜色

use std::{sync::Arc, thread::JoinHandle, time::Duration};

use ash::vk;
use crossbeam_channel::{Receiver, Sender};

use xenon_gfx::{commands::barrier::GfxImageBarrier, gfx::Gfx};
use xenon_presenter::{guest_output::GuestOutputRefreshContext, presenter::Presenter};
use xenon_presenter_vulkan::{
    VulkanPresenterBackend,
    guest_output_image::{
        GUEST_OUTPUT_INTERNAL_ACCESS_MASK, GUEST_OUTPUT_INTERNAL_LAYOUT, GUEST_OUTPUT_INTERNAL_STAGE_MASK,
        VulkanGuestOutputRefreshContext,
    },
};

/// guest 的一种视频模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestVideoMode {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio_x: u32,
    pub aspect_ratio_y: u32,
}

/// 按 `R` 时依次切换
pub const GUEST_VIDEO_MODES: [GuestVideoMode; 3] = [
    GuestVideoMode {
        width: 1280,
        height: 720,
        aspect_ratio_x: 16,
        aspect_ratio_y: 9,
    },
    GuestVideoMode {
        width: 640,
        height: 480,
        aspect_ratio_x: 4,
        aspect_ratio_y: 3,
    },
    GuestVideoMode {
        width: 1920,
        height: 1080,
        aspect_ratio_x: 16,
        aspect_ratio_y: 9,
    },
];

enum ProducerCommand {
    CycleVideoMode,
    Stop,
}

pub struct GuestOutputProducer {
    sender: Sender<ProducerCommand>,
    thread: Option<JoinHandle<()>>,
}

// new & init
impl GuestOutputProducer {
    pub fn start(presenter: Arc<Presenter<VulkanPresenterBackend>>, frame_interval: Duration) -> anyhow::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("guest-output".to_string())
            .spawn(move || Self::run(presenter, receiver, frame_interval))?;

        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }
}

// tools
impl GuestOutputProducer {
    pub fn cycle_video_mode(&self) {
        let _ = self.sender.send(ProducerCommand::CycleVideoMode);
    }

    fn run(presenter: Arc<Presenter<VulkanPresenterBackend>>, receiver: Receiver<ProducerCommand>, frame_interval: Duration) {
        tracy_client::set_thread_name!("guest-output");
        log::info!("guest output thread started");

        let ticker = crossbeam_channel::tick(frame_interval);
        let mut video_mode_index = 0;
        let mut frame_index = 0_u64;

        loop {
            crossbeam_channel::select! {
                recv(receiver) -> command => match command {
                    Ok(ProducerCommand::CycleVideoMode) => {
                        video_mode_index = (video_mode_index + 1) % GUEST_VIDEO_MODES.len();
                        let mode = GUEST_VIDEO_MODES[video_mode_index];
                        log::info!(
                            "guest video mode: {}x{} ({}:{})",
                            mode.width,
                            mode.height,
                            mode.aspect_ratio_x,
                            mode.aspect_ratio_y
                        );
                    }
                    Ok(ProducerCommand::Stop) | Err(_) => break,
                },
                recv(ticker) -> _ => {
                    let _span = tracy_client::span!("guest output frame");
                    let mode = GUEST_VIDEO_MODES[video_mode_index];
                    let color = test_pattern_color(frame_index);
                    presenter.refresh_guest_output(
                        mode.width,
                        mode.height,
                        mode.aspect_ratio_x,
                        mode.aspect_ratio_y,
                        |ctx| clear_guest_output(ctx, color),
                    );
                    frame_index += 1;
                }
            }
        }

        log::info!("guest output thread stopped");
    }
}

// destroy
impl GuestOutputProducer {
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.sender.send(ProducerCommand::Stop);
        if thread.join().is_err() {
            log::error!("guest output thread panicked");
        }
    }
}

impl Drop for GuestOutputProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 每一帧的颜色：色相每帧前进 1 度
pub fn test_pattern_color(frame_index: u64) -> [f32; 4] {
    const SATURATION: f32 = 0.6;
    const VALUE: f32 = 0.8;

    let hue = (frame_index % 360) as f32 / 60.0;
    let chroma = VALUE * SATURATION;
    let x = chroma * (1.0 - (hue % 2.0 - 1.0).abs());
    let (r, g, b) = match hue as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = VALUE - chroma;
    [r + m, g + m, b + m, 1.0]
}

/// refresher：将 guest output 图像清除为指定的颜色
fn clear_guest_output(ctx: &mut dyn GuestOutputRefreshContext, color: [f32; 4]) -> bool {
    let Some(ctx) = ctx.as_any_mut().downcast_mut::<VulkanGuestOutputRefreshContext>() else {
        log::error!("guest output refresh context is not a Vulkan context");
        return false;
    };

    let image = ctx.image();
    let old_layout = ctx.image_current_layout();
    let src_stage = if ctx.image_ever_written_previously() {
        GUEST_OUTPUT_INTERNAL_STAGE_MASK
    } else {
        vk::PipelineStageFlags2::NONE
    };

    let result = Gfx::get().one_time_exec(
        |cmd| {
            let to_transfer = GfxImageBarrier::color(image)
                .layout_transfer(old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_mask(src_stage, vk::AccessFlags2::NONE)
                .dst_mask(vk::PipelineStageFlags2::CLEAR, vk::AccessFlags2::TRANSFER_WRITE);
            cmd.image_barriers(&[to_transfer]);

            cmd.cmd_clear_color_image(
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearColorValue { float32: color },
                &[vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                }],
            );

            let to_internal = GfxImageBarrier::color(image)
                .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, GUEST_OUTPUT_INTERNAL_LAYOUT)
                .src_mask(vk::PipelineStageFlags2::CLEAR, vk::AccessFlags2::TRANSFER_WRITE)
                .dst_mask(GUEST_OUTPUT_INTERNAL_STAGE_MASK, GUEST_OUTPUT_INTERNAL_ACCESS_MASK);
            cmd.image_barriers(&[to_internal]);
        },
        "guest-output-clear",
    );

    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("failed to clear the guest output: {:#}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_color_range() {
        for frame_index in 0..720 {
            let color = test_pattern_color(frame_index);
            assert!(color.iter().all(|c| (0.0..=1.0).contains(c)), "{:?}", color);
            assert_eq!(color[3], 1.0);
        }
    }

    #[test]
    fn test_pattern_color_hue() {
        // 0 度为红色，120 度为绿色
        let red = test_pattern_color(0);
        assert!(red[0] > red[1] && red[0] > red[2]);
        let green = test_pattern_color(120);
        assert!(green[1] > green[0] && green[1] > green[2]);
        assert_eq!(test_pattern_color(30), test_pattern_color(390));
    }

    #[test]
    fn test_video_modes() {
        // 演示用的视频模式都是方形像素
        for mode in GUEST_VIDEO_MODES {
            assert_eq!(mode.width * mode.aspect_ratio_y, mode.height * mode.aspect_ratio_x);
        }
    }
}
