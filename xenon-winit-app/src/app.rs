use std::{ffi::CStr, sync::Arc, time::Duration};

use anyhow::Context;
use raw_window_handle::HasDisplayHandle;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Window, WindowId},
};

use xenon_crate_tools::resource::XenonPath;
use xenon_gfx::gfx::Gfx;
use xenon_presenter::{
    config::PresenterCvars,
    presenter::{Presenter, fatal_error_host_gpu_loss_callback},
    ui_drawer::UiDrawer,
};
use xenon_presenter_vulkan::VulkanPresenterBackend;

use crate::{
    demo_config::DemoConfig,
    guest_output_producer::GuestOutputProducer,
    overlay_drawer::EffectIndicatorDrawer,
    winit_event_adapter::{DemoAction, WinitEventAdapter},
    winit_surface::{WinitPresenterSurface, WinitPresenterWindow},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    /// Presenter 从任意线程请求 UI 线程绘制
    RequestPaint,
}

/// overlay 位于所有 UI 之上
const OVERLAY_Z_ORDER: usize = 100;

pub struct WinitApp {
    config: DemoConfig,
    proxy: EventLoopProxy<UserEvent>,

    presenter: Option<Arc<Presenter<VulkanPresenterBackend>>>,
    producer: Option<GuestOutputProducer>,
    overlay: Arc<EffectIndicatorDrawer>,
    overlay_visible: bool,

    window: Option<Arc<Window>>,
}
// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口
    pub fn run() -> anyhow::Result<()> {
        let config = DemoConfig::load_or_default();
        let cvars = PresenterCvars::load_or_default(XenonPath::config_path(DemoConfig::FILE_NAME));
        log::info!("presenter cvars: {:?}", cvars);

        let event_loop = EventLoop::<UserEvent>::with_user_event().build().context("failed to create the event loop")?;

        let extra_instance_ext: Vec<&'static CStr> =
            ash_window_required_extensions(&event_loop).context("failed to query the surface instance extensions")?;
        Gfx::init("xenon-demo".to_string(), extra_instance_ext)?;

        let result = (|| -> anyhow::Result<()> {
            let backend = VulkanPresenterBackend::new(cvars.clone())?;
            let presenter = Presenter::new(backend, cvars, Some(Box::new(fatal_error_host_gpu_loss_callback)));
            presenter.set_guest_output_paint_config(&config.guest_output);

            let mut app = Self {
                overlay: Arc::new(EffectIndicatorDrawer::new(config.guest_output.effect())),
                overlay_visible: false,
                config,
                proxy: event_loop.create_proxy(),
                presenter: Some(Arc::new(presenter)),
                producer: None,
                window: None,
            };

            let run_result = event_loop.run_app(&mut app).context("event loop failed");
            log::info!("end run.");

            app.destroy();
            run_result
        })();

        Gfx::destroy();
        result
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，连接 surface 并启动 guest output 线程
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let Some(presenter) = self.presenter.clone() else {
            return Ok(());
        };

        let window = Arc::new(self.create_window(event_loop)?);

        let presenter_window = Arc::new(WinitPresenterWindow::new(self.proxy.clone()));
        let presenter_surface = Arc::new(WinitPresenterSurface::new(window.clone()));
        presenter.set_window_surface(Some(presenter_window), Some(presenter_surface));

        if self.producer.is_none() {
            let frame_interval = Duration::from_millis(self.config.window.frame_interval_ms.max(1));
            self.producer = Some(GuestOutputProducer::start(presenter, frame_interval)?);
        }

        self.window = Some(window);
        Ok(())
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<Window> {
        let window_attr = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(self.config.window.width, self.config.window.height));

        event_loop.create_window(window_attr).context("failed to create the window")
    }
}
// tools
impl WinitApp {
    fn handle_action(&mut self, event_loop: &ActiveEventLoop, action: DemoAction) {
        let Some(presenter) = self.presenter.as_ref() else {
            return;
        };

        let mut config = presenter.guest_output_paint_config();
        match action {
            DemoAction::SetEffect(effect) => {
                log::info!("effect: {:?}", effect);
                config.set_effect(effect);
                self.overlay.set_effect(effect);
            }
            DemoAction::ToggleDither => {
                config.set_dither(!config.dither());
                log::info!("dither: {}", config.dither());
            }
            DemoAction::ToggleOverscanCutoff => {
                config.set_allow_overscan_cutoff(!config.allow_overscan_cutoff());
                log::info!("allow overscan cutoff: {}", config.allow_overscan_cutoff());
            }
            DemoAction::CycleGuestResolution => {
                if let Some(producer) = self.producer.as_ref() {
                    producer.cycle_video_mode();
                }
            }
            DemoAction::ToggleOverlay => {
                self.overlay_visible = !self.overlay_visible;
                let drawer: Arc<dyn UiDrawer> = self.overlay.clone();
                if self.overlay_visible {
                    presenter.add_ui_drawer(drawer, OVERLAY_Z_ORDER);
                } else {
                    presenter.remove_ui_drawer(&drawer);
                }
            }
            DemoAction::Capture => {
                if let Err(e) = Self::capture(presenter) {
                    log::error!("capture failed: {:#}", e);
                }
            }
            DemoAction::Exit => {
                event_loop.exit();
            }
        }
        presenter.set_guest_output_paint_config(&config);
    }

    /// 将最新的 guest output 保存为 PNG
    fn capture(presenter: &Presenter<VulkanPresenterBackend>) -> anyhow::Result<()> {
        let _span = tracy_client::span!("capture");

        let Some(raw_image) = presenter.capture_guest_output() else {
            log::warn!("no guest output to capture");
            return Ok(());
        };

        let file_name = format!("capture-{}.png", chrono::Local::now().format("%Y%m%d-%H%M%S"));
        let path = XenonPath::captures_path(&file_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
        }

        let image = image::RgbaImage::from_raw(raw_image.width, raw_image.height, raw_image.as_rgba8().to_vec())
            .context("captured image size mismatch")?;
        image.save(&path).with_context(|| format!("failed to save {:?}", path))?;

        log::info!("guest output saved to {:?}", path);
        Ok(())
    }
}
// destroy
impl WinitApp {
    /// 先停止 guest output 线程，再断开 surface，最后在 Gfx 销毁之前释放后端
    fn destroy(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
        if let Some(presenter) = self.presenter.take() {
            presenter.set_window_surface(None, None);
            if Arc::strong_count(&presenter) != 1 {
                log::warn!("presenter is still referenced at exit");
            }
        }
        self.window = None;
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler<UserEvent> for WinitApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");

        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init_after_window(event_loop) {
            log::error!("{:#}", e);
            event_loop.exit();
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::RequestPaint => {
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let Some(action) = WinitEventAdapter::to_demo_action(&event) {
            self.handle_action(event_loop, action);
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(_) => {
                if let Some(presenter) = self.presenter.as_ref() {
                    presenter.on_surface_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                let _span = tracy_client::span!("paint from ui thread");
                if let Some(presenter) = self.presenter.as_ref() {
                    // 窗口系统的重绘请求（例如窗口被遮挡后重新显示）没有对应的 presenter 请求，需要强制绘制
                    presenter.paint_from_ui_thread(true);
                }
            }
            _ => {}
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }

    fn memory_warning(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("memory warning");
    }
}

fn ash_window_required_extensions(event_loop: &EventLoop<UserEvent>) -> anyhow::Result<Vec<&'static CStr>> {
    let display_handle = event_loop.display_handle()?;
    let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())?;
    Ok(extensions.iter().map(|ext| unsafe { CStr::from_ptr(*ext) }).collect())
}
