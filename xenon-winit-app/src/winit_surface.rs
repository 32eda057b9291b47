//! 将 winit 的窗口适配为 Presenter 的 surface 以及 window

use std::sync::{Arc, Mutex};

use raw_window_handle::{HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::{event_loop::EventLoopProxy, window::Window};

use xenon_presenter::backend::{PresenterSurface, PresenterWindow};

use crate::app::UserEvent;

/// 窗口的客户区
pub struct WinitPresenterSurface {
    window: Arc<Window>,
}

impl WinitPresenterSurface {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }
}

impl PresenterSurface for WinitPresenterSurface {
    fn size(&self) -> Option<(u32, u32)> {
        let size = self.window.inner_size();
        Some((size.width, size.height))
    }

    fn raw_window_handle(&self) -> Result<RawWindowHandle, HandleError> {
        self.window.window_handle().map(|handle| handle.as_raw())
    }

    fn raw_display_handle(&self) -> Result<RawDisplayHandle, HandleError> {
        self.window.display_handle().map(|handle| handle.as_raw())
    }
}

/// 绘制请求通过 user event 转发到 UI 线程
pub struct WinitPresenterWindow {
    proxy: Mutex<EventLoopProxy<UserEvent>>,
}

impl WinitPresenterWindow {
    pub fn new(proxy: EventLoopProxy<UserEvent>) -> Self {
        Self {
            proxy: Mutex::new(proxy),
        }
    }
}

impl PresenterWindow for WinitPresenterWindow {
    fn request_paint(&self) {
        let proxy = self.proxy.lock().unwrap_or_else(|e| e.into_inner());
        // event loop 已经退出时，不再需要绘制
        if proxy.send_event(UserEvent::RequestPaint).is_err() {
            log::debug!("event loop closed, dropping the paint request");
        }
    }
}
