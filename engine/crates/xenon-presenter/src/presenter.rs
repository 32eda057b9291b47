//! surface 连接以及绘制模式的状态机
//!
//! 参与的线程：
//! - UI 线程：窗口事件（surface 的设置、尺寸变化、绘制请求）以及 UI drawer 的管理
//! - guest output 线程：刷新 guest output，在 `GuestOutputThreadImmediately` 模式下直接绘制
//!
//! 锁的顺序：`paint` -> `ui` / `window`。
//! 执行 UI drawer 时不持有 `ui`，drawer 可以在绘制过程中调用 Presenter 的接口。

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, AtomicU8, Ordering},
};

use crate::{
    backend::{
        PaintConnectionState, PaintFrameContext, PaintMode, PaintResult, PresenterBackend, PresenterSurface,
        PresenterWindow, SurfacePaintConnectResult,
    },
    config::PresenterCvars,
    guest_output::{GuestOutputRefreshContext, RawImage},
    mailbox::GuestOutputMailbox,
    paint_config::{Effect, GuestOutputPaintConfig},
    ui_drawer::{UiDrawContext, UiDrawer, UiDrawerRegistry},
};

/// 设备丢失时的回调
///
/// # param
/// * is_responsible - 设备是否由于 presenter 自身的操作而丢失
/// * statically_from_ui_thread - 是否一定在 UI 线程中调用
pub type HostGpuLossCallback = Box<dyn Fn(bool, bool) + Send + Sync>;

/// 默认的设备丢失回调：无法恢复，直接终止
pub fn fatal_error_host_gpu_loss_callback(is_responsible: bool, statically_from_ui_thread: bool) {
    log::error!(
        "Graphics device lost (is_responsible: {}, from_ui_thread: {})",
        is_responsible,
        statically_from_ui_thread
    );
    panic!("Graphics device lost (probably due to an internal error)");
}

/// 与 surface 的连接，只在持有 `Presenter::paint` 时访问
struct PaintConnection {
    surface: Option<Arc<dyn PresenterSurface>>,

    state: PaintConnectionState,
    has_implicit_vsync: bool,
    surface_width: u32,
    surface_height: u32,
    /// 连接建立后是否有过一次最优的 present
    ///
    /// 连接一开始就是 suboptimal 时，不需要将其标记为过期
    was_optimal_at_successful_paint: bool,
}

impl Default for PaintConnection {
    fn default() -> Self {
        Self {
            surface: None,
            state: PaintConnectionState::RetryAtStateChange,
            has_implicit_vsync: false,
            surface_width: 0,
            surface_height: 0,
            was_optimal_at_successful_paint: false,
        }
    }
}

#[derive(Default)]
struct UiThreadState {
    drawers: UiDrawerRegistry,

    /// UI 线程正在绘制，此时的绘制请求会推迟到绘制结束时处理
    in_paint: bool,
    request_guest_output_paint_after_current: bool,
    request_ui_paint_after_current: bool,
}

pub struct Presenter<B: PresenterBackend> {
    backend: B,
    cvars: PresenterCvars,
    host_gpu_loss_callback: Option<HostGpuLossCallback>,

    mailbox: GuestOutputMailbox,
    paint_config: Mutex<GuestOutputPaintConfig>,

    paint: Mutex<PaintConnection>,
    /// 只在持有 `paint` 时修改，可以在不持有锁时粗略地读取
    paint_mode: AtomicU8,

    window: Mutex<Option<Arc<dyn PresenterWindow>>>,
    ui: Mutex<UiThreadState>,

    /// 已经向窗口请求过绘制，在 UI 线程绘制之前不需要再次请求
    ui_thread_paint_requested: AtomicBool,
}

// new & init
impl<B: PresenterBackend> Presenter<B> {
    pub fn new(backend: B, cvars: PresenterCvars, host_gpu_loss_callback: Option<HostGpuLossCallback>) -> Self {
        Self {
            backend,
            cvars,
            host_gpu_loss_callback,
            mailbox: GuestOutputMailbox::new(),
            paint_config: Mutex::new(GuestOutputPaintConfig::default()),
            paint: Mutex::new(PaintConnection::default()),
            paint_mode: AtomicU8::new(PaintMode::None.as_u8()),
            window: Mutex::new(None),
            ui: Mutex::new(UiThreadState::default()),
            ui_thread_paint_requested: AtomicBool::new(false),
        }
    }
}

// getters
impl<B: PresenterBackend> Presenter<B> {
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn cvars(&self) -> &PresenterCvars {
        &self.cvars
    }

    #[inline]
    pub fn paint_mode(&self) -> PaintMode {
        PaintMode::from_u8(self.paint_mode.load(Ordering::Acquire))
    }

    pub fn paint_connection_state(&self) -> PaintConnectionState {
        self.lock_paint().state
    }

    pub fn guest_output_paint_config(&self) -> GuestOutputPaintConfig {
        self.paint_config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// surface 可以绘制时，期望的绘制模式
    pub fn desired_paint_mode(&self, is_paintable: bool) -> PaintMode {
        let paint = self.lock_paint();
        self.desired_paint_mode_locked(&paint, is_paintable)
    }
}

// UI 线程：surface
impl<B: PresenterBackend> Presenter<B> {
    /// 设置绘制的目标窗口以及 surface，两者都为 None 时断开连接
    pub fn set_window_surface(
        &self,
        new_window: Option<Arc<dyn PresenterWindow>>,
        new_surface: Option<Arc<dyn PresenterSurface>>,
    ) {
        // surface 属于窗口，不能单独存在
        debug_assert!(!(new_surface.is_some() && new_window.is_none()));

        let mut paint = self.lock_paint();

        let same_window = {
            let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            match (window.as_ref(), new_window.as_ref()) {
                (None, None) => true,
                (Some(old), Some(new)) => std::ptr::addr_eq(Arc::as_ptr(old), Arc::as_ptr(new)),
                _ => false,
            }
        };
        let same_surface = match (paint.surface.as_ref(), new_surface.as_ref()) {
            (None, None) => true,
            (Some(old), Some(new)) => std::ptr::addr_eq(Arc::as_ptr(old), Arc::as_ptr(new)),
            _ => false,
        };
        if same_window && (new_window.is_none() || same_surface) {
            return;
        }

        // 断开当前的 surface，在新的连接建立之前，guest output 线程不会再绘制或者请求绘制
        if paint.surface.is_some() {
            self.set_paint_mode(&paint, PaintMode::None);
            self.disconnect_paint_connection(&mut paint, PaintConnectionState::RetryAtStateChange);
            paint.surface = None;
        }

        if !same_window {
            *self.window.lock().unwrap_or_else(|e| e.into_inner()) = new_window;
        }

        if let Some(new_surface) = new_surface {
            debug_assert_eq!(self.paint_mode(), PaintMode::None);
            debug_assert_eq!(paint.state, PaintConnectionState::RetryAtStateChange);
            paint.surface = Some(new_surface);
            if self.update_surface_paint_connection(&mut paint, true) {
                self.request_paint_or_connection_recovery();
            }
        }
    }

    pub fn on_surface_resize(&self) {
        let mut paint = self.lock_paint();
        if paint.surface.is_none() {
            return;
        }

        // 降级为 UiThreadOnRequest 而不是 None：尺寸可能没有实际变化，此时保留当前的图像，
        // 同时不会错过这期间刷新的 guest output
        if self.paint_mode() == PaintMode::GuestOutputThreadImmediately {
            self.set_paint_mode(&paint, PaintMode::UiThreadOnRequest);
        }

        if self.update_surface_paint_connection(&mut paint, true) {
            self.request_paint_or_connection_recovery();
        }
    }
}

// UI 线程：绘制
impl<B: PresenterBackend> Presenter<B> {
    /// 响应窗口的绘制请求
    ///
    /// # param
    /// * force_paint - 即使没有绘制请求也进行绘制，例如窗口系统要求重绘时
    pub fn paint_from_ui_thread(&self, force_paint: bool) {
        let mut paint = self.lock_paint();
        if paint.surface.is_none() {
            return;
        }

        // 绘制期间的模式修改以及绘制请求推迟到最后处理
        let draw_ui = {
            let mut ui = self.lock_ui();
            debug_assert!(!ui.in_paint);
            ui.in_paint = true;
            ui.request_guest_output_paint_after_current = false;
            ui.request_ui_paint_after_current = false;
            !ui.drawers.is_empty()
        };

        let mut do_paint = force_paint || draw_ui;
        // 无论是否需要绘制 UI 都要清除，该标记也可能用于请求重新连接
        if self.ui_thread_paint_requested.swap(false, Ordering::Relaxed) {
            do_paint = true;
        }

        let mut paint_result = PaintResult::NotPresented;
        let mut request_repaint_at_tick = false;
        let mut request_repaint_immediately = false;
        if do_paint {
            // 从 guest output 线程取回绘制，降级为 UiThreadOnRequest，
            // 这样绘制期间刷新的新一帧仍然会通知到 UI 线程
            if self.paint_mode() == PaintMode::GuestOutputThreadImmediately {
                self.set_paint_mode(&paint, PaintMode::UiThreadOnRequest);
            }
            // 尝试从上一次绘制的过期中恢复
            if paint.state == PaintConnectionState::Outdated {
                self.update_surface_paint_connection(&mut paint, false);
            }
            if paint.state == PaintConnectionState::Paintable {
                self.set_paint_mode(&paint, PaintMode::UiThreadOnRequest);

                paint_result = self.paint_and_present(&mut paint, draw_ui);
                if paint.state == PaintConnectionState::Outdated {
                    // 在下一帧而不是立即恢复，给窗口系统发送 resize 等事件的时间
                    request_repaint_immediately = true;
                }
            }
            if paint.state != PaintConnectionState::Paintable {
                self.set_paint_mode(&paint, PaintMode::None);
            }
        }

        // 将绘制交还给 guest output 线程，同时同步 UI drawer 在绘制中造成的修改
        if self.paint_mode() != PaintMode::None {
            let desired = self.desired_paint_mode_locked(&paint, true);
            self.set_paint_mode(&paint, desired);
        }

        let (request_guest_output_paint, request_ui_paint, drawers_empty) = {
            let mut ui = self.lock_ui();
            ui.in_paint = false;
            (
                ui.request_guest_output_paint_after_current,
                ui.request_ui_paint_after_current,
                ui.drawers.is_empty(),
            )
        };

        // 设备丢失之后请求重绘没有意义
        if paint_result.is_gpu_lost() {
            drop(paint);
            self.report_gpu_loss(paint_result, true);
            return;
        }

        if self.paint_mode() != PaintMode::None {
            // UI 被隐藏时，需要立即绘制没有 UI 的 guest output
            if request_guest_output_paint || (draw_ui && drawers_empty) {
                request_repaint_immediately = true;
            }
            if request_ui_paint && !drawers_empty {
                request_repaint_at_tick = true;
            }
        }
        if request_repaint_at_tick || request_repaint_immediately {
            self.request_paint_or_connection_recovery();
        }
    }
}

// guest output 线程
impl<B: PresenterBackend> Presenter<B> {
    /// 刷新 guest output，并根据绘制模式触发绘制
    ///
    /// 宽高比任一分量为 0 时表示 guest output 为空白
    ///
    /// # return
    /// guest output 是否 active
    pub fn refresh_guest_output<F>(
        &self,
        frontbuffer_width: u32,
        frontbuffer_height: u32,
        display_aspect_ratio_x: u32,
        display_aspect_ratio_y: u32,
        refresher: F,
    ) -> bool
    where
        F: FnOnce(&mut dyn GuestOutputRefreshContext) -> bool,
    {
        let published = self.mailbox.refresh(
            frontbuffer_width,
            frontbuffer_height,
            display_aspect_ratio_x,
            display_aspect_ratio_y,
            |mailbox_index, properties| {
                self.backend.refresh_guest_output_impl(
                    mailbox_index,
                    frontbuffer_width,
                    frontbuffer_height,
                    &mut properties.is_8bpc,
                    Box::new(refresher),
                )
            },
        );
        let Some(is_active) = published else {
            return false;
        };

        let mut paint_result = PaintResult::NotPresented;
        match self.paint_mode() {
            PaintMode::None => {}
            PaintMode::UiThreadOnRequest => {
                self.request_paint_or_connection_recovery();
            }
            PaintMode::GuestOutputThreadImmediately => {
                let mut paint = self.lock_paint();
                // 等待锁的期间，UI 线程可能已经取回了绘制
                match self.paint_mode() {
                    PaintMode::None => {}
                    PaintMode::UiThreadOnRequest => {
                        self.request_paint_or_connection_recovery();
                    }
                    PaintMode::GuestOutputThreadImmediately => {
                        if paint.state == PaintConnectionState::Paintable {
                            paint_result = self.paint_and_present(&mut paint, false);
                            if paint.state == PaintConnectionState::Outdated {
                                self.request_paint_or_connection_recovery();
                            }
                        }
                    }
                }
            }
        }

        if paint_result.is_gpu_lost() {
            self.report_gpu_loss(paint_result, false);
        }

        is_active
    }

    /// 读取最新的 guest output
    ///
    /// guest output 为空白时返回 None
    pub fn capture_guest_output(&self) -> Option<RawImage> {
        let consumed = self.mailbox.consume();
        consumed.mailbox_index()?;
        self.backend.capture_guest_output(&consumed)
    }
}

// UI 线程：配置以及 UI drawer
impl<B: PresenterBackend> Presenter<B> {
    /// 可以重复调用，只有可见的变化才会请求重绘
    pub fn set_guest_output_paint_config(&self, new_config: &GuestOutputPaintConfig) {
        let request_repaint = {
            let mut config = self.paint_config.lock().unwrap_or_else(|e| e.into_inner());
            let new_effect = new_config.effect();

            let mut modified = false;
            let mut request_repaint = false;
            if config.effect() != new_effect {
                modified = true;
                request_repaint = true;
            }
            if config.fsr_sharpness_reduction() != new_config.fsr_sharpness_reduction() {
                modified = true;
                request_repaint |= new_effect == Effect::Fsr;
            }
            if config.fsr_max_upsampling_passes() != new_config.fsr_max_upsampling_passes() {
                modified = true;
                request_repaint |= new_effect == Effect::Fsr;
            }
            if config.cas_additional_sharpness() != new_config.cas_additional_sharpness() {
                modified = true;
                request_repaint |= matches!(new_effect, Effect::Cas | Effect::Fsr);
            }
            if config.dither() != new_config.dither() {
                modified = true;
                request_repaint = true;
            }
            if config.allow_overscan_cutoff() != new_config.allow_overscan_cutoff() {
                modified = true;
                request_repaint = true;
            }

            if modified {
                *config = new_config.clone();
            }
            request_repaint
        };

        if request_repaint && self.paint_mode() != PaintMode::None {
            let mut ui = self.lock_ui();
            if ui.in_paint {
                // 例如在 UI drawer 中调用
                ui.request_guest_output_paint_after_current = true;
            } else {
                drop(ui);
                self.request_paint_or_connection_recovery();
            }
        }
    }

    /// 添加 UI drawer，已经添加过时修改其 z-order
    pub fn add_ui_drawer(&self, drawer: Arc<dyn UiDrawer>, z_order: usize) {
        let change = self.lock_ui().drawers.add(drawer, z_order);
        if change.changed {
            self.handle_ui_drawers_change(change.was_empty);
        }
    }

    pub fn remove_ui_drawer(&self, drawer: &Arc<dyn UiDrawer>) {
        let change = self.lock_ui().drawers.remove(drawer);
        if change.changed {
            self.handle_ui_drawers_change(change.was_empty);
        }
    }

    /// 请求下一帧绘制 UI，通常由 UI drawer 在需要动画时调用
    pub fn request_ui_paint_from_ui_thread(&self) {
        {
            let mut ui = self.lock_ui();
            if ui.in_paint {
                // 在绘制结束时根据实际状态统一处理
                ui.request_ui_paint_after_current = true;
                return;
            }
            if ui.drawers.is_empty() {
                return;
            }
        }
        if self.paint_mode() != PaintMode::None {
            self.request_window_paint();
        }
    }
}

// tools
impl<B: PresenterBackend> Presenter<B> {
    #[inline]
    fn lock_paint(&self) -> MutexGuard<'_, PaintConnection> {
        self.paint.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[inline]
    fn lock_ui(&self) -> MutexGuard<'_, UiThreadState> {
        self.ui.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 需要持有 paint 锁，参数只用于证明这一点
    #[inline]
    fn set_paint_mode(&self, _paint: &PaintConnection, new_mode: PaintMode) {
        self.paint_mode.store(new_mode.as_u8(), Ordering::Release);
    }

    fn desired_paint_mode_locked(&self, paint: &PaintConnection, is_paintable: bool) -> PaintMode {
        if !is_paintable {
            return PaintMode::None;
        }
        if !self.cvars.host_present_from_non_ui_thread {
            return PaintMode::UiThreadOnRequest;
        }
        // 不要让生成 guest output 的线程等待垂直同步
        if paint.has_implicit_vsync {
            return PaintMode::UiThreadOnRequest;
        }
        // UI 只能在 UI 线程绘制
        if !self.lock_ui().drawers.is_empty() {
            return PaintMode::UiThreadOnRequest;
        }
        PaintMode::GuestOutputThreadImmediately
    }

    fn disconnect_paint_connection(&self, paint: &mut PaintConnection, new_state: PaintConnectionState) {
        debug_assert!(!new_state.is_connected());
        if paint.state.is_connected() {
            self.backend.disconnect_paint_connection();
        }
        paint.state = new_state;
        paint.has_implicit_vsync = false;
        paint.surface_width = 0;
        paint.surface_height = 0;
    }

    /// 根据 surface 的当前状态建立或者更新连接
    ///
    /// # return
    /// 是否需要重新绘制
    fn update_surface_paint_connection(&self, paint: &mut PaintConnection, update_paint_mode_to_desired: bool) -> bool {
        debug_assert_ne!(self.paint_mode(), PaintMode::GuestOutputThreadImmediately);

        let mut repaint_needed = false;

        // 后端报告过 surface 不可用时，不再重试
        if paint.state != PaintConnectionState::ReportedUnusable {
            let surface_size = paint.surface.as_ref().and_then(|surface| surface.size());
            match (paint.surface.clone(), surface_size) {
                (Some(surface), Some((surface_width, surface_height))) if surface_width != 0 && surface_height != 0 => {
                    let is_reconnect = paint.state.is_connected();
                    let (connect_result, is_vsync_implicit) = self.backend.connect_or_reconnect_paint_connection(
                        surface.as_ref(),
                        surface_width,
                        surface_height,
                        paint.state == PaintConnectionState::Paintable,
                    );
                    match connect_result {
                        SurfacePaintConnectResult::Success | SurfacePaintConnectResult::SuccessUnchanged => {
                            if connect_result == SurfacePaintConnectResult::Success || !is_reconnect {
                                repaint_needed = true;
                            }
                            paint.was_optimal_at_successful_paint = false;
                            paint.state = PaintConnectionState::Paintable;
                            paint.has_implicit_vsync = is_vsync_implicit;
                            paint.surface_width = surface_width;
                            paint.surface_height = surface_height;
                        }
                        SurfacePaintConnectResult::Failure => {
                            log::warn!("Presenter: failed to connect to the surface, retrying at the next state change");
                            paint.state = PaintConnectionState::RetryAtStateChange;
                        }
                        SurfacePaintConnectResult::FailureSurfaceUnusable => {
                            log::error!("Presenter: the surface is unusable for presentation");
                            paint.state = PaintConnectionState::ReportedUnusable;
                        }
                    }
                }
                // 面积为 0（例如最小化），在尺寸变化时重试
                _ => self.disconnect_paint_connection(paint, PaintConnectionState::RetryAtStateChange),
            }
        }

        if update_paint_mode_to_desired {
            let desired = self.desired_paint_mode_locked(paint, paint.state == PaintConnectionState::Paintable);
            self.set_paint_mode(paint, desired);
        }

        repaint_needed
    }

    /// 请求 UI 线程绘制或者恢复连接，已经请求过时不重复请求
    fn request_paint_or_connection_recovery(&self) -> bool {
        let Some(window) = self.window.lock().unwrap_or_else(|e| e.into_inner()).clone() else {
            return false;
        };
        if self.ui_thread_paint_requested.swap(true, Ordering::Relaxed) {
            return false;
        }
        window.request_paint();
        true
    }

    fn request_window_paint(&self) {
        let window = self.window.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(window) = window {
            window.request_paint();
        }
    }

    fn paint_and_present(&self, paint: &mut PaintConnection, execute_ui: bool) -> PaintResult {
        debug_assert_eq!(paint.state, PaintConnectionState::Paintable);

        let execute_ui_drawers: &dyn Fn(&dyn UiDrawContext) = &|ctx| self.execute_ui_drawers(ctx);
        let frame = PaintFrameContext {
            mailbox: &self.mailbox,
            paint_config: &self.paint_config,
            cvars: &self.cvars,
            surface_width: paint.surface_width,
            surface_height: paint.surface_height,
            ui_drawers: execute_ui.then_some(execute_ui_drawers),
        };
        let result = self.backend.paint_and_present_impl(&frame);

        match result {
            PaintResult::Presented => {
                paint.was_optimal_at_successful_paint = true;
            }
            PaintResult::PresentedSuboptimal => {
                // 一开始就是 suboptimal 时不视为过期
                if paint.was_optimal_at_successful_paint {
                    paint.state = PaintConnectionState::Outdated;
                }
            }
            PaintResult::NotPresentedConnectionOutdated => {
                paint.state = PaintConnectionState::Outdated;
            }
            _ => {}
        }
        result
    }

    /// 由后端在绘制 UI 时调用，drawer 可以在绘制过程中增删 drawer
    fn execute_ui_drawers(&self, ctx: &dyn UiDrawContext) {
        {
            let mut ui = self.lock_ui();
            debug_assert!(ui.in_paint);
            ui.drawers.begin_execute();
        }
        loop {
            let drawer = self.lock_ui().drawers.next_drawer();
            let Some(drawer) = drawer else {
                break;
            };
            drawer.draw(ctx);
        }
        self.lock_ui().drawers.end_execute();
    }

    fn handle_ui_drawers_change(&self, drawers_were_empty: bool) {
        let drawers_empty = {
            let mut ui = self.lock_ui();
            if ui.in_paint {
                // 推迟到绘制结束
                if !ui.drawers.is_empty() {
                    ui.request_ui_paint_after_current = true;
                }
                return;
            }
            ui.drawers.is_empty()
        };

        if self.paint_mode() == PaintMode::None {
            return;
        }

        if drawers_empty != drawers_were_empty {
            let paint = self.lock_paint();
            if self.paint_mode() != PaintMode::None {
                let desired = self.desired_paint_mode_locked(&paint, true);
                self.set_paint_mode(&paint, desired);
            }
        }

        // 隐藏 UI 时也需要立即绘制一帧没有 UI 的画面
        self.request_window_paint();
    }

    fn report_gpu_loss(&self, paint_result: PaintResult, statically_from_ui_thread: bool) {
        let is_responsible = match paint_result {
            PaintResult::GpuLostResponsible => true,
            PaintResult::GpuLostExternally => false,
            _ => return,
        };
        log::error!("Presenter: graphics device lost ({:?})", paint_result);
        if let Some(callback) = &self.host_gpu_loss_callback {
            callback(is_responsible, statically_from_ui_thread);
        }
    }
}

impl<B: PresenterBackend> Drop for Presenter<B> {
    fn drop(&mut self) {
        let paint = self.paint.get_mut().unwrap_or_else(|e| e.into_inner());
        if paint.state.is_connected() {
            self.backend.disconnect_paint_connection();
            paint.state = PaintConnectionState::RetryAtStateChange;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use raw_window_handle::{HandleError, RawDisplayHandle, RawWindowHandle};

    use super::*;
    use crate::guest_output::GuestOutputRefresher;
    use crate::mailbox::ConsumedGuestOutput;

    #[derive(Default)]
    struct MockBackendState {
        connect_results: VecDeque<SurfacePaintConnectResult>,
        paint_results: VecDeque<PaintResult>,
        implicit_vsync: bool,

        connect_count: usize,
        disconnect_count: usize,
        paint_count: usize,
        ui_paint_count: usize,
        refresh_count: usize,
        last_consumed: Option<usize>,
        last_surface_size: (u32, u32),
    }

    #[derive(Default)]
    struct MockBackend {
        state: Arc<Mutex<MockBackendState>>,
    }

    impl MockBackend {
        fn state(&self) -> MutexGuard<'_, MockBackendState> {
            self.state.lock().unwrap()
        }
    }

    struct MockDrawContext;
    impl UiDrawContext for MockDrawContext {
        fn render_target_width(&self) -> u32 {
            640
        }
        fn render_target_height(&self) -> u32 {
            480
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct MockRefreshContext {
        is_8bpc: bool,
    }
    impl GuestOutputRefreshContext for MockRefreshContext {
        fn set_is_8bpc(&mut self, is_8bpc: bool) {
            self.is_8bpc = is_8bpc;
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    impl PresenterBackend for MockBackend {
        fn connect_or_reconnect_paint_connection(
            &self,
            _surface: &dyn PresenterSurface,
            _surface_width: u32,
            _surface_height: u32,
            was_paintable: bool,
        ) -> (SurfacePaintConnectResult, bool) {
            let mut state = self.state();
            state.connect_count += 1;
            let default = if was_paintable {
                SurfacePaintConnectResult::SuccessUnchanged
            } else {
                SurfacePaintConnectResult::Success
            };
            let result = state.connect_results.pop_front().unwrap_or(default);
            (result, state.implicit_vsync)
        }

        fn disconnect_paint_connection(&self) {
            self.state().disconnect_count += 1;
        }

        fn paint_and_present_impl(&self, frame: &PaintFrameContext<'_>) -> PaintResult {
            {
                let (consumed, _config) = frame.consume_guest_output();
                let mut state = self.state();
                state.paint_count += 1;
                state.last_consumed = consumed.mailbox_index();
                state.last_surface_size = frame.surface_size();
            }
            if frame.execute_ui() {
                self.state().ui_paint_count += 1;
                frame.execute_ui_drawers(&MockDrawContext);
            }
            self.state().paint_results.pop_front().unwrap_or(PaintResult::Presented)
        }

        fn refresh_guest_output_impl(
            &self,
            _mailbox_index: usize,
            _frontbuffer_width: u32,
            _frontbuffer_height: u32,
            is_8bpc: &mut bool,
            refresher: GuestOutputRefresher<'_>,
        ) -> bool {
            self.state().refresh_count += 1;
            let mut ctx = MockRefreshContext { is_8bpc: false };
            let result = refresher(&mut ctx);
            *is_8bpc = ctx.is_8bpc;
            result
        }

        fn capture_guest_output(&self, consumed: &ConsumedGuestOutput<'_>) -> Option<RawImage> {
            let props = consumed.properties();
            Some(RawImage {
                width: props.frontbuffer_width,
                height: props.frontbuffer_height,
                stride: props.frontbuffer_width as usize * 4,
                data: vec![0; (props.frontbuffer_width * props.frontbuffer_height * 4) as usize],
            })
        }
    }

    struct MockSurface {
        size: Mutex<Option<(u32, u32)>>,
    }
    impl MockSurface {
        fn new(size: Option<(u32, u32)>) -> Arc<Self> {
            Arc::new(Self { size: Mutex::new(size) })
        }
        fn resize(&self, size: Option<(u32, u32)>) {
            *self.size.lock().unwrap() = size;
        }
    }
    impl PresenterSurface for MockSurface {
        fn size(&self) -> Option<(u32, u32)> {
            *self.size.lock().unwrap()
        }
        fn raw_window_handle(&self) -> Result<RawWindowHandle, HandleError> {
            Err(HandleError::Unavailable)
        }
        fn raw_display_handle(&self) -> Result<RawDisplayHandle, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    #[derive(Default)]
    struct MockWindow {
        paint_requests: AtomicUsize,
    }
    impl MockWindow {
        fn requests(&self) -> usize {
            self.paint_requests.load(Ordering::SeqCst)
        }
    }
    impl PresenterWindow for MockWindow {
        fn request_paint(&self) {
            self.paint_requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        presenter: Arc<Presenter<MockBackend>>,
        window: Arc<MockWindow>,
        surface: Arc<MockSurface>,
    }

    fn fixture_with(backend: MockBackend, cvars: PresenterCvars, callback: Option<HostGpuLossCallback>) -> Fixture {
        let presenter = Arc::new(Presenter::new(backend, cvars, callback));
        let window = Arc::new(MockWindow::default());
        let surface = MockSurface::new(Some((1280, 720)));
        presenter.set_window_surface(Some(window.clone()), Some(surface.clone()));
        Fixture {
            presenter,
            window,
            surface,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockBackend::default(), PresenterCvars::default(), None)
    }

    fn refresh(presenter: &Presenter<MockBackend>) -> bool {
        presenter.refresh_guest_output(1280, 720, 16, 9, |ctx| {
            ctx.set_is_8bpc(true);
            true
        })
    }

    struct CountingDrawer {
        draws: AtomicUsize,
    }
    impl UiDrawer for CountingDrawer {
        fn draw(&self, ctx: &dyn UiDrawContext) {
            assert_eq!(ctx.render_target_width(), 640);
            self.draws.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_connect_goes_immediate() {
        let f = fixture();
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::Paintable);
        assert_eq!(f.presenter.paint_mode(), PaintMode::GuestOutputThreadImmediately);
        // 新连接需要尽快绘制
        assert_eq!(f.window.requests(), 1);

        assert!(refresh(&f.presenter));
        let state = f.presenter.backend().state();
        assert_eq!(state.paint_count, 1);
        assert_eq!(state.refresh_count, 1);
        assert!(state.last_consumed.is_some());
        assert_eq!(state.last_surface_size, (1280, 720));
    }

    #[test]
    fn test_setting_same_window_surface_is_noop() {
        let f = fixture();
        f.presenter.set_window_surface(Some(f.window.clone()), Some(f.surface.clone()));
        assert_eq!(f.presenter.backend().state().connect_count, 1);
        assert_eq!(f.presenter.backend().state().disconnect_count, 0);

        f.presenter.set_window_surface(None, None);
        assert_eq!(f.presenter.paint_mode(), PaintMode::None);
        assert_eq!(f.presenter.backend().state().disconnect_count, 1);
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::RetryAtStateChange);
    }

    #[test]
    fn test_implicit_vsync_paints_on_ui_thread() {
        let backend = MockBackend::default();
        backend.state().implicit_vsync = true;
        let f = fixture_with(backend, PresenterCvars::default(), None);
        assert_eq!(f.presenter.paint_mode(), PaintMode::UiThreadOnRequest);

        // 连接时的请求尚未被处理，不重复请求
        assert!(refresh(&f.presenter));
        assert_eq!(f.window.requests(), 1);
        assert_eq!(f.presenter.backend().state().paint_count, 0);

        f.presenter.paint_from_ui_thread(false);
        assert_eq!(f.presenter.backend().state().paint_count, 1);

        assert!(refresh(&f.presenter));
        assert_eq!(f.window.requests(), 2);
    }

    #[test]
    fn test_no_present_from_non_ui_thread() {
        let cvars = PresenterCvars {
            host_present_from_non_ui_thread: false,
            ..Default::default()
        };
        let f = fixture_with(MockBackend::default(), cvars, None);
        assert_eq!(f.presenter.paint_mode(), PaintMode::UiThreadOnRequest);
        assert_eq!(f.presenter.desired_paint_mode(true), PaintMode::UiThreadOnRequest);
        assert_eq!(f.presenter.desired_paint_mode(false), PaintMode::None);
    }

    #[test]
    fn test_zero_area_surface_retries_on_resize() {
        let f = fixture();
        f.surface.resize(Some((0, 720)));
        f.presenter.on_surface_resize();
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::RetryAtStateChange);
        assert_eq!(f.presenter.paint_mode(), PaintMode::None);
        assert_eq!(f.presenter.backend().state().disconnect_count, 1);

        // 没有连接时刷新不会绘制
        assert!(refresh(&f.presenter));
        assert_eq!(f.presenter.backend().state().paint_count, 0);

        f.surface.resize(Some((800, 600)));
        f.presenter.on_surface_resize();
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::Paintable);
        assert_eq!(f.presenter.paint_mode(), PaintMode::GuestOutputThreadImmediately);
    }

    #[test]
    fn test_unusable_surface_is_not_retried() {
        let backend = MockBackend::default();
        backend
            .state()
            .connect_results
            .push_back(SurfacePaintConnectResult::FailureSurfaceUnusable);
        let f = fixture_with(backend, PresenterCvars::default(), None);
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::ReportedUnusable);
        assert_eq!(f.presenter.paint_mode(), PaintMode::None);
        assert_eq!(f.window.requests(), 0);

        f.presenter.on_surface_resize();
        assert_eq!(f.presenter.backend().state().connect_count, 1);
    }

    #[test]
    fn test_resize_unchanged_does_not_repaint() {
        let f = fixture();
        f.presenter.paint_from_ui_thread(false);
        let requests = f.window.requests();

        // 重新连接的结果为 SuccessUnchanged
        f.presenter.on_surface_resize();
        assert_eq!(f.window.requests(), requests);
        assert_eq!(f.presenter.paint_mode(), PaintMode::GuestOutputThreadImmediately);
    }

    #[test]
    fn test_outdated_connection_recovers() {
        let f = fixture();
        f.presenter.paint_from_ui_thread(false);
        f.presenter
            .backend()
            .state()
            .paint_results
            .push_back(PaintResult::NotPresentedConnectionOutdated);

        // guest output 线程发现过期后请求 UI 线程恢复
        assert!(refresh(&f.presenter));
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::Outdated);
        let requests = f.window.requests();
        assert!(requests >= 2);

        f.presenter.paint_from_ui_thread(false);
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::Paintable);
        assert_eq!(f.presenter.backend().state().connect_count, 2);
        assert_eq!(f.presenter.paint_mode(), PaintMode::GuestOutputThreadImmediately);
    }

    #[test]
    fn test_suboptimal_outdates_only_after_optimal() {
        let f = fixture();
        f.presenter
            .backend()
            .state()
            .paint_results
            .extend([PaintResult::PresentedSuboptimal, PaintResult::Presented, PaintResult::PresentedSuboptimal]);

        f.presenter.paint_from_ui_thread(true);
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::Paintable);
        f.presenter.paint_from_ui_thread(true);
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::Paintable);
        f.presenter.paint_from_ui_thread(true);
        assert_eq!(f.presenter.paint_connection_state(), PaintConnectionState::Outdated);
        assert_eq!(f.presenter.paint_mode(), PaintMode::None);
    }

    #[test]
    fn test_ui_drawers_take_painting() {
        let f = fixture();
        let drawer = Arc::new(CountingDrawer {
            draws: AtomicUsize::new(0),
        });
        let drawer_dyn: Arc<dyn UiDrawer> = drawer.clone();

        let requests = f.window.requests();
        f.presenter.add_ui_drawer(drawer_dyn.clone(), 0);
        assert_eq!(f.presenter.paint_mode(), PaintMode::UiThreadOnRequest);
        assert_eq!(f.window.requests(), requests + 1);

        f.presenter.paint_from_ui_thread(false);
        assert_eq!(drawer.draws.load(Ordering::SeqCst), 1);
        assert_eq!(f.presenter.backend().state().ui_paint_count, 1);
        assert_eq!(f.presenter.paint_mode(), PaintMode::UiThreadOnRequest);

        // 移除最后一个 drawer 后交还给 guest output 线程
        f.presenter.remove_ui_drawer(&drawer_dyn);
        assert_eq!(f.presenter.paint_mode(), PaintMode::GuestOutputThreadImmediately);
    }

    /// 绘制时修改 Presenter 的 drawer
    struct ReentrantDrawer {
        presenter: Arc<Presenter<MockBackend>>,
        other: Arc<dyn UiDrawer>,
        draws: AtomicUsize,
    }
    impl UiDrawer for ReentrantDrawer {
        fn draw(&self, _ctx: &dyn UiDrawContext) {
            self.draws.fetch_add(1, Ordering::SeqCst);
            self.presenter.add_ui_drawer(self.other.clone(), 1);
            self.presenter.request_ui_paint_from_ui_thread();
            let mut config = self.presenter.guest_output_paint_config();
            config.set_dither(!config.dither());
            self.presenter.set_guest_output_paint_config(&config);
        }
    }

    #[test]
    fn test_drawer_changes_during_paint_are_deferred() {
        let f = fixture();
        let other = Arc::new(CountingDrawer {
            draws: AtomicUsize::new(0),
        });
        let reentrant: Arc<dyn UiDrawer> = Arc::new(ReentrantDrawer {
            presenter: f.presenter.clone(),
            other: other.clone(),
            draws: AtomicUsize::new(0),
        });
        f.presenter.add_ui_drawer(reentrant.clone(), 0);
        f.presenter.paint_from_ui_thread(false);
        let requests_after_paint = f.window.requests();

        // 新的 drawer 在同一周期内也会被绘制
        assert_eq!(other.draws.load(Ordering::SeqCst), 1);
        assert_eq!(f.presenter.paint_mode(), PaintMode::UiThreadOnRequest);
        assert!(f.presenter.guest_output_paint_config().dither());

        // 推迟的请求在绘制结束时发出
        f.presenter.paint_from_ui_thread(false);
        assert!(f.window.requests() > requests_after_paint);

        // 打破 Arc 的循环引用
        f.presenter.remove_ui_drawer(&reentrant);
    }

    #[test]
    fn test_paint_config_repaint_rules() {
        let f = fixture();
        f.presenter.paint_from_ui_thread(false);
        let requests = f.window.requests();

        // bilinear 时 CAS 的锐度不可见，只保存
        let mut config = GuestOutputPaintConfig::default();
        config.set_cas_additional_sharpness(0.5);
        f.presenter.set_guest_output_paint_config(&config);
        assert_eq!(f.window.requests(), requests);
        assert_eq!(f.presenter.guest_output_paint_config().cas_additional_sharpness(), 0.5);

        config.set_effect(Effect::Cas);
        f.presenter.set_guest_output_paint_config(&config);
        assert_eq!(f.window.requests(), requests + 1);

        // 相同的配置不请求
        f.presenter.paint_from_ui_thread(false);
        f.presenter.set_guest_output_paint_config(&config);
        assert_eq!(f.window.requests(), requests + 1);
    }

    #[test]
    fn test_gpu_loss_callback() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let callback: HostGpuLossCallback = {
            let calls = calls.clone();
            Box::new(move |is_responsible, from_ui_thread| {
                calls.lock().unwrap().push((is_responsible, from_ui_thread));
            })
        };
        let f = fixture_with(MockBackend::default(), PresenterCvars::default(), Some(callback));

        f.presenter
            .backend()
            .state()
            .paint_results
            .extend([PaintResult::GpuLostExternally, PaintResult::GpuLostResponsible]);
        assert!(refresh(&f.presenter));
        f.presenter.paint_from_ui_thread(true);

        assert_eq!(*calls.lock().unwrap(), vec![(false, false), (true, true)]);
    }

    #[test]
    fn test_inactive_guest_output() {
        let f = fixture();
        assert!(f.presenter.capture_guest_output().is_none());
        assert!(!f.presenter.refresh_guest_output(0, 0, 16, 9, |_| true));

        assert!(refresh(&f.presenter));
        let image = f.presenter.capture_guest_output().unwrap();
        assert_eq!((image.width, image.height, image.stride), (1280, 720, 1280 * 4));

        // 变为空白时发布一次
        assert!(!f.presenter.refresh_guest_output(0, 0, 16, 9, |_| true));
        assert!(f.presenter.capture_guest_output().is_none());
    }

    #[test]
    fn test_failed_refresh_does_not_paint() {
        let f = fixture();
        assert!(!f.presenter.refresh_guest_output(1280, 720, 16, 9, |_| false));
        assert_eq!(f.presenter.backend().state().paint_count, 0);
    }

    #[test]
    fn test_drop_disconnects() {
        let backend = MockBackend::default();
        let state = backend.state.clone();
        let f = fixture_with(backend, PresenterCvars::default(), None);
        assert_eq!(state.lock().unwrap().disconnect_count, 0);

        drop(f);
        assert_eq!(state.lock().unwrap().disconnect_count, 1);
    }
}
