//! Presenter 与图形 API 后端之间的接口

use std::sync::Mutex;

use raw_window_handle::{HandleError, RawDisplayHandle, RawWindowHandle};

use crate::{
    config::PresenterCvars,
    guest_output::{GuestOutputProperties, GuestOutputRefresher, RawImage},
    mailbox::{ConsumedGuestOutput, GuestOutputMailbox},
    paint_config::GuestOutputPaintConfig,
    paint_flow::{GuestOutputPaintFlow, PaintFlowTarget, get_guest_output_paint_flow},
    ui_drawer::UiDrawContext,
};

/// 一次绘制的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintResult {
    Presented,
    /// 已经显示，但是 surface 的状态不是最优的，需要在合适的时候重新连接
    PresentedSuboptimal,
    NotPresented,
    /// surface 发生了变化，需要重新连接
    NotPresentedConnectionOutdated,
    /// 设备由于外部原因丢失
    GpuLostExternally,
    /// 设备由于 presenter 自身丢失
    GpuLostResponsible,
}

impl PaintResult {
    #[inline]
    pub fn is_gpu_lost(self) -> bool {
        matches!(self, Self::GpuLostExternally | Self::GpuLostResponsible)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePaintConnectResult {
    /// 新建或者重建了连接，需要重新绘制
    Success,
    /// 已有的连接仍然可用，不需要重新绘制
    SuccessUnchanged,
    /// 暂时失败，在 surface 状态变化时重试
    Failure,
    /// 该 surface 永远无法用于绘制
    FailureSurfaceUnusable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaintConnectionState {
    /// 没有连接，在 surface 状态变化（例如尺寸变化）时重试
    #[default]
    RetryAtStateChange,
    /// surface 不可用，已经报告过，不再重试
    ReportedUnusable,
    Paintable,
    /// 连接已经过期，下一次绘制之前需要重新连接
    Outdated,
}

impl PaintConnectionState {
    #[inline]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Paintable | Self::Outdated)
    }
}

/// 由哪个线程绘制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PaintMode {
    /// 不绘制
    #[default]
    None,
    /// 由 UI 线程在收到绘制请求时绘制
    UiThreadOnRequest,
    /// guest output 线程在刷新之后立即绘制
    GuestOutputThreadImmediately,
}

impl PaintMode {
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::UiThreadOnRequest,
            2 => Self::GuestOutputThreadImmediately,
            _ => Self::None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 可以绘制的目标，通常是窗口的客户区
pub trait PresenterSurface: Send + Sync {
    /// 当前的尺寸，None 表示无法获取（例如窗口已经销毁）
    fn size(&self) -> Option<(u32, u32)>;

    fn raw_window_handle(&self) -> Result<RawWindowHandle, HandleError>;
    fn raw_display_handle(&self) -> Result<RawDisplayHandle, HandleError>;
}

/// 拥有 surface 的窗口
pub trait PresenterWindow: Send + Sync {
    /// 请求 UI 线程在合适的时候调用 `Presenter::paint_from_ui_thread`
    ///
    /// 可以在任意线程调用
    fn request_paint(&self);
}

/// 一次绘制需要的上下文，由 Presenter 提供给后端
pub struct PaintFrameContext<'a> {
    pub(crate) mailbox: &'a GuestOutputMailbox,
    pub(crate) paint_config: &'a Mutex<GuestOutputPaintConfig>,
    pub(crate) cvars: &'a PresenterCvars,

    pub(crate) surface_width: u32,
    pub(crate) surface_height: u32,

    pub(crate) ui_drawers: Option<&'a dyn Fn(&dyn UiDrawContext)>,
}

// getters
impl<'a> PaintFrameContext<'a> {
    #[inline]
    pub fn cvars(&self) -> &'a PresenterCvars {
        self.cvars
    }

    #[inline]
    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_width, self.surface_height)
    }

    /// 是否需要绘制 UI
    #[inline]
    pub fn execute_ui(&self) -> bool {
        self.ui_drawers.is_some()
    }
}

// tools
impl<'a> PaintFrameContext<'a> {
    /// 获取最新的 guest output 以及当前的绘制配置
    ///
    /// 在 guest output 图像的命令录制完成之前需要持有返回的 `ConsumedGuestOutput`；
    /// 在绘制 UI 之前需要将其释放，UI drawer 可能会修改绘制配置
    pub fn consume_guest_output(&self) -> (ConsumedGuestOutput<'a>, GuestOutputPaintConfig) {
        let config = self.paint_config.lock().unwrap_or_else(|e| e.into_inner()).clone();
        (self.mailbox.consume(), config)
    }

    pub fn guest_output_paint_flow(
        &self,
        properties: &GuestOutputProperties,
        host_rt_width: u32,
        host_rt_height: u32,
        max_rt_width: u32,
        max_rt_height: u32,
        config: &GuestOutputPaintConfig,
    ) -> GuestOutputPaintFlow {
        let target = PaintFlowTarget {
            host_rt_width,
            host_rt_height,
            max_rt_width,
            max_rt_height,
            surface_width: self.surface_width,
            surface_height: self.surface_height,
        };
        get_guest_output_paint_flow(properties, &target, config, self.cvars)
    }

    /// 按照 z-order 执行所有的 UI drawer
    pub fn execute_ui_drawers(&self, ctx: &dyn UiDrawContext) {
        if let Some(ui_drawers) = self.ui_drawers {
            ui_drawers(ctx);
        }
    }
}

/// 图形 API 相关的实现
///
/// 所有的方法都由 Presenter 串行调用：连接相关以及绘制相关的方法在 paint 锁内调用，
/// guest output 的刷新由 mailbox 的生产者锁串行化
pub trait PresenterBackend: Send + Sync {
    /// 连接或者重新连接到 surface
    ///
    /// # param
    /// * was_paintable - 之前的连接是否可用，可用时可以尝试复用
    ///
    /// # return
    /// (连接结果, 是否隐式地开启了垂直同步)
    fn connect_or_reconnect_paint_connection(
        &self,
        surface: &dyn PresenterSurface,
        surface_width: u32,
        surface_height: u32,
        was_paintable: bool,
    ) -> (SurfacePaintConnectResult, bool);

    fn disconnect_paint_connection(&self);

    /// 绘制 guest output 以及 UI，并显示到 surface 上
    fn paint_and_present_impl(&self, frame: &PaintFrameContext<'_>) -> PaintResult;

    /// 将 refresher 的内容写入指定槽位的 guest output 图像
    ///
    /// # param
    /// * is_8bpc - 由 refresher 通过 context 设置
    ///
    /// # return
    /// 是否写入成功
    fn refresh_guest_output_impl(
        &self,
        mailbox_index: usize,
        frontbuffer_width: u32,
        frontbuffer_height: u32,
        is_8bpc: &mut bool,
        refresher: GuestOutputRefresher<'_>,
    ) -> bool;

    /// 读取 guest output 图像的内容
    fn capture_guest_output(&self, consumed: &ConsumedGuestOutput<'_>) -> Option<RawImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_mode_u8() {
        for mode in [PaintMode::None, PaintMode::UiThreadOnRequest, PaintMode::GuestOutputThreadImmediately] {
            assert_eq!(PaintMode::from_u8(mode.as_u8()), mode);
        }
        assert_eq!(PaintMode::from_u8(200), PaintMode::None);
    }

    #[test]
    fn test_connection_state() {
        assert!(PaintConnectionState::Paintable.is_connected());
        assert!(PaintConnectionState::Outdated.is_connected());
        assert!(!PaintConnectionState::RetryAtStateChange.is_connected());
        assert!(!PaintConnectionState::ReportedUnusable.is_connected());
        assert!(PaintResult::GpuLostExternally.is_gpu_lost());
        assert!(!PaintResult::NotPresented.is_gpu_lost());
    }
}
