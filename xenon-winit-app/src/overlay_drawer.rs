//! 在 guest output 之上绘制的指示条，颜色表示当前的 effect

use std::sync::Mutex;

use ash::vk;

use xenon_presenter::{
    paint_config::Effect,
    ui_drawer::{UiDrawContext, UiDrawer},
};
use xenon_presenter_vulkan::ui_draw_context::VulkanUiDrawContext;

const INDICATOR_MARGIN: u32 = 8;
const INDICATOR_HEIGHT: u32 = 8;
const INDICATOR_MIN_WIDTH: u32 = 16;

pub struct EffectIndicatorDrawer {
    effect: Mutex<Effect>,
}

impl EffectIndicatorDrawer {
    pub fn new(effect: Effect) -> Self {
        Self {
            effect: Mutex::new(effect),
        }
    }

    pub fn set_effect(&self, effect: Effect) {
        *self.effect.lock().unwrap_or_else(|e| e.into_inner()) = effect;
    }

    pub fn effect(&self) -> Effect {
        *self.effect.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn effect_color(effect: Effect) -> [f32; 4] {
        match effect {
            Effect::Bilinear => [0.8, 0.8, 0.8, 1.0],
            Effect::Cas => [0.2, 0.6, 1.0, 1.0],
            Effect::Fsr => [1.0, 0.3, 0.1, 1.0],
        }
    }

    /// 左上角的指示条，宽度为 render target 的 1/8
    ///
    /// render target 放不下时返回 None
    pub fn indicator_rect(rt_width: u32, rt_height: u32) -> Option<vk::Rect2D> {
        let width = (rt_width / 8).max(INDICATOR_MIN_WIDTH);
        if INDICATOR_MARGIN + width > rt_width || INDICATOR_MARGIN + INDICATOR_HEIGHT > rt_height {
            return None;
        }
        Some(vk::Rect2D {
            offset: vk::Offset2D {
                x: INDICATOR_MARGIN as i32,
                y: INDICATOR_MARGIN as i32,
            },
            extent: vk::Extent2D {
                width,
                height: INDICATOR_HEIGHT,
            },
        })
    }
}

impl UiDrawer for EffectIndicatorDrawer {
    fn draw(&self, ctx: &dyn UiDrawContext) {
        let Some(vk_ctx) = ctx.as_any().downcast_ref::<VulkanUiDrawContext>() else {
            return;
        };
        let Some(rect) = Self::indicator_rect(ctx.render_target_width(), ctx.render_target_height()) else {
            return;
        };

        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: Self::effect_color(self.effect()),
                },
            },
        };
        let clear_rect = vk::ClearRect {
            rect,
            base_array_layer: 0,
            layer_count: 1,
        };
        vk_ctx.command_buffer().cmd_clear_attachments(&[attachment], &[clear_rect]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_rect() {
        let rect = EffectIndicatorDrawer::indicator_rect(1280, 720).unwrap();
        assert_eq!(rect.offset.x, 8);
        assert_eq!(rect.extent.width, 160);
        assert_eq!(rect.extent.height, 8);

        // 最小宽度
        let rect = EffectIndicatorDrawer::indicator_rect(64, 64).unwrap();
        assert_eq!(rect.extent.width, 16);

        assert!(EffectIndicatorDrawer::indicator_rect(20, 720).is_none());
        assert!(EffectIndicatorDrawer::indicator_rect(1280, 10).is_none());
    }

    #[test]
    fn test_set_effect() {
        let drawer = EffectIndicatorDrawer::new(Effect::Bilinear);
        drawer.set_effect(Effect::Fsr);
        assert_eq!(drawer.effect(), Effect::Fsr);
        assert_ne!(
            EffectIndicatorDrawer::effect_color(Effect::Cas),
            EffectIndicatorDrawer::effect_color(Effect::Fsr)
        );
    }
}
