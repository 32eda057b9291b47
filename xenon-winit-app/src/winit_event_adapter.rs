use winit::{
    event::{ElementState, KeyEvent, WindowEvent},
    keyboard::{Key, NamedKey},
};

use xenon_presenter::paint_config::Effect;

/// 演示程序响应的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoAction {
    SetEffect(Effect),
    ToggleDither,
    ToggleOverscanCutoff,
    CycleGuestResolution,
    ToggleOverlay,
    Capture,
    Exit,
}

pub struct WinitEventAdapter;

impl WinitEventAdapter {
    /// 只处理按下的按键，忽略按住时的重复事件
    pub fn to_demo_action(event: &WindowEvent) -> Option<DemoAction> {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return None;
        };
        Self::key_event_to_demo_action(event)
    }

    fn key_event_to_demo_action(event: &KeyEvent) -> Option<DemoAction> {
        if event.state != ElementState::Pressed || event.repeat {
            return None;
        }
        Self::key_to_demo_action(&event.logical_key)
    }

    pub fn key_to_demo_action(key: &Key) -> Option<DemoAction> {
        match key {
            Key::Named(NamedKey::Escape) => Some(DemoAction::Exit),
            Key::Character(c) => match c.to_ascii_lowercase().as_str() {
                "1" => Some(DemoAction::SetEffect(Effect::Bilinear)),
                "2" => Some(DemoAction::SetEffect(Effect::Cas)),
                "3" => Some(DemoAction::SetEffect(Effect::Fsr)),
                "d" => Some(DemoAction::ToggleDither),
                "o" => Some(DemoAction::ToggleOverscanCutoff),
                "r" => Some(DemoAction::CycleGuestResolution),
                "h" => Some(DemoAction::ToggleOverlay),
                "c" => Some(DemoAction::Capture),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_to_demo_action() {
        assert_eq!(
            WinitEventAdapter::key_to_demo_action(&Key::Character("3".into())),
            Some(DemoAction::SetEffect(Effect::Fsr))
        );
        assert_eq!(
            WinitEventAdapter::key_to_demo_action(&Key::Character("D".into())),
            Some(DemoAction::ToggleDither)
        );
        assert_eq!(
            WinitEventAdapter::key_to_demo_action(&Key::Named(NamedKey::Escape)),
            Some(DemoAction::Exit)
        );
        assert_eq!(WinitEventAdapter::key_to_demo_action(&Key::Character("x".into())), None);
        assert_eq!(WinitEventAdapter::key_to_demo_action(&Key::Named(NamedKey::Enter)), None);
    }
}
