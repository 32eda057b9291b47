use std::ffi::CStr;

use anyhow::Context;
use ash::vk;

/// 将 validation layer 的消息转发到 `log`，需要在 instance 销毁之前 drop
pub struct GfxDebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl GfxDebugMessenger {
    pub fn new(vk_entry: &ash::Entry, instance: &ash::Instance) -> anyhow::Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(vk_entry, instance);
        let handle = unsafe { loader.create_debug_utils_messenger(&Self::debug_utils_messenger_ci(), None) }
            .context("failed to create debug messenger")?;
        Ok(Self { loader, handle })
    }
}

impl Drop for GfxDebugMessenger {
    fn drop(&mut self) {
        log::info!("destroying debug messenger");
        unsafe { self.loader.destroy_debug_utils_messenger(self.handle, None) };
    }
}

/// validation layer 的消息是 JSON 格式时，将 `MainMessage` 字段单独放在最后输出，
/// 其余字段格式化为多行的 JSON；否则原样输出
pub fn format_validation_message(message_type: vk::DebugUtilsMessageTypeFlagsEXT, msg: &str) -> String {
    let mut json_value = serde_json::from_str::<serde_json::Value>(msg).ok();
    let Some(obj) = json_value.as_mut().and_then(|v| v.as_object_mut()) else {
        return format!("[{:?}]\n{}\n", message_type, msg);
    };

    let main_msg = obj.remove("MainMessage");
    let main_msg = main_msg.as_ref().and_then(|value| value.as_str()).unwrap_or_default();
    let details = serde_json::to_string_pretty(obj).unwrap_or_else(|_| msg.to_string());
    format!("[{:?}]\n{}\n{}\n", message_type, details, main_msg)
}

/// debug messenger 的回调函数
/// # Safety
/// 由 vulkan loader 调用，`p_callback_data` 一定有效
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = unsafe { *p_callback_data };

    let message = match callback_data.p_message.is_null() {
        true => Default::default(),
        false => unsafe { CStr::from_ptr(callback_data.p_message) }.to_string_lossy(),
    };
    let format_msg = format_validation_message(message_type, &message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{}", format_msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{}", format_msg),
        _ => log::debug!("{}", format_msg),
    };

    vk::FALSE
}

impl GfxDebugMessenger {
    /// 也会被 chain 到 `InstanceCreateInfo` 上，用于输出 instance 创建以及销毁过程中的消息
    pub fn debug_utils_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_json_message() {
        let msg = r#"{"MainMessage": "vkCmdDraw: missing pipeline", "MessageID": 42}"#;
        let formatted = format_validation_message(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, msg);
        assert!(formatted.ends_with("vkCmdDraw: missing pipeline\n"));
        assert!(formatted.contains("\"MessageID\": 42"));
        assert_eq!(formatted.matches("MainMessage").count(), 0);
    }

    #[test]
    fn test_format_plain_message() {
        let formatted = format_validation_message(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL, "plain text");
        assert!(formatted.ends_with("plain text\n"));
    }
}
