use std::ffi::CStr;

use ash::vk;

use crate::error::{GfxResult, VkResultExt};

/// 将 validation layer 的消息转发到 `log`
pub struct GfxDebugMsger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

// new & init
impl GfxDebugMsger {
    pub fn new(vk_entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(vk_entry, instance);

        let create_info = Self::debug_utils_messenger_ci();
        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .vk_check("vkCreateDebugUtilsMessengerEXT")?;

        Ok(Self { loader, messenger })
    }
}

// destroy
impl GfxDebugMsger {
    pub fn destroy(self) {
        log::info!("destroying debug messenger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

// 构造过程辅助函数
impl GfxDebugMsger {
    fn debug_msg_type() -> vk::DebugUtilsMessageTypeFlagsEXT {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
    }

    fn debug_msg_severity() -> vk::DebugUtilsMessageSeverityFlagsEXT {
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
    }

    /// 创建 instance 时也会挂上这个结构体，用于捕获 instance 创建和销毁过程中的消息
    pub fn debug_utils_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(Self::debug_msg_severity())
            .message_type(Self::debug_msg_type())
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

/// 将 validation layer 的 json 消息整理成便于阅读的格式
///
/// `MainMessage` 字段中有换行符，单独放在最后输出
fn format_validation_message(message_type: vk::DebugUtilsMessageTypeFlagsEXT, msg: &str) -> String {
    let mut json_value = serde_json::from_str::<serde_json::Value>(msg);
    let json_obj = json_value.as_mut().ok().and_then(|v| v.as_object_mut());

    match json_obj {
        Some(obj) => {
            let main_msg = obj.remove("MainMessage");
            let main_msg_str = main_msg.as_ref().and_then(|value| value.as_str()).unwrap_or_default();
            let total_msg_str = serde_json::to_string_pretty(&obj).unwrap_or_else(|_| msg.to_string());
            format!("[{:?}]\n{}\n{}\n", message_type, total_msg_str, main_msg_str)
        }
        None => format!("[{:?}]\n{}\n", message_type, msg),
    }
}

/// debug messenger 的回调函数
///
/// # Safety
/// 由 validation layer 调用，`p_callback_data` 保证有效
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = unsafe { *p_callback_data };

    let msg = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let format_msg = format_validation_message(message_type, msg.as_ref());
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{}", format_msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{}", format_msg),
        _ => log::info!("{}", format_msg),
    };

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

/// 可以设置 debug name 的 vulkan 对象
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_message_moved_to_tail() {
        let msg = r#"{"MessageID":"0x1234","MainMessage":"line one\nline two"}"#;
        let formatted = format_validation_message(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, msg);

        assert!(formatted.contains("\"MessageID\": \"0x1234\""));
        assert!(!formatted.contains("\"MainMessage\""));
        assert!(formatted.trim_end().ends_with("line one\nline two"));
    }

    #[test]
    fn test_plain_text_message_kept() {
        let formatted =
            format_validation_message(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL, "loader: layer not found");
        assert!(formatted.contains("loader: layer not found"));
    }
}
