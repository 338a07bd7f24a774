//! Validation layer messages routed into `log`.

use std::ffi::CStr;

use ash::vk;

use super::conversion::vk_error;
use crate::backend::BackendError;

/// Create a debug messenger that forwards validation output to the logger.
pub fn create_debug_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> Result<vk::DebugUtilsMessengerEXT, BackendError> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(forward_to_log));

    unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(|e| vk_error("vkCreateDebugUtilsMessengerEXT", e))
}

/// Log level for a messenger severity.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE) {
        log::Level::Debug
    } else {
        log::Level::Trace
    }
}

fn type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// Read a driver-owned C string, if present.
///
/// # Safety
/// `ptr` must be null or point to a null-terminated string valid for the call.
unsafe fn driver_str(ptr: *const std::ffi::c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

unsafe extern "system" fn forward_to_log(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let level = severity_level(severity);
    if !log::log_enabled!(target: "vulkan", level) {
        return vk::FALSE;
    }

    // SAFETY: the driver passes null or a pointer valid for the duration of the call
    let (id, message) = match unsafe { callback_data.as_ref() } {
        Some(data) => unsafe {
            (
                driver_str(data.p_message_id_name),
                driver_str(data.p_message),
            )
        },
        None => (None, None),
    };

    log::log!(
        target: "vulkan",
        level,
        "[{}] {}: {}",
        type_label(message_type),
        id.as_deref().unwrap_or("-"),
        message.as_deref().unwrap_or("(no message)")
    );

    // Never abort the call that triggered the message.
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(severity_level(S::ERROR), log::Level::Error);
        assert_eq!(severity_level(S::WARNING), log::Level::Warn);
        assert_eq!(severity_level(S::INFO), log::Level::Info);
        assert_eq!(severity_level(S::VERBOSE), log::Level::Debug);
        assert_eq!(severity_level(S::empty()), log::Level::Trace);
        assert_eq!(severity_level(S::ERROR | S::VERBOSE), log::Level::Error);
    }

    #[test]
    fn test_type_labels() {
        use vk::DebugUtilsMessageTypeFlagsEXT as T;
        assert_eq!(type_label(T::VALIDATION), "validation");
        assert_eq!(type_label(T::PERFORMANCE), "performance");
        assert_eq!(type_label(T::GENERAL), "general");
    }
}
