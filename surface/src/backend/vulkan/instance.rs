//! Vulkan instance creation.

use std::ffi::{CStr, CString, c_char};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use super::conversion::vk_error;
use super::debug;
use crate::backend::BackendError;

/// MoltenVK tops out at 1.2 and nothing here needs more.
const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 2, 0);

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance plus the optional validation messenger.
pub struct CreatedInstance {
    pub instance: ash::Instance,
    pub debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

/// Create an instance able to present to windows on `display`.
///
/// Validation is enabled only if requested and the layer is installed.
pub fn create_instance(
    entry: &ash::Entry,
    application_name: &str,
    validation_enabled: bool,
    display: RawDisplayHandle,
) -> Result<CreatedInstance, BackendError> {
    let validation_available = validation_enabled && check_validation_layer_support(entry);
    if validation_enabled && !validation_available {
        log::warn!("Validation layers requested but not available");
    }

    let app_name = CString::new(application_name).map_err(|_| {
        BackendError::InvalidParameter(format!(
            "application name contains a NUL byte: {:?}",
            application_name
        ))
    })?;
    let engine_name = c"RedLilium Engine";

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
        .map_err(|e| vk_error("vkEnumerateInstanceExtensionProperties", e))?
        .to_vec();

    if validation_available {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
    }

    let layer_names: Vec<*const c_char> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    #[allow(unused_mut)]
    let mut create_flags = vk::InstanceCreateFlags::empty();

    #[cfg(target_os = "macos")]
    {
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        BackendError::InitializationFailed(format!("Failed to create Vulkan instance: {:?}", e))
    })?;

    let debug = if validation_available {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, &instance);
        match debug::create_debug_messenger(&debug_utils) {
            Ok(messenger) => Some((debug_utils, messenger)),
            Err(e) => {
                log::warn!("Validation enabled but the debug messenger failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(CreatedInstance { instance, debug })
}

fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let Ok(available_layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };

    available_layers.iter().any(|layer| {
        // SAFETY: layer_name is a null-terminated fixed-size array filled by the loader
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER_NAME
    })
}
