//! Physical device inspection and logical device creation.

use std::ffi::CStr;

use ash::vk;

use super::conversion::{adapter_type_from_vk, vk_creation_error};
use crate::backend::{AdapterInfo, BackendError, QueueFamilyInfo};

/// Rank a physical device; higher is better. Discrete GPUs win.
pub fn score_physical_device(properties: &vk::PhysicalDeviceProperties) -> u32 {
    let mut score = 0;

    if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
        score += 100;
    }

    score + properties.limits.max_image_dimension2_d / 1024
}

/// Describe a physical device as seen through `surface`.
pub fn describe_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    index: usize,
    surface: vk::SurfaceKHR,
) -> AdapterInfo {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    // SAFETY: device_name is a null-terminated fixed-size array filled by the driver
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    let queue_families = families
        .iter()
        .enumerate()
        .map(|(family_index, family)| {
            let family_index = family_index as u32;
            let present = unsafe {
                surface_loader.get_physical_device_surface_support(
                    physical_device,
                    family_index,
                    surface,
                )
            }
            .unwrap_or(false);
            QueueFamilyInfo {
                index: family_index,
                graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present,
            }
        })
        .collect();

    let supports_swapchain =
        match unsafe { instance.enumerate_device_extension_properties(physical_device) } {
            Ok(extensions) => extensions.iter().any(|ext| {
                // SAFETY: extension_name is a null-terminated fixed-size array
                let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                name == ash::khr::swapchain::NAME
            }),
            Err(e) => {
                log::warn!("Failed to enumerate extensions of '{}': {:?}", name, e);
                false
            }
        };

    log::info!(
        "Found GPU: {} (type: {:?}, score: {})",
        name,
        properties.device_type,
        score_physical_device(&properties)
    );

    AdapterInfo {
        index,
        name,
        adapter_type: adapter_type_from_vk(properties.device_type),
        queue_families,
        supports_swapchain,
    }
}

/// Create a logical device with one queue from `queue_family` and the swapchain extension.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device, BackendError> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&queue_priorities)];

    let device_extensions = [ash::khr::swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features);

    unsafe { instance.create_device(physical_device, &create_info, None) }
        .map_err(|e| vk_creation_error("Failed to create logical device", e))
}

/// Create a command pool whose buffers can be reset individually.
pub fn create_command_pool(
    device: &ash::Device,
    queue_family: u32,
) -> Result<vk::CommandPool, BackendError> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.create_command_pool(&pool_info, None) }
        .map_err(|e| vk_creation_error("Failed to create command pool", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(
        device_type: vk::PhysicalDeviceType,
        max_dim: u32,
    ) -> vk::PhysicalDeviceProperties {
        vk::PhysicalDeviceProperties {
            device_type,
            limits: vk::PhysicalDeviceLimits {
                max_image_dimension2_d: max_dim,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_discrete_beats_integrated() {
        let discrete =
            score_physical_device(&properties(vk::PhysicalDeviceType::DISCRETE_GPU, 8192));
        let integrated =
            score_physical_device(&properties(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384));
        assert!(discrete > integrated);
    }

    #[test]
    fn test_cpu_scores_lowest() {
        let cpu = score_physical_device(&properties(vk::PhysicalDeviceType::CPU, 4096));
        assert_eq!(cpu, 4);
    }
}
