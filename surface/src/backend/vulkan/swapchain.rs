//! Swapchain creation, image acquisition and presentation.

use ash::vk;

use super::conversion::{
    convert_color_space, convert_extent, convert_image_usage, convert_present_mode,
    convert_texture_format, vk_creation_error, vk_error,
};
use crate::backend::{AcquiredImage, BackendError, PresentStatus, SwapchainDescriptor};

/// Create a swapchain as described by `descriptor`.
///
/// Format, present mode, extent and image count were already negotiated by the
/// caller; only the surface transform is queried here.
pub fn create_swapchain(
    surface_loader: &ash::khr::surface::Instance,
    swapchain_loader: &ash::khr::swapchain::Device,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    descriptor: &SwapchainDescriptor,
) -> Result<vk::SwapchainKHR, BackendError> {
    let capabilities = unsafe {
        surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
    }
    .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?;

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(descriptor.image_count)
        .image_format(convert_texture_format(descriptor.format.format))
        .image_color_space(convert_color_space(descriptor.format.color_space))
        .image_extent(convert_extent(descriptor.extent))
        .image_array_layers(1)
        .image_usage(convert_image_usage(descriptor.usage))
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(convert_present_mode(descriptor.present_mode))
        .clipped(true)
        .old_swapchain(vk::SwapchainKHR::null());

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
        .map_err(|e| vk_creation_error("Failed to create swapchain", e))?;

    log::info!(
        "Created Vulkan swapchain: {} ({:?}, {:?}, min {} images)",
        descriptor.extent,
        descriptor.format.format,
        descriptor.present_mode,
        descriptor.image_count
    );

    Ok(swapchain)
}

/// Acquire the next image, signaling `semaphore` when it is ready.
pub fn acquire_next_image(
    swapchain_loader: &ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    semaphore: vk::Semaphore,
) -> Result<AcquiredImage, BackendError> {
    let (index, suboptimal) = unsafe {
        swapchain_loader.acquire_next_image(swapchain, u64::MAX, semaphore, vk::Fence::null())
    }
    .map_err(|e| vk_error("vkAcquireNextImageKHR", e))?;

    Ok(AcquiredImage { index, suboptimal })
}

/// Queue `image_index` for presentation after `wait_semaphore` signals.
pub fn present(
    swapchain_loader: &ash::khr::swapchain::Device,
    queue: vk::Queue,
    swapchain: vk::SwapchainKHR,
    image_index: u32,
    wait_semaphore: vk::Semaphore,
) -> Result<PresentStatus, BackendError> {
    let wait_semaphores = [wait_semaphore];
    let swapchains = [swapchain];
    let image_indices = [image_index];
    let present_info = vk::PresentInfoKHR::default()
        .wait_semaphores(&wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&image_indices);

    match unsafe { swapchain_loader.queue_present(queue, &present_info) } {
        Ok(false) => Ok(PresentStatus::Optimal),
        Ok(true) => {
            log::trace!("Swapchain suboptimal");
            Ok(PresentStatus::Suboptimal)
        }
        Err(e) => Err(vk_error("vkQueuePresentKHR", e)),
    }
}
