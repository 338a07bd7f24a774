//! Vulkan backend implementation using ash.
//!
//! [`VulkanInstance`] owns the instance, the validation messenger and every
//! surface created through it. [`VulkanDevice`] owns the logical device, its
//! queue and its command pool. Memory goes through [`VulkanAllocator`], which
//! wraps gpu-allocator.
//!
//! Validation layers are enabled when [`SurfaceConfig::validation`] is set and
//! the layer is installed; messages land in the `log` facade.

mod allocator;
mod command;
pub mod conversion;
mod debug;
mod device;
mod instance;
mod swapchain;
mod sync;

use ash::vk;
use ash::vk::Handle;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub use self::allocator::VulkanAllocator;
use self::conversion::{
    capabilities_from_vk, command_buffer_handle, convert_image_aspect, convert_texture_format,
    fence_handle, framebuffer_handle, image_handle, image_view_handle, present_mode_from_vk,
    semaphore_handle, surface_format_from_vk, surface_handle, swapchain_handle,
    vk_command_buffer, vk_creation_error, vk_error, vk_fence, vk_framebuffer, vk_image,
    vk_image_view, vk_render_pass, vk_semaphore, vk_surface, vk_swapchain,
};
use crate::backend::{
    AcquiredImage, AdapterInfo, BackendError, GpuAllocator, GpuDevice, GpuInstance,
    PresentStatus, SubmitDescriptor, SurfaceCapabilities, SwapchainDescriptor,
};
use crate::config::SurfaceConfig;
use crate::types::{
    CommandBufferHandle, Extent2D, FenceHandle, FramebufferHandle, ImageAspect, ImageHandle,
    ImageViewHandle, PresentMode, RenderPassHandle, SemaphoreHandle, SurfaceFormat,
    SurfaceHandle, SwapchainHandle, TextureFormat,
};

/// Vulkan instance with its surfaces.
pub struct VulkanInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: ash::khr::surface::Instance,
    physical_devices: Vec<vk::PhysicalDevice>,
    surfaces: Mutex<Vec<vk::SurfaceKHR>>,
}

impl std::fmt::Debug for VulkanInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanInstance")
            .field("validation", &self.debug.is_some())
            .field("physical_devices", &self.physical_devices.len())
            .field("surfaces", &self.surfaces.lock().len())
            .finish()
    }
}

impl VulkanInstance {
    /// Load Vulkan and create an instance that can present on `display`'s windowing system.
    pub fn new(
        config: &SurfaceConfig,
        display: &impl HasDisplayHandle,
    ) -> Result<Self, BackendError> {
        let display = display
            .display_handle()
            .map_err(|e| BackendError::InvalidParameter(format!("display handle: {}", e)))?
            .as_raw();

        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to load Vulkan: {}", e))
        })?;

        let created = instance::create_instance(
            &entry,
            &config.application_name,
            config.validation,
            display,
        )?;
        let instance = created.instance;

        let physical_devices = match unsafe { instance.enumerate_physical_devices() } {
            Ok(devices) => devices,
            Err(e) => {
                destroy_instance(&instance, created.debug.as_ref());
                return Err(vk_error("vkEnumeratePhysicalDevices", e));
            }
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        log::info!(
            "Vulkan instance created (validation: {}, {} physical device(s))",
            created.debug.is_some(),
            physical_devices.len()
        );

        Ok(Self {
            entry,
            instance,
            debug: created.debug,
            surface_loader,
            physical_devices,
            surfaces: Mutex::new(Vec::new()),
        })
    }

    /// Create a surface for `window`.
    ///
    /// # Safety
    ///
    /// `window` must outlive the surface: destroy the surface (directly or by
    /// releasing the owning device context) before the window goes away.
    pub unsafe fn create_surface<W>(&self, window: &W) -> Result<SurfaceHandle, BackendError>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| BackendError::InvalidParameter(format!("display handle: {}", e)))?;
        let window = window
            .window_handle()
            .map_err(|e| BackendError::InvalidParameter(format!("window handle: {}", e)))?;

        let surface = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                display.as_raw(),
                window.as_raw(),
                None,
            )
        }
        .map_err(|e| vk_creation_error("Failed to create surface", e))?;

        self.surfaces.lock().push(surface);
        log::debug!("Created Vulkan surface {:#x}", surface.as_raw());
        Ok(surface_handle(surface))
    }

    fn physical_device(&self, adapter: &AdapterInfo) -> Result<vk::PhysicalDevice, BackendError> {
        self.physical_devices
            .get(adapter.index)
            .copied()
            .ok_or_else(|| {
                BackendError::InvalidParameter(format!(
                    "adapter index {} out of range ({} devices)",
                    adapter.index,
                    self.physical_devices.len()
                ))
            })
    }
}

impl GpuInstance for VulkanInstance {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    /// Adapters come back best first: discrete, then integrated, then the rest.
    fn adapters(&self, surface: SurfaceHandle) -> Result<Vec<AdapterInfo>, BackendError> {
        let surface = vk_surface(surface);
        let mut scored: Vec<(u32, AdapterInfo)> = self
            .physical_devices
            .iter()
            .enumerate()
            .map(|(index, &physical_device)| {
                let properties =
                    unsafe { self.instance.get_physical_device_properties(physical_device) };
                let info = device::describe_physical_device(
                    &self.instance,
                    &self.surface_loader,
                    physical_device,
                    index,
                    surface,
                );
                (device::score_physical_device(&properties), info)
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().map(|(_, info)| info).collect())
    }

    fn open_device(
        &self,
        adapter: &AdapterInfo,
        queue_family: u32,
    ) -> Result<Box<dyn GpuDevice>, BackendError> {
        let physical_device = self.physical_device(adapter)?;
        let device = device::create_logical_device(&self.instance, physical_device, queue_family)?;

        let command_pool = match device::create_command_pool(&device, queue_family) {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_loader = ash::khr::swapchain::Device::new(&self.instance, &device);

        log::info!(
            "Vulkan device opened on '{}' (queue family {})",
            adapter.name,
            queue_family
        );

        Ok(Box::new(VulkanDevice {
            instance: self.instance.clone(),
            physical_device,
            device,
            queue,
            command_pool,
            surface_loader: self.surface_loader.clone(),
            swapchain_loader,
        }))
    }

    fn surface_capabilities(
        &self,
        adapter: &AdapterInfo,
        surface: SurfaceHandle,
    ) -> Result<SurfaceCapabilities, BackendError> {
        let physical_device = self.physical_device(adapter)?;
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, vk_surface(surface))
        }
        .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?;
        Ok(capabilities_from_vk(&caps))
    }

    fn surface_formats(
        &self,
        adapter: &AdapterInfo,
        surface: SurfaceHandle,
    ) -> Result<Vec<SurfaceFormat>, BackendError> {
        let physical_device = self.physical_device(adapter)?;
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, vk_surface(surface))
        }
        .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceFormatsKHR", e))?;
        Ok(formats.into_iter().map(surface_format_from_vk).collect())
    }

    fn surface_present_modes(
        &self,
        adapter: &AdapterInfo,
        surface: SurfaceHandle,
    ) -> Result<Vec<PresentMode>, BackendError> {
        let physical_device = self.physical_device(adapter)?;
        let modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, vk_surface(surface))
        }
        .map_err(|e| vk_error("vkGetPhysicalDeviceSurfacePresentModesKHR", e))?;
        Ok(modes.into_iter().filter_map(present_mode_from_vk).collect())
    }

    fn destroy_surface(&self, surface: SurfaceHandle) {
        let surface = vk_surface(surface);
        let mut surfaces = self.surfaces.lock();
        let Some(position) = surfaces.iter().position(|&s| s == surface) else {
            log::warn!("Ignoring destroy of unknown surface {:#x}", surface.as_raw());
            return;
        };
        surfaces.swap_remove(position);
        unsafe { self.surface_loader.destroy_surface(surface, None) };
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            for surface in self.surfaces.get_mut().drain(..) {
                log::warn!("Destroying surface {:#x} left alive at instance drop", surface.as_raw());
                self.surface_loader.destroy_surface(surface, None);
            }
        }
        destroy_instance(&self.instance, self.debug.as_ref());
    }
}

fn destroy_instance(
    instance: &ash::Instance,
    debug: Option<&(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
) {
    unsafe {
        if let Some((debug_utils, messenger)) = debug {
            debug_utils.destroy_debug_utils_messenger(*messenger, None);
        }
        instance.destroy_instance(None);
    }
}

/// Logical device with one graphics+present queue.
pub struct VulkanDevice {
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl GpuDevice for VulkanDevice {
    fn wait_idle(&self) -> Result<(), BackendError> {
        unsafe { self.device.device_wait_idle() }.map_err(|e| vk_error("vkDeviceWaitIdle", e))
    }

    fn create_allocator(&self) -> Result<Box<dyn GpuAllocator>, BackendError> {
        let allocator =
            VulkanAllocator::new(&self.instance, self.physical_device, self.device.clone())?;
        Ok(Box::new(allocator))
    }

    fn create_swapchain(
        &self,
        descriptor: &SwapchainDescriptor,
    ) -> Result<SwapchainHandle, BackendError> {
        swapchain::create_swapchain(
            &self.surface_loader,
            &self.swapchain_loader,
            self.physical_device,
            vk_surface(descriptor.surface),
            descriptor,
        )
        .map(swapchain_handle)
    }

    fn swapchain_images(
        &self,
        swapchain: SwapchainHandle,
    ) -> Result<Vec<ImageHandle>, BackendError> {
        let images = unsafe {
            self.swapchain_loader
                .get_swapchain_images(vk_swapchain(swapchain))
        }
        .map_err(|e| vk_error("vkGetSwapchainImagesKHR", e))?;
        Ok(images.into_iter().map(image_handle).collect())
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(vk_swapchain(swapchain), None)
        };
    }

    fn create_image_view(
        &self,
        image: ImageHandle,
        format: TextureFormat,
        aspect: ImageAspect,
    ) -> Result<ImageViewHandle, BackendError> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(vk_image(image))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(convert_texture_format(format))
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: convert_image_aspect(aspect),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.create_image_view(&view_info, None) }
            .map(image_view_handle)
            .map_err(|e| vk_creation_error("Failed to create image view", e))
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        unsafe { self.device.destroy_image_view(vk_image_view(view), None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: Extent2D,
    ) -> Result<FramebufferHandle, BackendError> {
        let attachments: Vec<vk::ImageView> =
            attachments.iter().copied().map(vk_image_view).collect();
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(vk_render_pass(render_pass))
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        unsafe { self.device.create_framebuffer(&info, None) }
            .map(framebuffer_handle)
            .map_err(|e| vk_creation_error("Failed to create framebuffer", e))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        unsafe {
            self.device
                .destroy_framebuffer(vk_framebuffer(framebuffer), None)
        };
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, BackendError> {
        sync::create_semaphore(&self.device).map(semaphore_handle)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe { self.device.destroy_semaphore(vk_semaphore(semaphore), None) };
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, BackendError> {
        sync::create_fence(&self.device, signaled).map(fence_handle)
    }

    fn wait_fence(&self, fence: FenceHandle) -> Result<(), BackendError> {
        sync::wait_fence(&self.device, vk_fence(fence))
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), BackendError> {
        unsafe { self.device.reset_fences(&[vk_fence(fence)]) }
            .map_err(|e| vk_error("vkResetFences", e))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe { self.device.destroy_fence(vk_fence(fence), None) };
    }

    fn allocate_command_buffer(&self) -> Result<CommandBufferHandle, BackendError> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| vk_creation_error("Failed to allocate command buffer", e))?;
        buffers
            .first()
            .copied()
            .map(command_buffer_handle)
            .ok_or_else(|| BackendError::Internal("driver returned no command buffer".into()))
    }

    fn free_command_buffer(&self, command_buffer: CommandBufferHandle) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[vk_command_buffer(command_buffer)])
        };
    }

    fn record_clear(
        &self,
        command_buffer: CommandBufferHandle,
        image: ImageHandle,
        color: [f32; 4],
    ) -> Result<(), BackendError> {
        command::record_clear(
            &self.device,
            vk_command_buffer(command_buffer),
            vk_image(image),
            color,
        )
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        semaphore: SemaphoreHandle,
    ) -> Result<AcquiredImage, BackendError> {
        swapchain::acquire_next_image(
            &self.swapchain_loader,
            vk_swapchain(swapchain),
            vk_semaphore(semaphore),
        )
    }

    fn submit(&self, submit: &SubmitDescriptor) -> Result<(), BackendError> {
        sync::submit(
            &self.device,
            self.queue,
            vk_command_buffer(submit.command_buffer),
            vk_semaphore(submit.wait_semaphore),
            vk_semaphore(submit.signal_semaphore),
            vk_fence(submit.fence),
        )
    }

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait_semaphore: SemaphoreHandle,
    ) -> Result<PresentStatus, BackendError> {
        swapchain::present(
            &self.swapchain_loader,
            self.queue,
            vk_swapchain(swapchain),
            image_index,
            vk_semaphore(wait_semaphore),
        )
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::warn!("vkDeviceWaitIdle failed during device drop: {:?}", e);
            }
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
        log::debug!("Vulkan device destroyed");
    }
}
