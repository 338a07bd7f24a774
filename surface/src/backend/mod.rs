//! GPU backend abstraction layer.
//!
//! The components in this crate never talk to a GPU API directly. They go
//! through three object-safe traits:
//!
//! - [`GpuInstance`]: adapter enumeration, surface queries, device creation
//! - [`GpuDevice`]: swapchains, views, sync primitives, submission, present
//! - [`GpuAllocator`]: buffer and image memory
//!
//! # Available Backends
//!
//! - `dummy` (always built): records every call; used by the test suite
//! - `vulkan-backend` (default feature): native Vulkan using ash and gpu-allocator
//!
//! # Ownership
//!
//! Dropping a [`GpuAllocator`] releases the device-memory allocator, dropping a
//! [`GpuDevice`] destroys the logical device and dropping a [`GpuInstance`]
//! destroys the instance. Callers must drop them in that order.

pub mod dummy;
mod error;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub use error::BackendError;

use crate::types::{
    BufferDescriptor, BufferHandle, CommandBufferHandle, Extent2D, FenceHandle, FramebufferHandle,
    ImageAspect, ImageDescriptor, ImageHandle, ImageUsage, ImageViewHandle, PresentMode,
    RenderPassHandle, SemaphoreHandle, SurfaceFormat, SurfaceHandle, SwapchainHandle,
    TextureFormat,
};

/// Kind of physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterType {
    /// Dedicated GPU.
    DiscreteGpu,
    /// GPU sharing memory with the CPU.
    IntegratedGpu,
    /// Virtualized GPU.
    VirtualGpu,
    /// Software rasterizer.
    Cpu,
    /// Anything else.
    Other,
}

/// Capabilities of one queue family of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    /// Queue family index.
    pub index: u32,
    /// Supports graphics operations.
    pub graphics: bool,
    /// Can present to the surface the adapter was enumerated against.
    pub present: bool,
}

/// A physical device as seen through a specific surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Backend-specific adapter index.
    pub index: usize,
    /// Human readable device name.
    pub name: String,
    /// Device type.
    pub adapter_type: AdapterType,
    /// Queue families in index order.
    pub queue_families: Vec<QueueFamilyInfo>,
    /// Supports the swapchain extension.
    pub supports_swapchain: bool,
}

impl AdapterInfo {
    /// First queue family that supports both graphics and presentation.
    pub fn graphics_present_family(&self) -> Option<u32> {
        self.queue_families
            .iter()
            .find(|family| family.graphics && family.present)
            .map(|family| family.index)
    }

    /// Check that this adapter can drive a presentation chain.
    pub fn is_suitable(&self) -> bool {
        self.supports_swapchain && self.graphics_present_family().is_some()
    }
}

/// Surface capabilities reported by the presentation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    /// Minimum number of swapchain images.
    pub min_image_count: u32,
    /// Maximum number of swapchain images; 0 means unbounded.
    pub max_image_count: u32,
    /// Extent the swapchain must use, if the surface dictates one.
    pub current_extent: Option<Extent2D>,
    /// Smallest allowed extent.
    pub min_extent: Extent2D,
    /// Largest allowed extent.
    pub max_extent: Extent2D,
    /// Swapchain images may be used as a transfer destination.
    pub supports_transfer_dst: bool,
}

/// Parameters for swapchain creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDescriptor {
    /// Target surface.
    pub surface: SurfaceHandle,
    /// Image format and color space.
    pub format: SurfaceFormat,
    /// Presentation mode.
    pub present_mode: PresentMode,
    /// Image extent.
    pub extent: Extent2D,
    /// Requested minimum image count.
    pub image_count: u32,
    /// Image usage.
    pub usage: ImageUsage,
}

/// Result of a successful image acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index into the swapchain's image array.
    pub index: u32,
    /// The swapchain still works but no longer matches the surface exactly.
    pub suboptimal: bool,
}

/// Result of a successful present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// Presented and the swapchain matches the surface.
    Optimal,
    /// Presented, but the swapchain should be recreated.
    Suboptimal,
}

/// A queue submission for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitDescriptor {
    /// Recorded commands.
    pub command_buffer: CommandBufferHandle,
    /// Semaphore to wait on before executing (image ready).
    pub wait_semaphore: SemaphoreHandle,
    /// Semaphore to signal on completion (render finished).
    pub signal_semaphore: SemaphoreHandle,
    /// Fence to signal on completion (frame complete).
    pub fence: FenceHandle,
}

/// Instance-level GPU API entry point.
pub trait GpuInstance {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Enumerate adapters, reporting queue family present support for `surface`.
    fn adapters(&self, surface: SurfaceHandle) -> Result<Vec<AdapterInfo>, BackendError>;

    /// Create a logical device with a single queue from `queue_family`.
    fn open_device(
        &self,
        adapter: &AdapterInfo,
        queue_family: u32,
    ) -> Result<Box<dyn GpuDevice>, BackendError>;

    /// Query surface capabilities.
    fn surface_capabilities(
        &self,
        adapter: &AdapterInfo,
        surface: SurfaceHandle,
    ) -> Result<SurfaceCapabilities, BackendError>;

    /// Query supported surface formats, in driver order.
    fn surface_formats(
        &self,
        adapter: &AdapterInfo,
        surface: SurfaceHandle,
    ) -> Result<Vec<SurfaceFormat>, BackendError>;

    /// Query supported present modes.
    fn surface_present_modes(
        &self,
        adapter: &AdapterInfo,
        surface: SurfaceHandle,
    ) -> Result<Vec<PresentMode>, BackendError>;

    /// Destroy a surface. Must happen after every swapchain on it is gone.
    fn destroy_surface(&self, surface: SurfaceHandle);
}

/// Logical device with one graphics queue.
///
/// All `destroy_*` calls require that no submitted work still references the
/// object; callers establish that with [`GpuDevice::wait_idle`] or a fence wait.
pub trait GpuDevice {
    /// Block until all submitted work has completed.
    fn wait_idle(&self) -> Result<(), BackendError>;

    /// Create the device-memory allocator bound to this device.
    fn create_allocator(&self) -> Result<Box<dyn GpuAllocator>, BackendError>;

    /// Create a swapchain.
    fn create_swapchain(
        &self,
        descriptor: &SwapchainDescriptor,
    ) -> Result<SwapchainHandle, BackendError>;

    /// List the images owned by a swapchain.
    fn swapchain_images(&self, swapchain: SwapchainHandle)
    -> Result<Vec<ImageHandle>, BackendError>;

    /// Destroy a swapchain (its images go with it).
    fn destroy_swapchain(&self, swapchain: SwapchainHandle);

    /// Create a 2D view of an image.
    fn create_image_view(
        &self,
        image: ImageHandle,
        format: TextureFormat,
        aspect: ImageAspect,
    ) -> Result<ImageViewHandle, BackendError>;

    /// Destroy an image view.
    fn destroy_image_view(&self, view: ImageViewHandle);

    /// Create a framebuffer for `render_pass` from `attachments`.
    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: Extent2D,
    ) -> Result<FramebufferHandle, BackendError>;

    /// Destroy a framebuffer.
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    /// Create a binary semaphore.
    fn create_semaphore(&self) -> Result<SemaphoreHandle, BackendError>;

    /// Destroy a semaphore.
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    /// Create a fence, optionally already signaled.
    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, BackendError>;

    /// Block until the fence is signaled.
    fn wait_fence(&self, fence: FenceHandle) -> Result<(), BackendError>;

    /// Return the fence to the unsignaled state.
    fn reset_fence(&self, fence: FenceHandle) -> Result<(), BackendError>;

    /// Destroy a fence.
    fn destroy_fence(&self, fence: FenceHandle);

    /// Allocate a primary command buffer from the device's pool.
    fn allocate_command_buffer(&self) -> Result<CommandBufferHandle, BackendError>;

    /// Return a command buffer to the pool.
    fn free_command_buffer(&self, command_buffer: CommandBufferHandle);

    /// Record a full-image clear that leaves the image ready for presentation.
    fn record_clear(
        &self,
        command_buffer: CommandBufferHandle,
        image: ImageHandle,
        color: [f32; 4],
    ) -> Result<(), BackendError>;

    /// Acquire the next presentable image, signaling `semaphore` when ready.
    ///
    /// Returns [`BackendError::SurfaceOutOfDate`] when the swapchain is stale.
    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        semaphore: SemaphoreHandle,
    ) -> Result<AcquiredImage, BackendError>;

    /// Submit recorded work to the graphics queue.
    fn submit(&self, submit: &SubmitDescriptor) -> Result<(), BackendError>;

    /// Queue an image for presentation after `wait_semaphore` signals.
    ///
    /// Returns [`BackendError::SurfaceOutOfDate`] when the swapchain is stale.
    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait_semaphore: SemaphoreHandle,
    ) -> Result<PresentStatus, BackendError>;
}

/// Device-memory allocator.
pub trait GpuAllocator {
    /// Create a buffer with bound memory.
    fn create_buffer(&mut self, descriptor: &BufferDescriptor)
    -> Result<BufferHandle, BackendError>;

    /// Copy `data` into a host-visible buffer at `offset` (map, copy, unmap).
    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Destroy a buffer and free its memory.
    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<(), BackendError>;

    /// Create a 2D image with bound memory.
    fn create_image(&mut self, descriptor: &ImageDescriptor) -> Result<ImageHandle, BackendError>;

    /// Destroy an image and free its memory.
    fn destroy_image(&mut self, image: ImageHandle) -> Result<(), BackendError>;

    /// Number of allocations the backend still holds.
    fn live_allocations(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(families: Vec<QueueFamilyInfo>, supports_swapchain: bool) -> AdapterInfo {
        AdapterInfo {
            index: 0,
            name: "test".into(),
            adapter_type: AdapterType::DiscreteGpu,
            queue_families: families,
            supports_swapchain,
        }
    }

    #[test]
    fn test_graphics_present_family_requires_both() {
        let info = adapter(
            vec![
                QueueFamilyInfo {
                    index: 0,
                    graphics: true,
                    present: false,
                },
                QueueFamilyInfo {
                    index: 1,
                    graphics: false,
                    present: true,
                },
                QueueFamilyInfo {
                    index: 2,
                    graphics: true,
                    present: true,
                },
            ],
            true,
        );
        assert_eq!(info.graphics_present_family(), Some(2));
        assert!(info.is_suitable());
    }

    #[test]
    fn test_adapter_without_swapchain_is_unsuitable() {
        let info = adapter(
            vec![QueueFamilyInfo {
                index: 0,
                graphics: true,
                present: true,
            }],
            false,
        );
        assert!(!info.is_suitable());
    }
}
