//! Backend-neutral types shared by every component.
//!
//! This module contains handle newtypes, formats, usage flags and descriptor
//! structs. None of them depend on a particular GPU API; the Vulkan backend
//! converts them in `backend::vulkan::conversion`.

mod buffer;
mod format;
mod handles;
mod image;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use format::{ColorSpace, PresentMode, SurfaceFormat, TextureFormat};
pub use handles::{
    BufferHandle, CommandBufferHandle, FenceHandle, FramebufferHandle, ImageHandle,
    ImageViewHandle, RenderPassHandle, SemaphoreHandle, SurfaceHandle, SwapchainHandle,
};
pub use image::{Extent2D, ImageAspect, ImageDescriptor, ImageUsage};
