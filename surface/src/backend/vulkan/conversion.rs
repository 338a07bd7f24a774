//! Conversions between surface types and Vulkan types.

use ash::vk;
use ash::vk::Handle;

use crate::backend::{AdapterType, BackendError, SurfaceCapabilities};
use crate::types::{
    BufferUsage, ColorSpace, Extent2D, ImageAspect, ImageUsage, PresentMode, SurfaceFormat,
    TextureFormat,
};

/// Convert a texture format to a Vulkan format.
pub fn convert_texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Rgb10a2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::Depth16Unorm => vk::Format::D16_UNORM,
        TextureFormat::Other(raw) => vk::Format::from_raw(raw),
    }
}

/// Convert a Vulkan format reported by the driver back to a texture format.
pub fn texture_format_from_vk(format: vk::Format) -> TextureFormat {
    match format {
        vk::Format::B8G8R8A8_UNORM => TextureFormat::Bgra8Unorm,
        vk::Format::B8G8R8A8_SRGB => TextureFormat::Bgra8UnormSrgb,
        vk::Format::R8G8B8A8_UNORM => TextureFormat::Rgba8Unorm,
        vk::Format::R8G8B8A8_SRGB => TextureFormat::Rgba8UnormSrgb,
        vk::Format::A2B10G10R10_UNORM_PACK32 => TextureFormat::Rgb10a2Unorm,
        vk::Format::R16G16B16A16_SFLOAT => TextureFormat::Rgba16Float,
        vk::Format::D32_SFLOAT => TextureFormat::Depth32Float,
        vk::Format::D24_UNORM_S8_UINT => TextureFormat::Depth24PlusStencil8,
        vk::Format::D16_UNORM => TextureFormat::Depth16Unorm,
        other => TextureFormat::Other(other.as_raw()),
    }
}

/// Convert a color space to Vulkan.
pub fn convert_color_space(color_space: ColorSpace) -> vk::ColorSpaceKHR {
    match color_space {
        ColorSpace::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::Other(raw) => vk::ColorSpaceKHR::from_raw(raw),
    }
}

/// Convert a Vulkan surface format to a [`SurfaceFormat`].
pub fn surface_format_from_vk(format: vk::SurfaceFormatKHR) -> SurfaceFormat {
    let color_space = match format.color_space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonlinear,
        other => ColorSpace::Other(other.as_raw()),
    };
    SurfaceFormat {
        format: texture_format_from_vk(format.format),
        color_space,
    }
}

/// Convert a present mode to Vulkan.
pub fn convert_present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

/// Convert a Vulkan present mode; modes without a counterpart are dropped.
pub fn present_mode_from_vk(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

/// Convert buffer usage flags to Vulkan buffer usage flags.
pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= vk::BufferUsageFlags::TRANSFER_DST;
    }

    result
}

/// Convert image usage flags to Vulkan image usage flags.
pub fn convert_image_usage(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::empty();

    if usage.contains(ImageUsage::COLOR_ATTACHMENT) {
        result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
        result |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(ImageUsage::SAMPLED) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(ImageUsage::COPY_SRC) {
        result |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(ImageUsage::COPY_DST) {
        result |= vk::ImageUsageFlags::TRANSFER_DST;
    }

    result
}

/// Convert an image aspect to Vulkan aspect flags.
pub fn convert_image_aspect(aspect: ImageAspect) -> vk::ImageAspectFlags {
    match aspect {
        ImageAspect::Color => vk::ImageAspectFlags::COLOR,
        ImageAspect::Depth => vk::ImageAspectFlags::DEPTH,
    }
}

/// Convert a Vulkan device type.
pub fn adapter_type_from_vk(device_type: vk::PhysicalDeviceType) -> AdapterType {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterType::DiscreteGpu,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterType::IntegratedGpu,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterType::VirtualGpu,
        vk::PhysicalDeviceType::CPU => AdapterType::Cpu,
        _ => AdapterType::Other,
    }
}

/// Convert Vulkan surface capabilities.
///
/// A `current_extent` of `u32::MAX` means the surface lets the swapchain pick.
pub fn capabilities_from_vk(caps: &vk::SurfaceCapabilitiesKHR) -> SurfaceCapabilities {
    let current_extent = (caps.current_extent.width != u32::MAX)
        .then(|| Extent2D::new(caps.current_extent.width, caps.current_extent.height));
    SurfaceCapabilities {
        min_image_count: caps.min_image_count,
        max_image_count: caps.max_image_count,
        current_extent,
        min_extent: Extent2D::new(caps.min_image_extent.width, caps.min_image_extent.height),
        max_extent: Extent2D::new(caps.max_image_extent.width, caps.max_image_extent.height),
        supports_transfer_dst: caps
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::TRANSFER_DST),
    }
}

/// Convert an extent to Vulkan.
pub fn convert_extent(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

/// Map a Vulkan result code to a backend error, with `what` describing the call.
pub fn vk_error(what: &str, result: vk::Result) -> BackendError {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR => BackendError::SurfaceOutOfDate,
        vk::Result::ERROR_SURFACE_LOST_KHR => BackendError::SurfaceLost,
        vk::Result::ERROR_DEVICE_LOST => BackendError::DeviceLost,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            BackendError::OutOfMemory
        }
        other => BackendError::Internal(format!("{} failed: {:?}", what, other)),
    }
}

/// Map a Vulkan result code from an object creation call.
pub fn vk_creation_error(what: &str, result: vk::Result) -> BackendError {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            BackendError::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => BackendError::DeviceLost,
        vk::Result::ERROR_SURFACE_LOST_KHR => BackendError::SurfaceLost,
        other => BackendError::ResourceCreationFailed(format!("{}: {:?}", what, other)),
    }
}

/// Wrap a Vulkan object as a surface handle type.
macro_rules! vk_handle_conversions {
    ($($fn_to:ident, $fn_from:ident: $ours:ty => $theirs:ty;)*) => {
        $(
            /// Convert a Vulkan handle into the crate's opaque handle.
            pub fn $fn_to(handle: $theirs) -> $ours {
                <$ours>::from_raw(handle.as_raw())
            }

            /// Convert the crate's opaque handle back into the Vulkan handle.
            pub fn $fn_from(handle: $ours) -> $theirs {
                <$theirs>::from_raw(handle.as_raw())
            }
        )*
    };
}

vk_handle_conversions! {
    surface_handle, vk_surface: crate::types::SurfaceHandle => vk::SurfaceKHR;
    swapchain_handle, vk_swapchain: crate::types::SwapchainHandle => vk::SwapchainKHR;
    image_handle, vk_image: crate::types::ImageHandle => vk::Image;
    image_view_handle, vk_image_view: crate::types::ImageViewHandle => vk::ImageView;
    buffer_handle, vk_buffer: crate::types::BufferHandle => vk::Buffer;
    semaphore_handle, vk_semaphore: crate::types::SemaphoreHandle => vk::Semaphore;
    fence_handle, vk_fence: crate::types::FenceHandle => vk::Fence;
    framebuffer_handle, vk_framebuffer: crate::types::FramebufferHandle => vk::Framebuffer;
    render_pass_handle, vk_render_pass: crate::types::RenderPassHandle => vk::RenderPass;
    command_buffer_handle, vk_command_buffer: crate::types::CommandBufferHandle => vk::CommandBuffer;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_roundtrip_named() {
        for format in [
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Depth32Float,
        ] {
            assert_eq!(texture_format_from_vk(convert_texture_format(format)), format);
        }
    }

    #[test]
    fn test_unknown_format_is_carried_raw() {
        let format = texture_format_from_vk(vk::Format::R5G6B5_UNORM_PACK16);
        assert_eq!(format, TextureFormat::Other(vk::Format::R5G6B5_UNORM_PACK16.as_raw()));
        assert_eq!(convert_texture_format(format), vk::Format::R5G6B5_UNORM_PACK16);
    }

    #[test]
    fn test_capabilities_undefined_extent() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let converted = capabilities_from_vk(&caps);
        assert_eq!(converted.current_extent, None);
        assert_eq!(converted.max_image_count, 0);
        assert!(!converted.supports_transfer_dst);
    }

    #[test]
    fn test_out_of_date_maps_to_surface_out_of_date() {
        assert_eq!(
            vk_error("acquire", vk::Result::ERROR_OUT_OF_DATE_KHR),
            BackendError::SurfaceOutOfDate
        );
        assert_eq!(
            vk_error("submit", vk::Result::ERROR_DEVICE_LOST),
            BackendError::DeviceLost
        );
    }

    #[test]
    fn test_handle_roundtrip() {
        let raw = vk::Fence::from_raw(0x1234);
        assert_eq!(vk_fence(fence_handle(raw)), raw);
    }
}
