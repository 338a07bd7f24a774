//! Presentation chain (swapchain, its images and their views).
//!
//! The chain is never patched in place. Resizing tears it down completely and
//! builds a new one, so the image count and the view array always agree.

use crate::backend::{GpuDevice, SurfaceCapabilities, SwapchainDescriptor};
use crate::config::SurfaceConfig;
use crate::device::DeviceContext;
use crate::error::SwapchainError;
use crate::types::{
    Extent2D, ImageAspect, ImageHandle, ImageUsage, ImageViewHandle, PresentMode, SurfaceFormat,
    SurfaceHandle, SwapchainHandle,
};

/// Pick the preferred format if the surface supports it, else the first reported one.
pub fn choose_surface_format(
    available: &[SurfaceFormat],
    preferred: SurfaceFormat,
) -> Option<SurfaceFormat> {
    if available.contains(&preferred) {
        Some(preferred)
    } else {
        available.first().copied()
    }
}

/// Pick the preferred present mode if supported, else FIFO.
///
/// FIFO is vsync-locked and every conforming driver supports it.
pub fn choose_present_mode(available: &[PresentMode], preferred: PresentMode) -> PresentMode {
    if available.contains(&preferred) {
        preferred
    } else {
        PresentMode::Fifo
    }
}

/// The surface's fixed extent if it has one, else `desired` clamped to the allowed range.
pub fn choose_extent(capabilities: &SurfaceCapabilities, desired: Extent2D) -> Extent2D {
    match capabilities.current_extent {
        Some(current) => current,
        None => desired.clamp(capabilities.min_extent, capabilities.max_extent),
    }
}

/// One image more than the minimum, capped by the maximum (0 = unbounded).
pub fn choose_image_count(capabilities: &SurfaceCapabilities) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// A swapchain with one view per image.
#[derive(Debug)]
pub struct PresentationChain {
    surface: SurfaceHandle,
    swapchain: SwapchainHandle,
    format: SurfaceFormat,
    present_mode: PresentMode,
    extent: Extent2D,
    images: Vec<ImageHandle>,
    views: Vec<ImageViewHandle>,
}

impl PresentationChain {
    /// Build a chain for `surface` at `desired` extent (clamped to capabilities).
    ///
    /// # Errors
    ///
    /// - [`SwapchainError::CapabilitiesUnavailable`] if the surface can't be queried
    /// - [`SwapchainError::NoFormats`] if the surface reports no formats
    /// - [`SwapchainError::DegenerateExtent`] if the chosen extent has zero area
    /// - [`SwapchainError::Creation`] if the swapchain or a view can't be created
    pub fn build(
        ctx: &DeviceContext,
        desired: Extent2D,
        config: &SurfaceConfig,
    ) -> Result<Self, SwapchainError> {
        let surface = ctx.surface();
        let adapter = ctx.adapter();
        let instance = ctx.instance();

        let capabilities = instance
            .surface_capabilities(adapter, surface)
            .map_err(SwapchainError::CapabilitiesUnavailable)?;
        let formats = instance
            .surface_formats(adapter, surface)
            .map_err(SwapchainError::CapabilitiesUnavailable)?;
        let present_modes = instance
            .surface_present_modes(adapter, surface)
            .map_err(SwapchainError::CapabilitiesUnavailable)?;

        let format = choose_surface_format(&formats, config.preferred_format)
            .ok_or(SwapchainError::NoFormats)?;
        if format != config.preferred_format {
            log::warn!(
                "Preferred surface format {:?} unsupported, using {:?}",
                config.preferred_format,
                format
            );
        }
        let present_mode = choose_present_mode(&present_modes, config.present_mode);

        if desired.is_empty() {
            return Err(SwapchainError::DegenerateExtent(desired));
        }
        let extent = choose_extent(&capabilities, desired);
        if extent.is_empty() {
            return Err(SwapchainError::DegenerateExtent(extent));
        }

        let mut usage = ImageUsage::COLOR_ATTACHMENT;
        if capabilities.supports_transfer_dst {
            usage |= ImageUsage::COPY_DST;
        }

        let descriptor = SwapchainDescriptor {
            surface,
            format,
            present_mode,
            extent,
            image_count: choose_image_count(&capabilities),
            usage,
        };
        let device = ctx.device();
        let swapchain = device
            .create_swapchain(&descriptor)
            .map_err(SwapchainError::Creation)?;

        let images = match device.swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                device.destroy_swapchain(swapchain);
                return Err(SwapchainError::Creation(e));
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            match device.create_image_view(image, format.format, ImageAspect::Color) {
                Ok(view) => views.push(view),
                Err(e) => {
                    destroy_views(device, &mut views);
                    device.destroy_swapchain(swapchain);
                    return Err(SwapchainError::Creation(e));
                }
            }
        }

        log::info!(
            "Created presentation chain: {} ({} images, {:?}, {:?})",
            extent,
            images.len(),
            format.format,
            present_mode
        );
        log::trace!(
            "Surface capabilities on {}: images {}..{}, extent {}..{}",
            adapter.name,
            capabilities.min_image_count,
            capabilities.max_image_count,
            capabilities.min_extent,
            capabilities.max_extent
        );

        Ok(Self {
            surface,
            swapchain,
            format,
            present_mode,
            extent,
            images,
            views,
        })
    }

    /// Tear down and build again at `extent`.
    ///
    /// The caller must have waited for device idle and destroyed everything
    /// that references the views (depth target, framebuffers).
    pub fn rebuild(
        &mut self,
        ctx: &DeviceContext,
        extent: Extent2D,
        config: &SurfaceConfig,
    ) -> Result<(), SwapchainError> {
        self.teardown(ctx);
        *self = Self::build(ctx, extent, config)?;
        Ok(())
    }

    /// Destroy the views, then the swapchain. Does nothing if already torn down.
    pub fn teardown(&mut self, ctx: &DeviceContext) {
        if !self.is_live() {
            return;
        }
        let device = ctx.device();
        destroy_views(device, &mut self.views);
        device.destroy_swapchain(self.swapchain);
        self.swapchain = SwapchainHandle::NULL;
        self.images.clear();
        log::debug!("Tore down presentation chain ({})", self.extent);
    }

    /// Check if the swapchain exists.
    pub fn is_live(&self) -> bool {
        !self.swapchain.is_null()
    }

    /// Get the surface this chain presents to.
    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }

    /// Get the swapchain handle (null when torn down).
    pub fn swapchain(&self) -> SwapchainHandle {
        self.swapchain
    }

    /// Get the current extent.
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Get the surface format.
    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    /// Get the present mode in use.
    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    /// Number of swapchain images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Get the swapchain images.
    pub fn images(&self) -> &[ImageHandle] {
        &self.images
    }

    /// Get the image views, one per image.
    pub fn views(&self) -> &[ImageViewHandle] {
        &self.views
    }
}

fn destroy_views(device: &dyn GpuDevice, views: &mut Vec<ImageViewHandle>) {
    for view in views.drain(..) {
        device.destroy_image_view(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureFormat;

    fn capabilities() -> SurfaceCapabilities {
        SurfaceCapabilities {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: None,
            min_extent: Extent2D::new(1, 1),
            max_extent: Extent2D::new(4096, 4096),
            supports_transfer_dst: true,
        }
    }

    #[test]
    fn test_format_fallback_to_first() {
        let available = [
            SurfaceFormat::srgb(TextureFormat::Rgba8Unorm),
            SurfaceFormat::srgb(TextureFormat::Bgra8Unorm),
        ];
        assert_eq!(
            choose_surface_format(&available, SurfaceFormat::srgb(TextureFormat::Bgra8Unorm)),
            Some(available[1])
        );
        assert_eq!(
            choose_surface_format(&available, SurfaceFormat::default()),
            Some(available[0])
        );
        assert_eq!(choose_surface_format(&[], SurfaceFormat::default()), None);
    }

    #[test]
    fn test_present_mode_fallback_to_fifo() {
        let available = [PresentMode::Fifo, PresentMode::Immediate];
        assert_eq!(
            choose_present_mode(&available, PresentMode::Immediate),
            PresentMode::Immediate
        );
        assert_eq!(
            choose_present_mode(&available, PresentMode::Mailbox),
            PresentMode::Fifo
        );
    }

    #[test]
    fn test_extent_prefers_current() {
        let mut caps = capabilities();
        assert_eq!(
            choose_extent(&caps, Extent2D::new(8000, 600)),
            Extent2D::new(4096, 600)
        );
        caps.current_extent = Some(Extent2D::new(640, 480));
        assert_eq!(
            choose_extent(&caps, Extent2D::new(800, 600)),
            Extent2D::new(640, 480)
        );
    }

    #[test]
    fn test_image_count() {
        let mut caps = capabilities();
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);
    }
}
