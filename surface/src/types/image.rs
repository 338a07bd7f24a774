//! Image extents, usage flags and descriptors.

use std::fmt;

use bitflags::bitflags;

use super::TextureFormat;

/// Width and height of a drawable surface or image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2D {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Check if either dimension is zero (e.g. a minimized window).
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Clamp each dimension into `[min, max]`.
    pub fn clamp(self, min: Extent2D, max: Extent2D) -> Self {
        Self {
            width: self.width.clamp(min.width, max.width.max(min.width)),
            height: self.height.clamp(min.height, max.height.max(min.height)),
        }
    }
}

impl fmt::Display for Extent2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Extent2D {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

bitflags! {
    /// Usage flags for images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        /// Image can be a color attachment.
        const COLOR_ATTACHMENT = 1 << 0;
        /// Image can be a depth/stencil attachment.
        const DEPTH_STENCIL_ATTACHMENT = 1 << 1;
        /// Image can be sampled in shaders.
        const SAMPLED = 1 << 2;
        /// Image can be copied from.
        const COPY_SRC = 1 << 3;
        /// Image can be copied or cleared to.
        const COPY_DST = 1 << 4;
    }
}

impl Default for ImageUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Which aspect of an image a view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAspect {
    /// Color data.
    Color,
    /// Depth data.
    Depth,
}

impl ImageAspect {
    /// Pick the aspect implied by a format.
    pub fn for_format(format: TextureFormat) -> Self {
        if format.is_depth() {
            Self::Depth
        } else {
            Self::Color
        }
    }
}

/// Descriptor for an allocator-owned 2D image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    /// Debug label for the image.
    pub label: Option<String>,
    /// Size in pixels.
    pub extent: Extent2D,
    /// Pixel format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: ImageUsage,
}

impl ImageDescriptor {
    /// Create a new image descriptor.
    pub fn new(extent: Extent2D, format: TextureFormat, usage: ImageUsage) -> Self {
        Self {
            label: None,
            extent,
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label for logs and allocator names.
    pub fn label_or_default(&self) -> &str {
        self.label.as_deref().unwrap_or("image")
    }
}
