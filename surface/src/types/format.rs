//! Surface and texture formats, color spaces and present modes.

/// Pixel format of an image.
///
/// Only the formats the surface code cares about get a named variant. Anything
/// else reported by the driver is carried through as [`TextureFormat::Other`]
/// so that the "first reported format" fallback still works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit BGRA, linear.
    Bgra8Unorm,
    /// 8-bit BGRA, sRGB encoded.
    Bgra8UnormSrgb,
    /// 8-bit RGBA, linear.
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB encoded.
    Rgba8UnormSrgb,
    /// 10-bit RGB with 2-bit alpha.
    Rgb10a2Unorm,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// 32-bit float depth.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 16-bit depth.
    Depth16Unorm,
    /// A format without a named variant (raw backend value).
    Other(i32),
}

impl TextureFormat {
    /// Check if this is a depth format.
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            Self::Depth32Float | Self::Depth24PlusStencil8 | Self::Depth16Unorm
        )
    }

    /// Check if this format performs sRGB encoding on write.
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Bgra8UnormSrgb | Self::Rgba8UnormSrgb)
    }
}

/// Color space a surface format is presented in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    /// Non-linear sRGB, the one every surface supports.
    #[default]
    SrgbNonlinear,
    /// Any other color space (raw backend value).
    Other(i32),
}

/// A format/color-space pair reported by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    /// Pixel format of the swapchain images.
    pub format: TextureFormat,
    /// Color space of the presentation engine.
    pub color_space: ColorSpace,
}

impl SurfaceFormat {
    /// Create a surface format in the sRGB non-linear color space.
    pub const fn srgb(format: TextureFormat) -> Self {
        Self {
            format,
            color_space: ColorSpace::SrgbNonlinear,
        }
    }
}

impl Default for SurfaceFormat {
    fn default() -> Self {
        Self::srgb(TextureFormat::Bgra8UnormSrgb)
    }
}

/// Presentation mode for the swapchain.
///
/// Controls how frames are synchronized with the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    /// No synchronization. May cause tearing but has lowest latency.
    Immediate,
    /// Triple buffering. Low latency without tearing.
    Mailbox,
    /// VSync enabled. No tearing, bounded latency. Always supported.
    #[default]
    Fifo,
    /// VSync with relaxed timing. May tear if a frame is late.
    FifoRelaxed,
}

impl PresentMode {
    /// Check if this mode is locked to the display's vertical sync.
    pub fn is_vsync(&self) -> bool {
        matches!(self, Self::Fifo | Self::FifoRelaxed)
    }
}
