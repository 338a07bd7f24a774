//! Surface session configuration.

use crate::types::{PresentMode, SurfaceFormat, TextureFormat};

/// Configuration for a rendering surface and its presentation chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    /// Application name reported to the driver.
    pub application_name: String,
    /// Enable validation layers (debug builds by default).
    pub validation: bool,
    /// Preferred swapchain format; the first supported format is used otherwise.
    pub preferred_format: SurfaceFormat,
    /// Preferred present mode; falls back to FIFO, which is always available.
    pub present_mode: PresentMode,
    /// Format of the depth target created alongside the swapchain.
    pub depth_format: TextureFormat,
    /// Color the frame is cleared to.
    pub clear_color: [f32; 4],
    /// Time a window size must be stable before the chain is rebuilt.
    pub resize_debounce_ms: u64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            application_name: "RedLilium".to_string(),
            validation: cfg!(debug_assertions),
            preferred_format: SurfaceFormat::default(),
            present_mode: PresentMode::Fifo,
            depth_format: TextureFormat::Depth32Float,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            resize_debounce_ms: 100,
        }
    }
}

impl SurfaceConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the preferred swapchain format.
    pub fn with_preferred_format(mut self, format: SurfaceFormat) -> Self {
        self.preferred_format = format;
        self
    }

    /// Set the preferred present mode.
    pub fn with_present_mode(mut self, present_mode: PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    /// Set the depth target format.
    pub fn with_depth_format(mut self, format: TextureFormat) -> Self {
        self.depth_format = format;
        self
    }

    /// Set the clear color.
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the resize debounce time. Zero rebuilds on every resize event.
    pub fn with_resize_debounce_ms(mut self, ms: u64) -> Self {
        self.resize_debounce_ms = ms;
        self
    }
}
