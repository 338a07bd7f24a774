//! Command line arguments for the demos.
//!
//! Uses clap for parsing, with help text (`--help`) and clear error messages.

use clap::Parser;
use redlilium_surface::{PresentMode, SurfaceConfig};

/// RedLilium surface demo arguments.
///
/// # Examples
///
/// ```bash
/// # Show help
/// ./surface_demo --help
///
/// # Run for 100 frames then exit (useful for testing)
/// ./surface_demo --max-frames 100
///
/// # Small window, no validation, rebuild on every resize event
/// ./surface_demo --width 640 --height 480 --no-validation --resize-debounce-ms 0
/// ```
#[derive(Parser, Debug, Clone)]
#[command(
    name = "surface_demo",
    about = "RedLilium surface lifetime demo",
    long_about = "Opens a window and clears it every frame through the RedLilium \
        surface library.\n\n\
        KEYS:\n\
          M          push a mesh (alternating triangle and plane)\n\
          Backspace  pop the most recent mesh\n\
          Escape     quit",
    version
)]
pub struct DemoArgs {
    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    pub width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "720")]
    pub height: u32,

    /// Disable vertical sync (requests mailbox presentation).
    #[arg(long)]
    pub no_vsync: bool,

    /// Exit after rendering N frames (useful for testing).
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Enable GPU validation layers (slower but helps catch bugs).
    #[arg(long, conflicts_with = "no_validation")]
    pub validation: bool,

    /// Disable GPU validation layers.
    #[arg(long, conflicts_with = "validation")]
    pub no_validation: bool,

    /// Time the window size must be stable before the swapchain is rebuilt.
    #[arg(long, default_value = "100")]
    pub resize_debounce_ms: u64,
}

impl DemoArgs {
    /// Whether validation layers are requested.
    ///
    /// `--validation` forces on, `--no-validation` forces off, otherwise on in
    /// debug builds.
    pub fn validation_enabled(&self) -> bool {
        self.validation || (!self.no_validation && cfg!(debug_assertions))
    }

    /// Present mode derived from the vsync flag.
    pub fn present_mode(&self) -> PresentMode {
        if self.no_vsync {
            PresentMode::Mailbox
        } else {
            PresentMode::Fifo
        }
    }

    /// Build the surface configuration for these arguments.
    pub fn surface_config(&self) -> SurfaceConfig {
        SurfaceConfig::default()
            .with_application_name("RedLilium Surface Demo")
            .with_validation(self.validation_enabled())
            .with_present_mode(self.present_mode())
            .with_resize_debounce_ms(self.resize_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let args = DemoArgs::try_parse_from(["surface_demo"]).unwrap();
        assert_eq!((args.width, args.height), (1280, 720));
        assert_eq!(args.max_frames, None);
        assert_eq!(args.present_mode(), PresentMode::Fifo);
        assert_eq!(args.validation_enabled(), cfg!(debug_assertions));

        let config = args.surface_config();
        assert_eq!(config.resize_debounce_ms, 100);
        assert_eq!(config.present_mode, PresentMode::Fifo);
    }

    #[rstest]
    #[case(&["surface_demo", "--validation"], true)]
    #[case(&["surface_demo", "--no-validation"], false)]
    fn test_validation_flags(#[case] argv: &[&str], #[case] expected: bool) {
        let args = DemoArgs::try_parse_from(argv).unwrap();
        assert_eq!(args.validation_enabled(), expected);
        assert_eq!(args.surface_config().validation, expected);
    }

    #[test]
    fn test_validation_flags_conflict() {
        assert!(
            DemoArgs::try_parse_from(["surface_demo", "--validation", "--no-validation"]).is_err()
        );
    }

    #[test]
    fn test_explicit_values() {
        let args = DemoArgs::try_parse_from([
            "surface_demo",
            "--width",
            "640",
            "--height",
            "480",
            "--no-vsync",
            "--max-frames",
            "10",
            "--resize-debounce-ms",
            "0",
        ])
        .unwrap();

        assert_eq!((args.width, args.height), (640, 480));
        assert_eq!(args.max_frames, Some(10));
        assert_eq!(args.present_mode(), PresentMode::Mailbox);
        assert_eq!(args.surface_config().resize_debounce_ms, 0);
    }
}
