//! Window and presentation integration test on the Vulkan backend.
//!
//! Opens a small window, builds a surface session for it, renders a few
//! cleared frames, forces one resize and shuts down.
//!
//! # CI Compatibility
//!
//! If window creation fails (headless CI) or no Vulkan device can present to
//! the surface, the test passes as skipped.
//!
//! # Running This Test
//!
//! ```bash
//! cargo test --test window_test
//! ```

#![cfg(feature = "vulkan-backend")]

use rstest::rstest;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;
#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios", target_os = "android"))))]
use winit::platform::x11::EventLoopBuilderExtX11;
use winit::window::{Window, WindowId};

use redlilium_surface::backend::vulkan::VulkanInstance;
use redlilium_surface::{
    Extent2D, FrameOutcome, PresentMode, SurfaceConfig, SurfaceError, SurfaceSession,
};

/// Number of frames to render before exiting.
const FRAMES_TO_RENDER: u32 = 5;

/// Frame after which the window is resized once.
const RESIZE_AT_FRAME: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestResult {
    Running,
    Passed,
    /// Window or device not available.
    Skipped,
    Failed,
}

struct WindowTestApp {
    result: TestResult,
    present_mode: PresentMode,
    // Dropped before the window.
    session: Option<SurfaceSession>,
    window: Option<Window>,
    frame_count: u32,
    window_size: (u32, u32),
    resized: bool,
}

impl WindowTestApp {
    fn new(present_mode: PresentMode) -> Self {
        Self {
            result: TestResult::Running,
            present_mode,
            session: None,
            window: None,
            frame_count: 0,
            window_size: (320, 240),
            resized: false,
        }
    }

    /// Set up Vulkan for the window. Returns `false` when unavailable.
    fn init_session(&mut self) -> bool {
        let Some(window) = &self.window else {
            log::warn!("No window available for session init");
            return false;
        };

        let config = SurfaceConfig::default()
            .with_application_name("RedLilium Window Test")
            .with_present_mode(self.present_mode)
            .with_resize_debounce_ms(0);

        let instance = match VulkanInstance::new(&config, window) {
            Ok(instance) => instance,
            Err(e) => {
                log::warn!("Failed to create Vulkan instance: {}", e);
                return false;
            }
        };

        // SAFETY: the window outlives the session, which owns the surface.
        let surface = match unsafe { instance.create_surface(window) } {
            Ok(surface) => surface,
            Err(e) => {
                log::warn!("Failed to create surface: {}", e);
                return false;
            }
        };

        let size = window.inner_size();
        let extent = Extent2D::new(size.width, size.height);
        match SurfaceSession::new(Box::new(instance), surface, extent, config, None) {
            Ok(session) => {
                log::info!(
                    "Session initialized on {} at {}",
                    session.context().adapter().name,
                    extent
                );
                self.session = Some(session);
                true
            }
            Err(e) => {
                log::warn!("Failed to create surface session: {}", e);
                false
            }
        }
    }

    fn render_frame(&mut self) -> Result<(), SurfaceError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let hue = (self.frame_count as f32 / FRAMES_TO_RENDER as f32) * 360.0;
        let (r, g, b) = hue_to_rgb(hue);

        match session.render_frame(|frame| frame.clear([r, g, b, 1.0]))? {
            FrameOutcome::Presented {
                image_index,
                rebuilt,
            } => {
                log::info!(
                    "Frame {} presented to image {} (rebuilt: {})",
                    self.frame_count,
                    image_index,
                    rebuilt
                );
                self.frame_count += 1;
            }
            FrameOutcome::Recreated => log::info!("Swapchain recreated, frame dropped"),
            FrameOutcome::Skipped => log::debug!("Frame skipped"),
        }
        Ok(())
    }

    fn finish(&mut self, result: TestResult) {
        self.result = result;
        if let Some(session) = self.session.take() {
            match session.shutdown() {
                Ok(report) if report.is_clean() => {}
                Ok(report) => {
                    log::error!("Allocations left after shutdown: {:?}", report);
                    self.result = TestResult::Failed;
                }
                Err(e) => {
                    log::error!("Shutdown failed: {}", e);
                    self.result = TestResult::Failed;
                }
            }
        }
    }

    fn is_complete(&self) -> bool {
        !matches!(self.result, TestResult::Running)
    }
}

impl ApplicationHandler for WindowTestApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title("RedLilium Window Test")
            .with_inner_size(PhysicalSize::new(self.window_size.0, self.window_size.1))
            .with_visible(true);

        match event_loop.create_window(window_attributes) {
            Ok(window) => {
                log::info!("Test window created");
                self.window = Some(window);
                if !self.init_session() {
                    log::info!("Vulkan initialization failed, skipping test");
                    self.finish(TestResult::Skipped);
                    event_loop.exit();
                }
            }
            Err(e) => {
                log::info!("Window creation failed (expected on CI): {}", e);
                self.finish(TestResult::Skipped);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.finish(TestResult::Failed);
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.window_size = (size.width, size.height);
                if let Some(session) = self.session.as_mut() {
                    session.resize(Extent2D::new(size.width, size.height));
                }
            }
            WindowEvent::RedrawRequested => {
                if self.session.is_none() {
                    return;
                }
                if let Err(e) = self.render_frame() {
                    log::error!("Frame rendering failed: {}", e);
                    self.finish(TestResult::Failed);
                    event_loop.exit();
                    return;
                }

                if self.frame_count == RESIZE_AT_FRAME && !self.resized {
                    self.resized = true;
                    if let Some(window) = &self.window {
                        let _ = window.request_inner_size(PhysicalSize::new(400, 300));
                    }
                }

                if self.frame_count >= FRAMES_TO_RENDER {
                    log::info!("Rendered {} frames, test passed", FRAMES_TO_RENDER);
                    self.finish(TestResult::Passed);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

/// Convert hue (0-360) to RGB (0-1).
fn hue_to_rgb(hue: f32) -> (f32, f32, f32) {
    let h = hue / 60.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();

    match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    }
}

/// Pump the event loop until the test finishes or times out.
///
/// Returns true if the test passed or was skipped.
fn run_window_test(present_mode: PresentMode) -> bool {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    log::info!("Starting window test with {:?}", present_mode);

    // Tests run off the main thread.
    #[cfg(any(
        target_os = "windows",
        all(unix, not(any(target_os = "macos", target_os = "ios", target_os = "android")))
    ))]
    let event_loop = EventLoop::builder().with_any_thread(true).build();
    #[cfg(not(any(
        target_os = "windows",
        all(unix, not(any(target_os = "macos", target_os = "ios", target_os = "android")))
    )))]
    let event_loop = match std::panic::catch_unwind(EventLoop::new) {
        Ok(result) => result,
        Err(_) => {
            log::error!("Event loop creation panicked (not on the main thread)");
            return false;
        }
    };

    let mut event_loop = match event_loop {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::info!("Event loop creation failed (expected on CI): {}", e);
            return true;
        }
    };

    let mut app = WindowTestApp::new(present_mode);
    let max_iterations = 1000;
    let mut iterations = 0;

    loop {
        match event_loop.pump_app_events(None, &mut app) {
            PumpStatus::Exit(_code) => break,
            PumpStatus::Continue => {
                if app.is_complete() {
                    break;
                }
                iterations += 1;
                if iterations >= max_iterations {
                    log::warn!("Test timed out after {} iterations", max_iterations);
                    app.finish(TestResult::Failed);
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }
    }

    // Release the session even if the loop exited on its own.
    if app.session.is_some() {
        let result = app.result;
        app.finish(result);
    }

    match app.result {
        TestResult::Passed => true,
        TestResult::Skipped => {
            log::info!("Window test skipped (no display or device)");
            true
        }
        TestResult::Failed | TestResult::Running => {
            log::error!("Window test failed with {:?}", app.result);
            false
        }
    }
}

#[rstest]
fn test_window_session_5_frames() {
    assert!(
        run_window_test(PresentMode::Fifo),
        "Window session test failed - see log for details"
    );
}
