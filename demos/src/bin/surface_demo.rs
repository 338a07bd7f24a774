//! # Surface Demo
//!
//! Opens a window and drives a [`SurfaceSession`] from the winit event loop:
//! clears every frame, forwards resizes, idles while minimized and
//! pushes/pops meshes from the keyboard.

use clap::Parser;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use redlilium_demos::DemoArgs;
use redlilium_surface::backend::vulkan::VulkanInstance;
use redlilium_surface::{Extent2D, FrameOutcome, MeshData, SurfaceError, SurfaceSession};

/// Main application state
struct App {
    args: DemoArgs,
    // Dropped before the window.
    session: Option<SurfaceSession>,
    window: Option<Window>,
    frames_presented: u64,
    failed: bool,
}

impl App {
    fn new(args: DemoArgs) -> Self {
        Self {
            args,
            session: None,
            window: None,
            frames_presented: 0,
            failed: false,
        }
    }

    fn init_session(&self, window: &Window) -> Result<SurfaceSession, SurfaceError> {
        let config = self.args.surface_config();
        let instance = VulkanInstance::new(&config, window)?;
        // SAFETY: the session is shut down before the window is dropped.
        let surface = unsafe { instance.create_surface(window) }?;

        let size = window.inner_size();
        let session = SurfaceSession::new(
            Box::new(instance),
            surface,
            Extent2D::new(size.width, size.height),
            config,
            None,
        )?;
        log::info!("Rendering on {}", session.context().adapter().name);
        Ok(session)
    }

    fn render_frame(&mut self) -> Result<(), SurfaceError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let t = self.frames_presented as f32 * 0.01;
        let color = [
            0.5 + 0.4 * t.sin(),
            0.5 + 0.4 * (t + 2.1).sin(),
            0.5 + 0.4 * (t + 4.2).sin(),
            1.0,
        ];

        match session.render_frame(|frame| {
            log::trace!(
                "Recording frame into image {} with {} mesh(es)",
                frame.image_index(),
                frame.meshes().len()
            );
            frame.clear(color)
        })? {
            FrameOutcome::Presented { rebuilt, .. } => {
                if rebuilt {
                    log::info!("Swapchain rebuilt");
                }
                self.frames_presented += 1;
            }
            FrameOutcome::Recreated => log::info!("Swapchain was stale, rebuilt"),
            FrameOutcome::Skipped => {}
        }
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let result = match code {
            KeyCode::KeyM => {
                let mesh = if session.meshes().len() % 2 == 0 {
                    MeshData::triangle()
                } else {
                    MeshData::plane(0.5)
                };
                session.push_mesh(&mesh).map(|count| {
                    log::info!("Pushed {} ({} mesh(es))", mesh.label, count);
                })
            }
            KeyCode::Backspace => session.pop_mesh().map(|popped| {
                if popped {
                    log::info!("Popped mesh ({} left)", session.meshes().len());
                } else {
                    log::info!("No meshes to pop");
                }
            }),
            KeyCode::Escape => {
                event_loop.exit();
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            log::error!("Mesh operation failed: {}", e);
            self.failed = true;
            event_loop.exit();
        }
    }

    fn shutdown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match session.shutdown() {
            Ok(report) if report.is_clean() => log::info!("Shut down cleanly"),
            Ok(report) => {
                log::error!("Allocations left after shutdown: {:?}", report);
                self.failed = true;
            }
            Err(e) => {
                log::error!("Shutdown failed: {}", e);
                self.failed = true;
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title("RedLilium Surface Demo")
            .with_inner_size(PhysicalSize::new(self.args.width, self.args.height));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => window,
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                self.failed = true;
                event_loop.exit();
                return;
            }
        };

        match self.init_session(&window) {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                log::error!("Failed to initialize surface session: {}", e);
                self.failed = true;
                event_loop.exit();
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(session) = self.session.as_mut() {
                    session.resize(Extent2D::new(size.width, size.height));
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, code),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    log::error!("Frame failed: {}", e);
                    self.failed = true;
                    event_loop.exit();
                    return;
                }
                if let Some(max_frames) = self.args.max_frames
                    && self.frames_presented >= max_frames
                {
                    log::info!("Reached {} frames, exiting", max_frames);
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

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = DemoArgs::parse();
    log::info!("RedLilium surface demo v{}", redlilium_demos::VERSION);
    redlilium_surface::init();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(args);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", e);
        app.failed = true;
    }
    app.shutdown();

    if app.failed {
        std::process::exit(1);
    }
}
