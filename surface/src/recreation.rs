//! Recreation controller.
//!
//! Owns everything whose size follows the surface (presentation chain, depth
//! target, framebuffers) and rebuilds it wholesale when the surface changes.
//!
//! # States
//!
//! ```text
//!            resize / stale / suboptimal
//!   Live ───────────────────────────────▶ Rebuilding
//!    ▲                                     │     │
//!    └──────────── rebuild done ───────────┘     │ zero extent
//!                                                ▼
//!   Rebuilding ◀──── nonzero resize ──────── Suspended
//! ```
//!
//! Rebuilding waits for device idle, destroys framebuffers, the depth view,
//! the depth image, the swapchain views and the swapchain (in that order),
//! then recreates the swapchain, the depth target and the framebuffers.
//! While suspended no GPU calls are made.

use crate::allocator::{GpuImage, ResourceAllocator};
use crate::backend::{BackendError, GpuDevice};
use crate::config::SurfaceConfig;
use crate::device::DeviceContext;
use crate::error::{InitError, SurfaceError, SwapchainError};
use crate::presentation::PresentationChain;
use crate::types::{
    Extent2D, FramebufferHandle, ImageAspect, ImageDescriptor, ImageUsage, ImageViewHandle,
    RenderPassHandle, TextureFormat,
};

/// State of the recreation controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecreationState {
    /// Extent-dependent resources match the surface; frames can be rendered.
    Live,
    /// A rebuild is pending or in progress.
    Rebuilding,
    /// The surface has zero area; nothing is rendered and no GPU calls are made.
    Suspended,
}

/// Depth image and view sized to the presentation chain.
#[derive(Debug)]
pub struct DepthTarget {
    image: GpuImage,
    view: ImageViewHandle,
}

impl DepthTarget {
    /// Allocate the depth image and create its view.
    pub fn create(
        ctx: &DeviceContext,
        allocator: &mut ResourceAllocator,
        extent: Extent2D,
        format: TextureFormat,
    ) -> Result<Self, SurfaceError> {
        let image = allocator.create_image(
            &ImageDescriptor::new(extent, format, ImageUsage::DEPTH_STENCIL_ATTACHMENT)
                .with_label("depth target"),
        )?;
        let view = match ctx
            .device()
            .create_image_view(image.handle(), format, ImageAspect::Depth)
        {
            Ok(view) => view,
            Err(error) => {
                if let Err(e) = allocator.destroy_image(image) {
                    log::warn!("Failed to free depth image after view error: {}", e);
                }
                return Err(error.into());
            }
        };
        Ok(Self { image, view })
    }

    /// Destroy the view, then the image and its memory.
    pub fn destroy(
        self,
        ctx: &DeviceContext,
        allocator: &mut ResourceAllocator,
    ) -> Result<(), SurfaceError> {
        ctx.device().destroy_image_view(self.view);
        allocator.destroy_image(self.image)
    }

    /// Get the depth view.
    pub fn view(&self) -> ImageViewHandle {
        self.view
    }

    /// Get the depth image.
    pub fn image(&self) -> &GpuImage {
        &self.image
    }

    /// Get the extent.
    pub fn extent(&self) -> Extent2D {
        self.image.extent()
    }
}

/// Builds the objects that reference the chain's views (usually framebuffers).
///
/// `build` is called after every successful chain rebuild; `destroy` before
/// the depth target and the chain are torn down.
pub trait RenderTargetBuilder {
    /// Create targets for the current chain and depth target.
    fn build(
        &mut self,
        device: &dyn GpuDevice,
        chain: &PresentationChain,
        depth: &DepthTarget,
    ) -> Result<(), BackendError>;

    /// Destroy everything created by `build`. Must tolerate being called twice.
    fn destroy(&mut self, device: &dyn GpuDevice);
}

/// One framebuffer per swapchain view, each with the shared depth view.
#[derive(Debug)]
pub struct FramebufferSet {
    render_pass: RenderPassHandle,
    framebuffers: Vec<FramebufferHandle>,
}

impl FramebufferSet {
    /// Create an empty set for `render_pass`.
    pub fn new(render_pass: RenderPassHandle) -> Self {
        Self {
            render_pass,
            framebuffers: Vec::new(),
        }
    }

    /// Get the framebuffers, indexed like the chain's images.
    pub fn framebuffers(&self) -> &[FramebufferHandle] {
        &self.framebuffers
    }
}

impl RenderTargetBuilder for FramebufferSet {
    fn build(
        &mut self,
        device: &dyn GpuDevice,
        chain: &PresentationChain,
        depth: &DepthTarget,
    ) -> Result<(), BackendError> {
        self.destroy(device);
        for &view in chain.views() {
            match device.create_framebuffer(self.render_pass, &[view, depth.view()], chain.extent())
            {
                Ok(framebuffer) => self.framebuffers.push(framebuffer),
                Err(error) => {
                    self.destroy(device);
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    fn destroy(&mut self, device: &dyn GpuDevice) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
    }
}

/// Coordinates teardown and rebuild of extent-dependent resources.
pub struct RecreationController {
    state: RecreationState,
    target_extent: Extent2D,
    chain: Option<PresentationChain>,
    depth: Option<DepthTarget>,
    targets: Option<Box<dyn RenderTargetBuilder>>,
    config: SurfaceConfig,
    rebuild_count: u64,
}

impl std::fmt::Debug for RecreationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecreationController")
            .field("state", &self.state)
            .field("target_extent", &self.target_extent)
            .field("chain", &self.chain)
            .field("depth", &self.depth)
            .field("rebuild_count", &self.rebuild_count)
            .finish()
    }
}

impl RecreationController {
    /// Build the initial chain, depth target and render targets at `extent`.
    ///
    /// A zero extent starts the controller suspended with nothing built.
    pub fn new(
        ctx: &DeviceContext,
        allocator: &mut ResourceAllocator,
        extent: Extent2D,
        config: SurfaceConfig,
        targets: Option<Box<dyn RenderTargetBuilder>>,
    ) -> Result<Self, InitError> {
        let mut controller = Self {
            state: RecreationState::Rebuilding,
            target_extent: extent,
            chain: None,
            depth: None,
            targets,
            config,
            rebuild_count: 0,
        };
        if let Err(error) = controller.process(ctx, allocator) {
            if let Err(e) = controller.teardown(ctx, allocator) {
                log::warn!("Cleanup after failed initial build also failed: {}", e);
            }
            return Err(error);
        }
        Ok(controller)
    }

    /// Record a new surface extent.
    pub fn notify_resize(&mut self, extent: Extent2D) {
        self.target_extent = extent;
        match self.state {
            RecreationState::Live => {
                if self.chain.as_ref().map(PresentationChain::extent) != Some(extent) {
                    log::debug!("Resize to {} requested", extent);
                    self.state = RecreationState::Rebuilding;
                }
            }
            RecreationState::Suspended => {
                if !extent.is_empty() {
                    log::debug!("Resuming at {}", extent);
                    self.state = RecreationState::Rebuilding;
                }
            }
            RecreationState::Rebuilding => {}
        }
    }

    /// Route a frame error. Returns `true` if the error was absorbed (a
    /// rebuild is scheduled or the controller is suspended).
    pub fn notify_swapchain_error(&mut self, error: &SwapchainError) -> bool {
        if !error.is_recoverable() {
            return false;
        }
        if self.state == RecreationState::Live {
            log::debug!("Swapchain reported {}, scheduling rebuild", error);
            self.state = RecreationState::Rebuilding;
        }
        true
    }

    /// Run a pending rebuild.
    ///
    /// Returns the resulting state. A zero target extent suspends without any
    /// GPU calls. Any failure is fatal; the controller stays `Rebuilding` and
    /// must not be used for rendering.
    pub fn process(
        &mut self,
        ctx: &DeviceContext,
        allocator: &mut ResourceAllocator,
    ) -> Result<RecreationState, InitError> {
        if self.state != RecreationState::Rebuilding {
            return Ok(self.state);
        }
        if self.target_extent.is_empty() {
            log::info!("Surface has zero area, suspending");
            self.state = RecreationState::Suspended;
            return Ok(self.state);
        }

        ctx.wait_idle()?;
        self.destroy_dependents(ctx, allocator)?;

        let extent = self.target_extent;
        let built = match self.chain.take() {
            Some(mut chain) => chain.rebuild(ctx, extent, &self.config).map(|()| chain),
            None => PresentationChain::build(ctx, extent, &self.config),
        };
        let chain = match built {
            Ok(chain) => self.chain.insert(chain),
            Err(SwapchainError::DegenerateExtent(actual)) => {
                log::info!("Surface reports degenerate extent {}, suspending", actual);
                self.state = RecreationState::Suspended;
                return Ok(self.state);
            }
            Err(error) => return Err(InitError::Rebuild(error)),
        };

        let depth = self.depth.insert(DepthTarget::create(
            ctx,
            allocator,
            chain.extent(),
            self.config.depth_format,
        )?);
        if let Some(targets) = self.targets.as_mut() {
            targets.build(ctx.device(), chain, depth)?;
        }

        self.rebuild_count += 1;
        self.state = RecreationState::Live;
        log::info!(
            "Extent-dependent resources rebuilt at {} (rebuild #{})",
            chain.extent(),
            self.rebuild_count
        );
        Ok(self.state)
    }

    /// Rebuild at `extent` right away.
    pub fn rebuild(
        &mut self,
        ctx: &DeviceContext,
        allocator: &mut ResourceAllocator,
        extent: Extent2D,
    ) -> Result<RecreationState, InitError> {
        self.target_extent = extent;
        self.state = RecreationState::Rebuilding;
        self.process(ctx, allocator)
    }

    /// Destroy everything the controller owns. Safe to call twice.
    ///
    /// The caller must have waited for device idle.
    pub fn teardown(
        &mut self,
        ctx: &DeviceContext,
        allocator: &mut ResourceAllocator,
    ) -> Result<(), SurfaceError> {
        self.destroy_dependents(ctx, allocator)?;
        if let Some(chain) = self.chain.as_mut() {
            chain.teardown(ctx);
        }
        self.chain = None;
        self.state = RecreationState::Suspended;
        Ok(())
    }

    /// Framebuffers, then the depth target.
    fn destroy_dependents(
        &mut self,
        ctx: &DeviceContext,
        allocator: &mut ResourceAllocator,
    ) -> Result<(), SurfaceError> {
        if let Some(targets) = self.targets.as_mut() {
            targets.destroy(ctx.device());
        }
        if let Some(depth) = self.depth.take() {
            depth.destroy(ctx, allocator)?;
        }
        Ok(())
    }

    /// Get the current state.
    pub fn state(&self) -> RecreationState {
        self.state
    }

    /// Get the presentation chain, if built.
    pub fn chain(&self) -> Option<&PresentationChain> {
        self.chain.as_ref()
    }

    /// Get the depth target, if built.
    pub fn depth(&self) -> Option<&DepthTarget> {
        self.depth.as_ref()
    }

    /// The most recently requested extent.
    pub fn target_extent(&self) -> Extent2D {
        self.target_extent
    }

    /// Number of completed builds, including the initial one.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    /// Get the configuration.
    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }
}
