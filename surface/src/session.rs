//! Surface session: the render loop over all components.
//!
//! [`SurfaceSession`] owns every component and enforces their ordering:
//!
//! ```text
//! new:      DeviceContext → ResourceAllocator → RecreationController
//!           (chain, depth, targets) → sync slot + command buffer
//! frame:    [resize / rebuild] → acquire → record → submit → present
//! shutdown: idle → meshes → sync slot → command buffer → controller
//!           → allocator → DeviceContext
//! ```
//!
//! Stale and suboptimal swapchain results are absorbed here by rebuilding
//! immediately; every other error is returned to the caller, who should call
//! [`SurfaceSession::shutdown`] and stop.

use crate::allocator::{AllocatorReport, ResourceAllocator};
use crate::backend::{BackendError, GpuDevice, GpuInstance};
use crate::config::SurfaceConfig;
use crate::device::DeviceContext;
use crate::error::{SurfaceError, SwapchainError};
use crate::frame::FrameSynchronizer;
use crate::mesh::{MeshData, MeshPool};
use crate::recreation::{DepthTarget, RecreationController, RecreationState, RenderTargetBuilder};
use crate::resize::ResizeManager;
use crate::types::{CommandBufferHandle, Extent2D, ImageHandle, ImageViewHandle, SurfaceHandle};

/// What [`SurfaceSession::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted for presentation.
    Presented {
        /// Swapchain image the frame was rendered to.
        image_index: u32,
        /// The chain was rebuilt during this call (before or after the frame).
        rebuilt: bool,
    },
    /// The swapchain was stale on acquire; it was rebuilt and nothing was drawn.
    Recreated,
    /// The surface has zero area; nothing was done.
    Skipped,
}

/// Everything the recording callback needs for one frame.
pub struct FrameContext<'a> {
    device: &'a dyn GpuDevice,
    command_buffer: CommandBufferHandle,
    image_index: u32,
    image: ImageHandle,
    view: ImageViewHandle,
    depth_view: Option<ImageViewHandle>,
    extent: Extent2D,
    meshes: &'a MeshPool,
    clear_color: [f32; 4],
}

impl FrameContext<'_> {
    /// Record a clear of the acquired image that leaves it ready to present.
    pub fn clear(&self, color: [f32; 4]) -> Result<(), BackendError> {
        self.device.record_clear(self.command_buffer, self.image, color)
    }

    /// Get the device.
    pub fn device(&self) -> &dyn GpuDevice {
        self.device
    }

    /// Get the command buffer to record into.
    pub fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    /// Get the acquired image index.
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Get the acquired image.
    pub fn image(&self) -> ImageHandle {
        self.image
    }

    /// Get the acquired image's view.
    pub fn view(&self) -> ImageViewHandle {
        self.view
    }

    /// Get the depth view, if a depth target exists.
    pub fn depth_view(&self) -> Option<ImageViewHandle> {
        self.depth_view
    }

    /// Get the chain extent.
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Get the meshes to draw.
    pub fn meshes(&self) -> &MeshPool {
        self.meshes
    }

    /// Get the configured clear color.
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }
}

/// Owns the device, the allocator, the presentation chain and the meshes.
pub struct SurfaceSession {
    frames: FrameSynchronizer,
    command_buffer: CommandBufferHandle,
    meshes: MeshPool,
    controller: RecreationController,
    resizer: ResizeManager,
    allocator: ResourceAllocator,
    ctx: DeviceContext,
    frame_count: u64,
}

impl std::fmt::Debug for SurfaceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceSession")
            .field("ctx", &self.ctx)
            .field("controller", &self.controller)
            .field("meshes", &self.meshes.len())
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

impl SurfaceSession {
    /// Acquire a device for `surface` and build everything at `extent`.
    ///
    /// Anything created before a failure is released again.
    pub fn new(
        instance: Box<dyn GpuInstance>,
        surface: SurfaceHandle,
        extent: Extent2D,
        config: SurfaceConfig,
        targets: Option<Box<dyn RenderTargetBuilder>>,
    ) -> Result<Self, SurfaceError> {
        let ctx = DeviceContext::acquire(instance, surface)?;

        let mut allocator = match ResourceAllocator::init(&ctx) {
            Ok(allocator) => allocator,
            Err(error) => {
                release_quietly(ctx);
                return Err(error.into());
            }
        };

        let resizer = ResizeManager::new(extent, config.resize_debounce_ms);
        let controller =
            match RecreationController::new(&ctx, &mut allocator, extent, config, targets) {
                Ok(controller) => controller,
                Err(error) => {
                    allocator.shutdown();
                    release_quietly(ctx);
                    return Err(error.into());
                }
            };

        let mut session = Self {
            frames: FrameSynchronizer::new(),
            command_buffer: CommandBufferHandle::NULL,
            meshes: MeshPool::new(),
            controller,
            resizer,
            allocator,
            ctx,
            frame_count: 0,
        };
        if let Err(error) = session.create_frame_resources() {
            if let Err(e) = session.shutdown() {
                log::warn!("Cleanup after failed session setup also failed: {}", e);
            }
            return Err(error.into());
        }

        log::info!("Surface session ready at {}", extent);
        Ok(session)
    }

    fn create_frame_resources(&mut self) -> Result<(), BackendError> {
        self.frames.create_slot(&self.ctx)?;
        self.command_buffer = self.ctx.device().allocate_command_buffer()?;
        Ok(())
    }

    /// Report a new window extent. Applied after the debounce period.
    pub fn resize(&mut self, extent: Extent2D) {
        self.resizer.on_resize_event(extent);
    }

    /// Render and present one frame, recording commands with `record`.
    ///
    /// Does nothing while the surface has zero area. Rebuilds the chain first
    /// when a resize is due and right after a stale or suboptimal result.
    pub fn render_frame<F>(&mut self, record: F) -> Result<FrameOutcome, SurfaceError>
    where
        F: FnOnce(&FrameContext<'_>) -> Result<(), BackendError>,
    {
        if let Some(event) = self.resizer.update() {
            self.controller.notify_resize(event.extent);
        }
        let mut rebuilt = self.rebuild_if_pending()?;
        if self.controller.state() != RecreationState::Live {
            return Ok(FrameOutcome::Skipped);
        }
        let Some(chain) = self.controller.chain() else {
            return Ok(FrameOutcome::Skipped);
        };

        let frame = match self.frames.acquire_frame(&self.ctx, chain) {
            Ok(frame) => frame,
            Err(SurfaceError::Swapchain(error)) if error.is_recoverable() => {
                self.controller.notify_swapchain_error(&error);
                self.rebuild_if_pending()?;
                return Ok(FrameOutcome::Recreated);
            }
            Err(error) => return Err(error),
        };

        let Some(chain) = self.controller.chain() else {
            return Ok(FrameOutcome::Skipped);
        };
        let index = frame.image_index as usize;
        let (Some(&image), Some(&view)) = (chain.images().get(index), chain.views().get(index))
        else {
            return Err(BackendError::Internal(format!(
                "acquired image {} but the chain has {}",
                index,
                chain.image_count()
            ))
            .into());
        };

        let frame_ctx = FrameContext {
            device: self.ctx.device(),
            command_buffer: self.command_buffer,
            image_index: frame.image_index,
            image,
            view,
            depth_view: self.controller.depth().map(DepthTarget::view),
            extent: chain.extent(),
            meshes: &self.meshes,
            clear_color: self.controller.config().clear_color,
        };
        if let Err(error) = record(&frame_ctx) {
            self.frames.abandon_frame(&self.ctx)?;
            return Err(error.into());
        }

        let presented = self.frames.submit_and_present(
            &self.ctx,
            chain,
            frame.image_index,
            self.command_buffer,
        );
        self.frame_count += 1;

        let stale = match presented {
            Ok(()) if frame.suboptimal => Some(SwapchainError::Suboptimal),
            Ok(()) => None,
            Err(SurfaceError::Swapchain(error)) if error.is_recoverable() => Some(error),
            Err(error) => return Err(error),
        };
        if let Some(error) = stale {
            self.controller.notify_swapchain_error(&error);
            rebuilt |= self.rebuild_if_pending()?;
        }

        Ok(FrameOutcome::Presented {
            image_index: frame.image_index,
            rebuilt,
        })
    }

    fn rebuild_if_pending(&mut self) -> Result<bool, SurfaceError> {
        if self.controller.state() != RecreationState::Rebuilding {
            return Ok(false);
        }
        let state = self.controller.process(&self.ctx, &mut self.allocator)?;
        Ok(state == RecreationState::Live)
    }

    /// Upload a mesh and append it to the pool.
    pub fn push_mesh(&mut self, data: &MeshData) -> Result<usize, SurfaceError> {
        self.meshes.push(&mut self.allocator, data)?;
        Ok(self.meshes.len())
    }

    /// Destroy the most recently pushed mesh after the device goes idle.
    ///
    /// Returns `false` if the pool was empty.
    pub fn pop_mesh(&mut self) -> Result<bool, SurfaceError> {
        if self.meshes.is_empty() {
            return Ok(false);
        }
        self.ctx.wait_idle()?;
        self.meshes.pop(&mut self.allocator)
    }

    /// Tear everything down in dependency order.
    ///
    /// Every step runs even if an earlier one failed; the first error is
    /// returned. On success the allocator's final report is returned.
    pub fn shutdown(self) -> Result<AllocatorReport, SurfaceError> {
        let Self {
            mut frames,
            command_buffer,
            mut meshes,
            mut controller,
            mut allocator,
            ctx,
            frame_count,
            ..
        } = self;

        let mut first_error: Option<SurfaceError> = None;
        let mut check = |step: &str, result: Result<(), SurfaceError>| {
            if let Err(error) = result {
                log::error!("Shutdown step '{}' failed: {}", step, error);
                first_error.get_or_insert(error);
            }
        };

        check("idle", ctx.wait_idle().map_err(Into::into));
        check("meshes", meshes.clear(&mut allocator));
        check("sync slot", frames.destroy_slot(&ctx).map_err(Into::into));
        if !command_buffer.is_null() {
            ctx.device().free_command_buffer(command_buffer);
        }
        check("controller", controller.teardown(&ctx, &mut allocator));
        let report = allocator.shutdown();
        check("device", ctx.release().map_err(Into::into));

        log::info!("Surface session shut down after {} frame(s)", frame_count);
        match first_error {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    /// Get the device context.
    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    /// Get the resource allocator.
    pub fn allocator(&self) -> &ResourceAllocator {
        &self.allocator
    }

    /// Get the recreation controller.
    pub fn controller(&self) -> &RecreationController {
        &self.controller
    }

    /// Get the controller state.
    pub fn state(&self) -> RecreationState {
        self.controller.state()
    }

    /// Get the mesh pool.
    pub fn meshes(&self) -> &MeshPool {
        &self.meshes
    }

    /// Number of frames submitted.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

fn release_quietly(ctx: DeviceContext) {
    if let Err(e) = ctx.release() {
        log::warn!("Device release after failed setup reported: {}", e);
    }
}
