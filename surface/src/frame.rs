//! Frame synchronization.
//!
//! One [`SyncSlot`] drives the acquire → record → submit → present cycle with
//! exactly one frame in flight:
//!
//! ```text
//! wait(in_flight) → reset(in_flight) → acquire(signal image_available)
//!   → submit(wait image_available, signal render_finished + in_flight)
//!   → present(wait render_finished)
//! ```

use crate::backend::{BackendError, GpuDevice, PresentStatus, SubmitDescriptor};
use crate::device::DeviceContext;
use crate::error::{ResourceBusyError, SurfaceError, SwapchainError};
use crate::presentation::PresentationChain;
use crate::types::{CommandBufferHandle, FenceHandle, SemaphoreHandle};

/// Semaphores and fence for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSlot {
    /// Signaled when the acquired image is ready to be rendered to.
    pub image_available: SemaphoreHandle,
    /// Signaled when rendering finished; presentation waits on it.
    pub render_finished: SemaphoreHandle,
    /// Signaled when the frame's submission completed on the GPU.
    pub in_flight: FenceHandle,
}

/// An image acquired for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredFrame {
    /// Index into the chain's images and views.
    pub image_index: u32,
    /// The chain still works but should be rebuilt after this frame.
    pub suboptimal: bool,
}

/// Drives the per-frame acquire/submit/present cycle.
#[derive(Debug, Default)]
pub struct FrameSynchronizer {
    slot: Option<SyncSlot>,
    last_submission: u64,
}

impl FrameSynchronizer {
    /// Create a synchronizer without a slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the semaphore pair and the fence (already signaled, so the first
    /// acquire doesn't block).
    ///
    /// Replaces nothing: calling this with a live slot is an error.
    pub fn create_slot(&mut self, ctx: &DeviceContext) -> Result<SyncSlot, BackendError> {
        if self.slot.is_some() {
            return Err(BackendError::InvalidParameter(
                "sync slot already exists".to_string(),
            ));
        }

        let device = ctx.device();
        let image_available = device.create_semaphore()?;
        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_semaphore(render_finished);
                device.destroy_semaphore(image_available);
                return Err(e);
            }
        };

        let slot = SyncSlot {
            image_available,
            render_finished,
            in_flight,
        };
        self.slot = Some(slot);
        log::debug!("Created sync slot");
        Ok(slot)
    }

    /// Get the current slot.
    pub fn slot(&self) -> Option<&SyncSlot> {
        self.slot.as_ref()
    }

    /// Wait for the previous frame, then acquire the next image.
    ///
    /// Returns [`SwapchainError::Stale`] when the chain no longer matches the
    /// surface. The fence is left signaled on any acquire failure, so the next
    /// call does not block forever.
    pub fn acquire_frame(
        &mut self,
        ctx: &DeviceContext,
        chain: &PresentationChain,
    ) -> Result<AcquiredFrame, SurfaceError> {
        let slot = self.require_slot()?;
        let device = ctx.device();

        device.wait_fence(slot.in_flight)?;
        ctx.submissions().mark_complete(self.last_submission);
        device.reset_fence(slot.in_flight)?;

        match device.acquire_next_image(chain.swapchain(), slot.image_available) {
            Ok(acquired) => {
                if acquired.suboptimal {
                    log::debug!("Acquired image {} from suboptimal swapchain", acquired.index);
                }
                Ok(AcquiredFrame {
                    image_index: acquired.index,
                    suboptimal: acquired.suboptimal,
                })
            }
            Err(error) => {
                // Nothing will be submitted against this fence now.
                self.rearm_fence(device)?;
                if error == BackendError::SurfaceOutOfDate {
                    log::warn!("Swapchain out of date on acquire");
                }
                Err(SwapchainError::from_frame(error).into())
            }
        }
    }

    /// Submit the recorded commands and present `image_index`.
    ///
    /// Completion signals both the fence and the render-finished semaphore;
    /// presentation waits on the semaphore. A stale or suboptimal present
    /// returns the matching [`SwapchainError`] after the image was queued.
    pub fn submit_and_present(
        &mut self,
        ctx: &DeviceContext,
        chain: &PresentationChain,
        image_index: u32,
        commands: CommandBufferHandle,
    ) -> Result<(), SurfaceError> {
        let slot = self.require_slot()?;
        let device = ctx.device();

        if let Err(error) = device.submit(&SubmitDescriptor {
            command_buffer: commands,
            wait_semaphore: slot.image_available,
            signal_semaphore: slot.render_finished,
            fence: slot.in_flight,
        }) {
            self.abandon_frame(ctx)?;
            return Err(SwapchainError::Frame(error).into());
        }
        self.last_submission = ctx.submissions().mark_submitted();
        log::trace!("Submitted frame for image {}", image_index);

        match device.present(chain.swapchain(), image_index, slot.render_finished) {
            Ok(PresentStatus::Optimal) => Ok(()),
            Ok(PresentStatus::Suboptimal) => {
                log::debug!("Swapchain suboptimal on present");
                Err(SwapchainError::Suboptimal.into())
            }
            Err(error) => {
                if error == BackendError::SurfaceOutOfDate {
                    log::warn!("Swapchain out of date on present");
                }
                Err(SwapchainError::from_frame(error).into())
            }
        }
    }

    /// Destroy the semaphores and the fence.
    ///
    /// Only valid once the device is idle. Does nothing without a slot.
    pub fn destroy_slot(&mut self, ctx: &DeviceContext) -> Result<(), ResourceBusyError> {
        let Some(slot) = self.slot else {
            return Ok(());
        };
        let outstanding = ctx.submissions().outstanding();
        if outstanding > 0 {
            return Err(ResourceBusyError {
                resource: "frame sync slot".to_string(),
                outstanding,
            });
        }

        let device = ctx.device();
        device.destroy_fence(slot.in_flight);
        device.destroy_semaphore(slot.render_finished);
        device.destroy_semaphore(slot.image_available);
        self.slot = None;
        log::debug!("Destroyed sync slot");
        Ok(())
    }

    fn require_slot(&self) -> Result<SyncSlot, BackendError> {
        self.slot.ok_or_else(|| {
            BackendError::InvalidParameter("frame synchronizer has no sync slot".to_string())
        })
    }

    /// Give up on an acquired frame that will not be submitted.
    ///
    /// The fence gets signaled again and `image_available`, which the acquire
    /// left signaled, is swapped for a fresh semaphore.
    pub(crate) fn abandon_frame(&mut self, ctx: &DeviceContext) -> Result<(), BackendError> {
        let device = ctx.device();
        self.rearm_fence(device)?;
        let Some(slot) = self.slot.as_mut() else {
            return Ok(());
        };
        device.destroy_semaphore(slot.image_available);
        slot.image_available = device.create_semaphore()?;
        log::debug!("Abandoned acquired frame");
        Ok(())
    }

    /// Replace the unsignaled fence with a signaled one.
    fn rearm_fence(&mut self, device: &dyn GpuDevice) -> Result<(), BackendError> {
        let Some(slot) = self.slot.as_mut() else {
            return Ok(());
        };
        device.destroy_fence(slot.in_flight);
        slot.in_flight = device.create_fence(true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, DummyFault, GpuCall};
    use crate::config::SurfaceConfig;
    use crate::types::Extent2D;

    fn setup() -> (DummyBackend, DeviceContext, PresentationChain) {
        let backend = DummyBackend::new();
        let surface = backend.create_surface();
        let ctx = DeviceContext::acquire(backend.instance(), surface).unwrap();
        let chain =
            PresentationChain::build(&ctx, Extent2D::new(800, 600), &SurfaceConfig::default())
                .unwrap();
        (backend, ctx, chain)
    }

    #[test]
    fn test_first_acquire_does_not_block() {
        let (_backend, ctx, chain) = setup();
        let mut sync = FrameSynchronizer::new();
        sync.create_slot(&ctx).unwrap();

        let frame = sync.acquire_frame(&ctx, &chain).unwrap();
        assert_eq!(frame.image_index, 0);
        assert!(!frame.suboptimal);
    }

    #[test]
    fn test_acquire_without_slot_fails() {
        let (_backend, ctx, chain) = setup();
        let mut sync = FrameSynchronizer::new();
        assert!(matches!(
            sync.acquire_frame(&ctx, &chain),
            Err(SurfaceError::Backend(BackendError::InvalidParameter(_)))
        ));
    }

    #[test]
    fn test_stale_acquire_rearms_fence() {
        let (backend, ctx, chain) = setup();
        let mut sync = FrameSynchronizer::new();
        let original = sync.create_slot(&ctx).unwrap();

        backend.inject_acquire_fault(DummyFault::OutOfDate);
        assert!(matches!(
            sync.acquire_frame(&ctx, &chain),
            Err(SurfaceError::Swapchain(SwapchainError::Stale))
        ));
        assert_ne!(sync.slot().unwrap().in_flight, original.in_flight);

        // Would fail on an unsignaled fence.
        assert!(sync.acquire_frame(&ctx, &chain).is_ok());
    }

    #[test]
    fn test_abandoned_frame_leaves_slot_usable() {
        let (backend, ctx, chain) = setup();
        let mut sync = FrameSynchronizer::new();
        let original = sync.create_slot(&ctx).unwrap();

        sync.acquire_frame(&ctx, &chain).unwrap();
        sync.abandon_frame(&ctx).unwrap();

        let slot = *sync.slot().unwrap();
        assert_ne!(slot.in_flight, original.in_flight);
        assert_ne!(slot.image_available, original.image_available);
        assert_eq!(slot.render_finished, original.render_finished);
        assert!(sync.acquire_frame(&ctx, &chain).is_ok());

        sync.destroy_slot(&ctx).unwrap();
        assert_eq!(backend.invalid_destroys(), 0);
    }

    #[test]
    fn test_submit_tracks_outstanding_work() {
        let (backend, ctx, chain) = setup();
        let mut sync = FrameSynchronizer::new();
        sync.create_slot(&ctx).unwrap();
        let commands = ctx.device().allocate_command_buffer().unwrap();

        let frame = sync.acquire_frame(&ctx, &chain).unwrap();
        sync.submit_and_present(&ctx, &chain, frame.image_index, commands)
            .unwrap();
        assert_eq!(ctx.submissions().outstanding(), 1);
        assert!(matches!(
            sync.destroy_slot(&ctx),
            Err(ResourceBusyError { outstanding: 1, .. })
        ));

        // The next fence wait observes completion.
        sync.acquire_frame(&ctx, &chain).unwrap();
        assert!(ctx.submissions().is_idle());

        assert!(backend.calls().contains(&GpuCall::Present {
            swapchain: chain.swapchain(),
            image_index: 0,
        }));
    }

    #[test]
    fn test_present_faults() {
        let (backend, ctx, chain) = setup();
        let mut sync = FrameSynchronizer::new();
        sync.create_slot(&ctx).unwrap();
        let commands = ctx.device().allocate_command_buffer().unwrap();

        backend.inject_present_fault(DummyFault::Suboptimal);
        let frame = sync.acquire_frame(&ctx, &chain).unwrap();
        assert!(matches!(
            sync.submit_and_present(&ctx, &chain, frame.image_index, commands),
            Err(SurfaceError::Swapchain(SwapchainError::Suboptimal))
        ));

        backend.inject_present_fault(DummyFault::DeviceLost);
        let frame = sync.acquire_frame(&ctx, &chain).unwrap();
        let error = sync
            .submit_and_present(&ctx, &chain, frame.image_index, commands)
            .unwrap_err();
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_destroy_slot_is_idempotent() {
        let (backend, ctx, _chain) = setup();
        let mut sync = FrameSynchronizer::new();
        sync.create_slot(&ctx).unwrap();

        sync.destroy_slot(&ctx).unwrap();
        sync.destroy_slot(&ctx).unwrap();
        assert!(sync.slot().is_none());
        assert_eq!(backend.invalid_destroys(), 0);
    }
}
