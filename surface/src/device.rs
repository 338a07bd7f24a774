//! Device context.
//!
//! The [`DeviceContext`] owns the instance, the surface it was acquired
//! against and the logical device with its single graphics queue. It is the
//! first object created and the last one released; every other component takes
//! it by reference.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{AdapterInfo, BackendError, GpuDevice, GpuInstance, SurfaceCapabilities};
use crate::error::InitError;
use crate::types::SurfaceHandle;

/// Counts queue submissions and how many of them are known to be complete.
///
/// Submission serials are assigned in order. Observing a fence or waiting for
/// device idle completes everything up to a serial.
#[derive(Debug, Default)]
pub struct SubmissionTracker {
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl SubmissionTracker {
    /// Create a tracker with no submissions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a queue submission, returning its serial.
    pub fn mark_submitted(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record that every submission up to and including `serial` finished.
    pub fn mark_complete(&self, serial: u64) {
        self.completed.fetch_max(serial, Ordering::AcqRel);
    }

    /// Record that every submission so far finished (after a device-idle wait).
    pub fn mark_all_complete(&self) {
        let submitted = self.submitted.load(Ordering::Acquire);
        self.mark_complete(submitted);
    }

    /// Serial of the most recent submission (0 if none).
    pub fn last_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    /// Number of submissions not yet known to be complete.
    pub fn outstanding(&self) -> u64 {
        let submitted = self.submitted.load(Ordering::Acquire);
        let completed = self.completed.load(Ordering::Acquire);
        submitted.saturating_sub(completed)
    }

    /// Check if no submitted work can still be executing.
    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }
}

/// Connection to a physical device and its logical device/queue.
///
/// Release with [`DeviceContext::release`] after every object created from it
/// is gone.
pub struct DeviceContext {
    // Field order matters if the context is dropped without `release`: the
    // device must go before the instance.
    device: Box<dyn GpuDevice>,
    instance: Box<dyn GpuInstance>,
    surface: SurfaceHandle,
    adapter: AdapterInfo,
    queue_family: u32,
    submissions: Arc<SubmissionTracker>,
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("backend", &self.instance.name())
            .field("adapter", &self.adapter.name)
            .field("queue_family", &self.queue_family)
            .field("surface", &self.surface)
            .finish()
    }
}

impl DeviceContext {
    /// Select the first adapter that can render and present to `surface` and
    /// open a logical device on it.
    ///
    /// Takes ownership of the surface. On failure the surface is destroyed
    /// before the instance is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::NoAdapters`] or [`InitError::NoSuitableAdapter`]
    /// when no usable device exists, and [`InitError::DeviceCreation`] when
    /// the logical device cannot be created.
    pub fn acquire(
        instance: Box<dyn GpuInstance>,
        surface: SurfaceHandle,
    ) -> Result<Self, InitError> {
        log::info!("Acquiring device through {} backend", instance.name());

        match Self::open(instance.as_ref(), surface) {
            Ok((device, adapter, queue_family)) => {
                log::info!(
                    "Selected GPU: {} ({:?}), queue family {}",
                    adapter.name,
                    adapter.adapter_type,
                    queue_family
                );
                Ok(Self {
                    device,
                    instance,
                    surface,
                    adapter,
                    queue_family,
                    submissions: Arc::new(SubmissionTracker::new()),
                })
            }
            Err(error) => {
                instance.destroy_surface(surface);
                Err(error)
            }
        }
    }

    fn open(
        instance: &dyn GpuInstance,
        surface: SurfaceHandle,
    ) -> Result<(Box<dyn GpuDevice>, AdapterInfo, u32), InitError> {
        let adapters = instance.adapters(surface)?;
        if adapters.is_empty() {
            return Err(InitError::NoAdapters);
        }

        let checked = adapters.len();
        let Some(adapter) = adapters.into_iter().find(|adapter| {
            let suitable = adapter.is_suitable();
            if !suitable {
                log::debug!(
                    "Skipping adapter {}: swapchain={}, graphics+present family={:?}",
                    adapter.name,
                    adapter.supports_swapchain,
                    adapter.graphics_present_family()
                );
            }
            suitable
        }) else {
            return Err(InitError::NoSuitableAdapter { checked });
        };

        let queue_family = adapter
            .graphics_present_family()
            .ok_or(InitError::NoSuitableAdapter { checked })?;

        let device = instance
            .open_device(&adapter, queue_family)
            .map_err(|source| InitError::DeviceCreation {
                adapter: adapter.name.clone(),
                source,
            })?;

        Ok((device, adapter, queue_family))
    }

    /// Block until all submitted work is complete.
    pub fn wait_idle(&self) -> Result<(), BackendError> {
        self.device.wait_idle()?;
        self.submissions.mark_all_complete();
        Ok(())
    }

    /// Tear down the device, the surface and the instance, in that order.
    ///
    /// Teardown always completes; a failed idle wait is reported afterwards.
    pub fn release(self) -> Result<(), BackendError> {
        let idle = self.wait_idle();
        if let Err(error) = &idle {
            log::error!("Device idle wait failed during release: {}", error);
        }

        let Self {
            device,
            instance,
            surface,
            adapter,
            ..
        } = self;
        drop(device);
        instance.destroy_surface(surface);
        drop(instance);

        log::info!("Released device {}", adapter.name);
        idle
    }

    /// Get the logical device.
    pub fn device(&self) -> &dyn GpuDevice {
        self.device.as_ref()
    }

    /// Get the instance.
    pub fn instance(&self) -> &dyn GpuInstance {
        self.instance.as_ref()
    }

    /// Get the surface the device was acquired against.
    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }

    /// Get the selected adapter.
    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Get the graphics/present queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Get the submission tracker shared with the allocator.
    pub fn submissions(&self) -> &Arc<SubmissionTracker> {
        &self.submissions
    }

    /// Query the surface's current capabilities.
    pub fn surface_capabilities(&self) -> Result<SurfaceCapabilities, BackendError> {
        self.instance.surface_capabilities(&self.adapter, self.surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, GpuCall};
    use crate::backend::{AdapterType, QueueFamilyInfo};

    #[test]
    fn test_tracker_counts_outstanding() {
        let tracker = SubmissionTracker::new();
        assert!(tracker.is_idle());
        let first = tracker.mark_submitted();
        let second = tracker.mark_submitted();
        assert_eq!(tracker.outstanding(), 2);
        tracker.mark_complete(first);
        assert_eq!(tracker.outstanding(), 1);
        tracker.mark_complete(second);
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_tracker_complete_is_monotonic() {
        let tracker = SubmissionTracker::new();
        tracker.mark_submitted();
        let second = tracker.mark_submitted();
        tracker.mark_complete(second);
        tracker.mark_complete(1);
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_acquire_picks_first_suitable_adapter() {
        let unsuitable = AdapterInfo {
            index: 0,
            name: "Compute Only".into(),
            adapter_type: AdapterType::DiscreteGpu,
            queue_families: vec![QueueFamilyInfo {
                index: 0,
                graphics: true,
                present: false,
            }],
            supports_swapchain: true,
        };
        let suitable = AdapterInfo {
            index: 1,
            name: "Presenter".into(),
            ..DummyBackend::default_adapter()
        };
        let backend = DummyBackend::new().with_adapters(vec![unsuitable, suitable]);
        let surface = backend.create_surface();

        let ctx = DeviceContext::acquire(backend.instance(), surface).unwrap();
        assert_eq!(ctx.adapter().name, "Presenter");
        assert_eq!(ctx.queue_family(), 0);
        ctx.release().unwrap();
    }

    #[test]
    fn test_acquire_without_adapters_fails_and_destroys_surface() {
        let backend = DummyBackend::new().with_adapters(Vec::new());
        let surface = backend.create_surface();

        let result = DeviceContext::acquire(backend.instance(), surface);
        assert!(matches!(result, Err(InitError::NoAdapters)));
        assert!(backend.calls().contains(&GpuCall::DestroySurface(surface)));
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn test_release_order() {
        let backend = DummyBackend::new();
        let surface = backend.create_surface();
        let ctx = DeviceContext::acquire(backend.instance(), surface).unwrap();
        backend.clear_calls();

        ctx.release().unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                GpuCall::WaitIdle,
                GpuCall::DestroyDevice,
                GpuCall::DestroySurface(surface),
                GpuCall::DestroyInstance,
            ]
        );
    }
}
