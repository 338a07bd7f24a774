//! Error taxonomy for surface and resource management.
//!
//! Four failure families cross the public API:
//!
//! - [`InitError`]: fatal, the caller cannot continue rendering
//! - [`SwapchainError`]: `Stale`/`Suboptimal` are recoverable by rebuilding
//! - [`AllocationError`]: a buffer or image request could not be satisfied
//! - [`ResourceBusyError`]: a resource is still referenced by in-flight GPU work
//!
//! [`SurfaceError`] wraps all of them for call sites that can fail in more
//! than one way.

use thiserror::Error;

use crate::backend::BackendError;
use crate::types::Extent2D;

/// Unrecoverable setup or rebuild failure.
#[derive(Debug, Error)]
pub enum InitError {
    /// The instance reported no physical devices at all.
    #[error("no GPU adapters found")]
    NoAdapters,
    /// Adapters exist but none can present to the surface.
    #[error("no adapter supports graphics and presentation to this surface ({checked} checked)")]
    NoSuitableAdapter {
        /// Number of adapters that were examined.
        checked: usize,
    },
    /// Logical device creation failed.
    #[error("failed to create logical device on {adapter}")]
    DeviceCreation {
        /// Adapter name.
        adapter: String,
        /// Underlying backend error.
        #[source]
        source: BackendError,
    },
    /// The presentation chain could not be rebuilt.
    #[error("presentation chain rebuild failed")]
    Rebuild(#[source] SwapchainError),
    /// A render target could not be (re)created.
    #[error("render target creation failed")]
    RenderTarget(#[source] AllocationError),
    /// A resource was destroyed while GPU work still referenced it.
    #[error(transparent)]
    ResourceBusy(#[from] ResourceBusyError),
    /// Any other backend failure during setup.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Presentation chain failure.
#[derive(Debug, Error)]
pub enum SwapchainError {
    /// The swapchain no longer matches the surface and must be rebuilt.
    #[error("swapchain is stale")]
    Stale,
    /// Presentation worked, but the swapchain should be rebuilt.
    #[error("swapchain is suboptimal")]
    Suboptimal,
    /// Surface capabilities could not be queried.
    #[error("failed to query surface support")]
    CapabilitiesUnavailable(#[source] BackendError),
    /// The surface reports no formats.
    #[error("surface reports no supported formats")]
    NoFormats,
    /// The target extent has zero area (e.g. minimized window).
    #[error("cannot build a presentation chain for extent {0}")]
    DegenerateExtent(Extent2D),
    /// Swapchain or view creation failed.
    #[error("failed to create presentation chain")]
    Creation(#[source] BackendError),
    /// Acquire, submit or present failed for a reason other than staleness.
    #[error("frame submission failed")]
    Frame(#[source] BackendError),
}

impl SwapchainError {
    /// Check if rebuilding the chain resolves the error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Stale | Self::Suboptimal)
    }

    /// Map an acquire/present failure, treating out-of-date as stale.
    pub(crate) fn from_frame(error: BackendError) -> Self {
        match error {
            BackendError::SurfaceOutOfDate => Self::Stale,
            other => Self::Frame(other),
        }
    }
}

/// A buffer or image request could not be satisfied.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The backend refused the allocation.
    #[error("failed to allocate '{label}'")]
    Backend {
        /// Label of the requested resource.
        label: String,
        /// Underlying backend error.
        #[source]
        source: BackendError,
    },
    /// Initial contents larger than the requested buffer.
    #[error("initial data of {data} bytes does not fit in a buffer of {size} bytes")]
    ContentsTooLarge {
        /// Length of the provided data.
        data: u64,
        /// Requested buffer size.
        size: u64,
    },
    /// Initial contents were given for a device-local buffer.
    #[error("buffer '{0}' has initial data but is not host visible")]
    NotHostVisible(String),
    /// Zero-sized resource requested.
    #[error("'{0}' has zero size")]
    ZeroSize(String),
    /// The buffer isn't owned by this allocator (double destroy or foreign handle).
    #[error("buffer '{0}' is not owned by this allocator")]
    UnknownBuffer(String),
    /// The image isn't owned by this allocator.
    #[error("image '{0}' is not owned by this allocator")]
    UnknownImage(String),
}

/// A resource was released while GPU work that references it is outstanding.
#[derive(Debug, Error)]
#[error("'{resource}' is still in use by {outstanding} in-flight submission(s)")]
pub struct ResourceBusyError {
    /// Label of the resource.
    pub resource: String,
    /// Submissions not yet known to be complete.
    pub outstanding: u64,
}

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// Instance, device or surface setup failed.
    #[error(transparent)]
    Init(#[from] InitError),
    /// Acquire, present or swapchain creation failed.
    #[error(transparent)]
    Swapchain(#[from] SwapchainError),
    /// A GPU memory allocation failed.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// A resource was released while the GPU still used it.
    #[error(transparent)]
    ResourceBusy(#[from] ResourceBusyError),
    /// Any other backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<SurfaceError> for InitError {
    fn from(error: SurfaceError) -> Self {
        match error {
            SurfaceError::Init(error) => error,
            SurfaceError::Swapchain(error) => Self::Rebuild(error),
            SurfaceError::Allocation(error) => Self::RenderTarget(error),
            SurfaceError::ResourceBusy(error) => Self::ResourceBusy(error),
            SurfaceError::Backend(error) => Self::Backend(error),
        }
    }
}

impl SurfaceError {
    /// Check if the caller can keep rendering after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Swapchain(error) if error.is_recoverable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_date_maps_to_stale() {
        assert!(matches!(
            SwapchainError::from_frame(BackendError::SurfaceOutOfDate),
            SwapchainError::Stale
        ));
        assert!(matches!(
            SwapchainError::from_frame(BackendError::DeviceLost),
            SwapchainError::Frame(BackendError::DeviceLost)
        ));
    }

    #[test]
    fn test_recoverability() {
        assert!(SwapchainError::Stale.is_recoverable());
        assert!(SwapchainError::Suboptimal.is_recoverable());
        assert!(!SwapchainError::NoFormats.is_recoverable());

        let busy = SurfaceError::from(ResourceBusyError {
            resource: "mesh".into(),
            outstanding: 1,
        });
        assert!(!busy.is_recoverable());
        assert!(!SurfaceError::from(InitError::NoAdapters).is_recoverable());
        assert!(SurfaceError::from(SwapchainError::Stale).is_recoverable());
    }

    #[test]
    fn test_busy_message() {
        let error = ResourceBusyError {
            resource: "triangle vertices".into(),
            outstanding: 2,
        };
        assert_eq!(
            error.to_string(),
            "'triangle vertices' is still in use by 2 in-flight submission(s)"
        );
    }
}
