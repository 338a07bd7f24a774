//! Backend error types.

use thiserror::Error;

/// Errors that can occur in backend operations.
///
/// These are API-level failures. The components translate them into the
/// crate's error taxonomy (see [`crate::error`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Failed to initialize the backend or one of its objects.
    #[error("backend initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Out of host or device memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// The surface changed and no longer matches the swapchain.
    #[error("surface is out of date")]
    SurfaceOutOfDate,
    /// The surface is gone (window destroyed).
    #[error("surface lost")]
    SurfaceLost,
    /// Invalid parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Internal backend error.
    #[error("internal backend error: {0}")]
    Internal(String),
}
