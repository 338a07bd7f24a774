//! # RedLilium Surface
//!
//! GPU resource lifetime management for a live, resizable rendering surface.
//!
//! ## Overview
//!
//! This crate provides, leaves first:
//! - [`DeviceContext`] - Instance, adapter selection, logical device and queue
//! - [`ResourceAllocator`] - Buffers and images backed by a device-memory allocator
//! - [`PresentationChain`] - Swapchain, images and views, rebuilt wholesale
//! - [`FrameSynchronizer`] - Acquire/submit/present with one frame in flight
//! - [`MeshPool`] - Drawable meshes destroyed in reverse creation order
//! - [`RecreationController`] - Live/Rebuilding/Suspended state machine for resizes
//! - [`SurfaceSession`] - All of the above composed into a render loop
//!
//! Backends: Vulkan (`vulkan-backend` feature, default) and a recording dummy
//! backend used by the tests.
//!
//! ## Example
//!
//! ```
//! use redlilium_surface::backend::dummy::DummyBackend;
//! use redlilium_surface::{Extent2D, FrameOutcome, MeshData, SurfaceConfig, SurfaceSession};
//!
//! let backend = DummyBackend::new();
//! let surface = backend.create_surface();
//! let mut session = SurfaceSession::new(
//!     backend.instance(),
//!     surface,
//!     Extent2D::new(800, 600),
//!     SurfaceConfig::default(),
//!     None,
//! )?;
//!
//! session.push_mesh(&MeshData::triangle())?;
//! let outcome = session.render_frame(|frame| frame.clear(frame.clear_color()))?;
//! assert!(matches!(outcome, FrameOutcome::Presented { .. }));
//!
//! let report = session.shutdown()?;
//! assert!(report.is_clean());
//! # Ok::<(), redlilium_surface::SurfaceError>(())
//! ```

pub mod allocator;
pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod mesh;
pub mod presentation;
pub mod recreation;
pub mod resize;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use allocator::{AllocatorReport, GpuBuffer, GpuImage, ResourceAllocator};
pub use backend::{BackendError, GpuAllocator, GpuDevice, GpuInstance};
pub use config::SurfaceConfig;
pub use device::{DeviceContext, SubmissionTracker};
pub use error::{AllocationError, InitError, ResourceBusyError, SurfaceError, SwapchainError};
pub use frame::{AcquiredFrame, FrameSynchronizer, SyncSlot};
pub use mesh::{GpuMesh, MeshBuffers, MeshData, MeshKind, MeshPool, Vertex};
pub use presentation::PresentationChain;
pub use recreation::{
    DepthTarget, FramebufferSet, RecreationController, RecreationState, RenderTargetBuilder,
};
pub use resize::{ResizeEvent, ResizeManager};
pub use session::{FrameContext, FrameOutcome, SurfaceSession};
pub use types::{
    BufferDescriptor, BufferUsage, Extent2D, ImageDescriptor, ImageUsage, PresentMode,
    SurfaceFormat, TextureFormat,
};

/// Surface library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the surface subsystem.
///
/// Only logs the version; call after the logger is set up.
pub fn init() {
    log::info!("RedLilium Surface v{} initialized", VERSION);
}
