//! Shared harness for the integration tests.
//!
//! Everything runs on the recording dummy backend, so no GPU is needed. The
//! harness keeps one clone of the backend for inspecting the call log while
//! the components own the trait objects.

#![allow(dead_code)]

use redlilium_surface::backend::dummy::{DummyBackend, GpuCall};
use redlilium_surface::{
    AllocatorReport, DeviceContext, Extent2D, RecreationController, RenderTargetBuilder,
    ResourceAllocator, SurfaceConfig, SurfaceSession,
};

/// Set up `env_logger` once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
}

/// Device context plus allocator on a dummy backend.
pub struct TestContext {
    pub backend: DummyBackend,
    pub ctx: DeviceContext,
    pub allocator: ResourceAllocator,
}

impl TestContext {
    /// Context on a default dummy backend.
    pub fn new() -> Self {
        Self::with_backend(DummyBackend::new())
    }

    /// Context on a pre-configured dummy backend.
    pub fn with_backend(backend: DummyBackend) -> Self {
        init_logging();
        let surface = backend.create_surface();
        let ctx = DeviceContext::acquire(backend.instance(), surface)
            .expect("dummy backend should always yield a device");
        let allocator = ResourceAllocator::init(&ctx).expect("allocator init");
        Self {
            backend,
            ctx,
            allocator,
        }
    }

    /// Build a recreation controller at `extent` with the default config.
    pub fn controller(
        &mut self,
        extent: Extent2D,
        targets: Option<Box<dyn RenderTargetBuilder>>,
    ) -> RecreationController {
        RecreationController::new(
            &self.ctx,
            &mut self.allocator,
            extent,
            SurfaceConfig::default(),
            targets,
        )
        .expect("initial controller build")
    }

    /// Release the allocator and the device; returns the allocator report.
    pub fn finish(self) -> (DummyBackend, AllocatorReport) {
        let Self {
            backend,
            ctx,
            allocator,
        } = self;
        let report = allocator.shutdown();
        ctx.release().expect("device release");
        (backend, report)
    }
}

/// A session on a fresh dummy backend, with no debounce so resizes apply on
/// the next frame.
pub fn session(extent: Extent2D) -> (DummyBackend, SurfaceSession) {
    session_with(DummyBackend::new(), extent)
}

/// A session on a pre-configured dummy backend.
pub fn session_with(backend: DummyBackend, extent: Extent2D) -> (DummyBackend, SurfaceSession) {
    init_logging();
    let surface = backend.create_surface();
    let config = SurfaceConfig::default().with_resize_debounce_ms(0);
    let session = SurfaceSession::new(backend.instance(), surface, extent, config, None)
        .expect("session setup on the dummy backend");
    (backend, session)
}

/// Index of the first call matching `pred`.
pub fn position(calls: &[GpuCall], pred: impl Fn(&GpuCall) -> bool) -> Option<usize> {
    calls.iter().position(pred)
}

/// Number of calls matching `pred`.
pub fn count(calls: &[GpuCall], pred: impl Fn(&GpuCall) -> bool) -> usize {
    calls.iter().filter(|call| pred(call)).count()
}

/// Check that every call is a pure query (no object created, destroyed or submitted).
pub fn only_queries(calls: &[GpuCall]) -> bool {
    calls
        .iter()
        .all(|call| matches!(call, GpuCall::QuerySurface(_)))
}
