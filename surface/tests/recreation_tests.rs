//! Recreation controller integration tests: suspension, rebuild ordering and
//! recovery from a stale swapchain.

mod common;

use rstest::rstest;

use common::{TestContext, count, position};
use redlilium_surface::backend::dummy::{DummyFault, GpuCall};
use redlilium_surface::types::RenderPassHandle;
use redlilium_surface::{
    Extent2D, FrameSynchronizer, FramebufferSet, RecreationState, RenderTargetBuilder,
    SurfaceError, SwapchainError,
};

fn framebuffers() -> Option<Box<dyn RenderTargetBuilder>> {
    Some(Box::new(FramebufferSet::new(RenderPassHandle::from_raw(
        0xabc,
    ))))
}

#[rstest]
#[case::zero_width(Extent2D::new(0, 720))]
#[case::zero_height(Extent2D::new(1280, 0))]
#[case::minimized(Extent2D::new(0, 0))]
fn test_zero_extent_suspends_without_gpu_calls(#[case] extent: Extent2D) {
    let mut tc = TestContext::new();
    let mut controller = tc.controller(Extent2D::new(1280, 720), framebuffers());
    assert_eq!(controller.state(), RecreationState::Live);

    tc.backend.clear_calls();
    let state = controller
        .rebuild(&tc.ctx, &mut tc.allocator, extent)
        .unwrap();
    assert_eq!(state, RecreationState::Suspended);
    assert!(tc.backend.calls().is_empty());

    controller.teardown(&tc.ctx, &mut tc.allocator).unwrap();
    let (backend, report) = tc.finish();
    assert!(report.is_clean());
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_resume_after_suspension() {
    let mut tc = TestContext::new();
    let mut controller = tc.controller(Extent2D::new(800, 600), None);

    controller.notify_resize(Extent2D::new(0, 0));
    assert_eq!(
        controller.process(&tc.ctx, &mut tc.allocator).unwrap(),
        RecreationState::Suspended
    );

    controller.notify_resize(Extent2D::new(1024, 768));
    assert_eq!(controller.state(), RecreationState::Rebuilding);
    assert_eq!(
        controller.process(&tc.ctx, &mut tc.allocator).unwrap(),
        RecreationState::Live
    );
    assert_eq!(controller.chain().unwrap().extent(), Extent2D::new(1024, 768));
    assert_eq!(controller.depth().unwrap().extent(), Extent2D::new(1024, 768));

    controller.teardown(&tc.ctx, &mut tc.allocator).unwrap();
    let (_, report) = tc.finish();
    assert!(report.is_clean());
}

#[test]
fn test_rebuild_order() {
    let mut tc = TestContext::new();
    let mut controller = tc.controller(Extent2D::new(800, 600), framebuffers());

    let depth_view = controller.depth().unwrap().view();
    tc.backend.clear_calls();
    controller
        .rebuild(&tc.ctx, &mut tc.allocator, Extent2D::new(1024, 768))
        .unwrap();
    let calls = tc.backend.take_calls();

    let idle = position(&calls, |c| matches!(c, GpuCall::WaitIdle)).unwrap();
    let last_fb_destroy = calls
        .iter()
        .rposition(|c| matches!(c, GpuCall::DestroyFramebuffer(_)))
        .unwrap();
    let depth_destroy = position(&calls, |c| matches!(c, GpuCall::DestroyImage(_))).unwrap();
    let swapchain_destroy =
        position(&calls, |c| matches!(c, GpuCall::DestroySwapchain(_))).unwrap();
    let swapchain_create = position(&calls, |c| matches!(c, GpuCall::CreateSwapchain(_))).unwrap();
    let depth_create = position(&calls, |c| matches!(c, GpuCall::CreateImage(_))).unwrap();
    let first_fb_create =
        position(&calls, |c| matches!(c, GpuCall::CreateFramebuffer(_))).unwrap();

    assert_eq!(idle, 0);
    assert!(idle < last_fb_destroy);
    assert!(last_fb_destroy < depth_destroy);
    assert!(depth_destroy < swapchain_destroy);

    // Depth view goes before the depth image; swapchain views follow it.
    let depth_view_destroy =
        position(&calls, |c| *c == GpuCall::DestroyImageView(depth_view)).unwrap();
    assert!(last_fb_destroy < depth_view_destroy);
    assert!(depth_view_destroy < depth_destroy);
    let chain_view_destroys: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(i, c)| matches!(c, GpuCall::DestroyImageView(_)) && *i != depth_view_destroy)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(chain_view_destroys.len(), 3);
    assert!(
        chain_view_destroys
            .iter()
            .all(|&i| depth_destroy < i && i < swapchain_destroy)
    );
    assert!(swapchain_destroy < swapchain_create);
    assert!(swapchain_create < depth_create);
    assert!(depth_create < first_fb_create);

    assert_eq!(
        count(&calls, |c| matches!(c, GpuCall::DestroyFramebuffer(_))),
        count(&calls, |c| matches!(c, GpuCall::CreateFramebuffer(_)))
    );
    assert_eq!(controller.rebuild_count(), 2);

    controller.teardown(&tc.ctx, &mut tc.allocator).unwrap();
    let (backend, report) = tc.finish();
    assert!(report.is_clean());
    assert_eq!(backend.live_objects(), 0);
    assert_eq!(backend.invalid_destroys(), 0);
}

#[test]
fn test_teardown_twice_is_idempotent() {
    let mut tc = TestContext::new();
    let mut controller = tc.controller(Extent2D::new(800, 600), framebuffers());

    controller.teardown(&tc.ctx, &mut tc.allocator).unwrap();
    let calls = tc.backend.calls().len();
    controller.teardown(&tc.ctx, &mut tc.allocator).unwrap();

    assert_eq!(tc.backend.calls().len(), calls);
    assert_eq!(controller.state(), RecreationState::Suspended);

    let (backend, _) = tc.finish();
    assert_eq!(backend.invalid_destroys(), 0);
}

#[test]
fn test_stale_acquire_recovers_on_rebuilt_chain() {
    let mut tc = TestContext::new();
    let mut controller = tc.controller(Extent2D::new(800, 600), framebuffers());
    let mut frames = FrameSynchronizer::new();
    frames.create_slot(&tc.ctx).unwrap();

    let old_swapchain = controller.chain().unwrap().swapchain();
    tc.backend.inject_acquire_fault(DummyFault::OutOfDate);

    let error = frames
        .acquire_frame(&tc.ctx, controller.chain().unwrap())
        .unwrap_err();
    let error = match error {
        SurfaceError::Swapchain(error) => error,
        other => panic!("expected a swapchain error, got {:?}", other),
    };
    assert!(matches!(error, SwapchainError::Stale));

    assert!(controller.notify_swapchain_error(&error));
    assert_eq!(controller.state(), RecreationState::Rebuilding);
    assert_eq!(
        controller.process(&tc.ctx, &mut tc.allocator).unwrap(),
        RecreationState::Live
    );

    let chain = controller.chain().unwrap();
    assert_ne!(chain.swapchain(), old_swapchain);

    let frame = frames.acquire_frame(&tc.ctx, chain).unwrap();
    assert!((frame.image_index as usize) < chain.image_count());
    let acquired_from = tc
        .backend
        .calls()
        .iter()
        .rev()
        .find_map(|c| match c {
            GpuCall::AcquireImage(swapchain) => Some(*swapchain),
            _ => None,
        });
    assert_eq!(acquired_from, Some(chain.swapchain()));

    frames.destroy_slot(&tc.ctx).unwrap();
    controller.teardown(&tc.ctx, &mut tc.allocator).unwrap();
    let (backend, report) = tc.finish();
    assert!(report.is_clean());
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_fatal_frame_error_is_not_absorbed() {
    let mut tc = TestContext::new();
    let mut controller = tc.controller(Extent2D::new(800, 600), None);
    let mut frames = FrameSynchronizer::new();
    frames.create_slot(&tc.ctx).unwrap();

    tc.backend.inject_acquire_fault(DummyFault::DeviceLost);
    let error = frames
        .acquire_frame(&tc.ctx, controller.chain().unwrap())
        .unwrap_err();
    assert!(!error.is_recoverable());
    if let SurfaceError::Swapchain(error) = &error {
        assert!(!controller.notify_swapchain_error(error));
    }
    assert_eq!(controller.state(), RecreationState::Live);

    frames.destroy_slot(&tc.ctx).unwrap();
    controller.teardown(&tc.ctx, &mut tc.allocator).unwrap();
    tc.finish();
}
