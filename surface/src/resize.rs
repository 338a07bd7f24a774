//! Window resize debouncing.
//!
//! During a drag-resize the OS sends a burst of resize events. Rebuilding the
//! presentation chain for each one stalls the GPU every time, so
//! [`ResizeManager`] buffers them and releases one extent after a quiet
//! period:
//!
//! ```text
//! Events:  R  R  R  R  R  R  ... R [debounce quiet]
//!          └──────────────────────┘      │
//!            (events buffered)           ▼
//!                                  one rebuild
//! ```
//!
//! A zero-area extent (minimized window) skips the wait so the controller can
//! suspend right away.
//!
//! # Example
//!
//! ```
//! use redlilium_surface::resize::ResizeManager;
//! use redlilium_surface::types::Extent2D;
//!
//! let mut manager = ResizeManager::new(Extent2D::new(1920, 1080), 50);
//!
//! manager.on_resize_event(Extent2D::new(1024, 768));
//! assert!(manager.is_resizing());
//!
//! // Before the debounce period, nothing is released
//! assert!(manager.update().is_none());
//!
//! // Minimizing is released immediately
//! manager.on_resize_event(Extent2D::new(0, 0));
//! assert_eq!(manager.update().map(|e| e.extent), Some(Extent2D::new(0, 0)));
//! ```

use std::time::{Duration, Instant};

use crate::types::Extent2D;

/// Resize released by [`ResizeManager::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEvent {
    /// New extent.
    pub extent: Extent2D,
    /// Extent released before this one.
    pub previous: Extent2D,
}

/// Buffers resize events until the window size has been stable for a while.
#[derive(Debug)]
pub struct ResizeManager {
    /// Buffered extent, not yet released.
    pending: Option<Extent2D>,

    /// Time of the last resize event.
    last_event_time: Instant,

    /// Quiet period required before releasing.
    debounce_duration: Duration,

    /// Last released extent.
    current: Extent2D,
}

impl ResizeManager {
    /// Create a manager for a window that starts at `initial` extent.
    ///
    /// `debounce_ms` of 0 releases every event on the next `update`.
    pub fn new(initial: Extent2D, debounce_ms: u64) -> Self {
        Self {
            pending: None,
            last_event_time: Instant::now(),
            debounce_duration: Duration::from_millis(debounce_ms),
            current: initial,
        }
    }

    /// Set the debounce duration.
    pub fn set_debounce(&mut self, debounce_ms: u64) {
        self.debounce_duration = Duration::from_millis(debounce_ms);
    }

    /// Handle an OS window resize event.
    pub fn on_resize_event(&mut self, extent: Extent2D) {
        if Some(extent) == self.pending {
            return;
        }
        if extent == self.current {
            // Resized back to where we started; nothing to apply.
            self.pending = None;
            return;
        }

        self.pending = Some(extent);
        self.last_event_time = Instant::now();

        log::trace!(
            "Resize event: {} (pending, debounce={}ms)",
            extent,
            self.debounce_duration.as_millis()
        );
    }

    /// Release the pending extent once the quiet period elapsed.
    ///
    /// Call this every frame.
    pub fn update(&mut self) -> Option<ResizeEvent> {
        let extent = self.pending?;
        if !extent.is_empty() && self.last_event_time.elapsed() < self.debounce_duration {
            return None;
        }
        Some(self.release(extent))
    }

    /// Release the pending extent without waiting.
    ///
    /// Use for fullscreen toggles and other one-shot size changes.
    pub fn force_resize(&mut self) -> Option<ResizeEvent> {
        let extent = self.pending?;
        Some(self.release(extent))
    }

    fn release(&mut self, extent: Extent2D) -> ResizeEvent {
        let previous = self.current;
        self.pending = None;
        self.current = extent;
        log::trace!("Resize applied: {} -> {}", previous, extent);
        ResizeEvent { extent, previous }
    }

    /// Last released extent.
    pub fn current_extent(&self) -> Extent2D {
        self.current
    }

    /// Buffered extent, if any.
    pub fn pending_extent(&self) -> Option<Extent2D> {
        self.pending
    }

    /// Check if a resize is waiting to be released.
    pub fn is_resizing(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left before the pending extent is released.
    ///
    /// Returns `Duration::ZERO` if nothing is pending.
    pub fn remaining_debounce(&self) -> Duration {
        if self.pending.is_some() {
            let elapsed = self.last_event_time.elapsed();
            self.debounce_duration.saturating_sub(elapsed)
        } else {
            Duration::ZERO
        }
    }

    /// Drop any pending resize.
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }
}
