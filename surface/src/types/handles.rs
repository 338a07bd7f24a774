//! Opaque GPU object handles.
//!
//! Every handle wraps the raw 64-bit value the backend hands out. The Vulkan
//! backend stores the `vk::Handle` raw value directly; the dummy backend uses
//! a monotonically increasing counter. Zero is reserved for "no object".

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
            pub struct $name(u64);

            impl $name {
                /// The null handle.
                pub const NULL: Self = Self(0);

                /// Wrap a raw backend value.
                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                /// Get the raw backend value.
                pub const fn as_raw(self) -> u64 {
                    self.0
                }

                /// Check if this is the null handle.
                pub const fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

define_handle! {
    /// Presentable surface created by the windowing shim.
    SurfaceHandle;
    /// Swapchain bound to a surface.
    SwapchainHandle;
    /// Image, either owned by a swapchain or allocated through the allocator.
    ImageHandle;
    /// View onto an image.
    ImageViewHandle;
    /// Buffer with bound device memory.
    BufferHandle;
    /// GPU-GPU synchronization primitive.
    SemaphoreHandle;
    /// Host-observable completion signal.
    FenceHandle;
    /// Framebuffer built by a render-target builder.
    FramebufferHandle;
    /// Render pass constructed by the pipeline collaborator.
    RenderPassHandle;
    /// Primary command buffer.
    CommandBufferHandle;
}
