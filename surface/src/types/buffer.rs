//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 4;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 5;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Place the buffer in host-visible memory so it can be written directly.
    pub host_visible: bool,
}

impl BufferDescriptor {
    /// Create a new device-local buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            host_visible: false,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Request host-visible memory.
    pub fn with_host_visible(mut self, host_visible: bool) -> Self {
        self.host_visible = host_visible;
        self
    }

    /// Label for logs and allocator names.
    pub fn label_or_default(&self) -> &str {
        self.label.as_deref().unwrap_or("buffer")
    }
}
