//! Mesh pool.
//!
//! An insertion-ordered stack of GPU meshes. Entries never reference one
//! another, so destroying them in reverse creation order is all the
//! dependency tracking the pool needs.

use super::MeshData;
use crate::allocator::{GpuBuffer, ResourceAllocator};
use crate::error::{AllocationError, SurfaceError};
use crate::types::{BufferDescriptor, BufferUsage};

/// Whether a mesh is drawn from vertices alone or through an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKind {
    /// Vertex buffer only.
    VertexOnly,
    /// Vertex buffer plus index buffer.
    Indexed,
}

/// The buffers backing a mesh.
#[derive(Debug, PartialEq, Eq)]
pub enum MeshBuffers {
    /// Vertex buffer only.
    VertexOnly {
        /// Vertex data.
        vertices: GpuBuffer,
    },
    /// Vertex and index buffers.
    Indexed {
        /// Vertex data.
        vertices: GpuBuffer,
        /// 32-bit indices.
        indices: GpuBuffer,
    },
}

impl MeshBuffers {
    /// Get the mesh kind.
    pub fn kind(&self) -> MeshKind {
        match self {
            Self::VertexOnly { .. } => MeshKind::VertexOnly,
            Self::Indexed { .. } => MeshKind::Indexed,
        }
    }

    /// Get the vertex buffer.
    pub fn vertex_buffer(&self) -> &GpuBuffer {
        match self {
            Self::VertexOnly { vertices } | Self::Indexed { vertices, .. } => vertices,
        }
    }

    /// Get the index buffer, if indexed.
    pub fn index_buffer(&self) -> Option<&GpuBuffer> {
        match self {
            Self::VertexOnly { .. } => None,
            Self::Indexed { indices, .. } => Some(indices),
        }
    }
}

/// A mesh resident on the GPU.
#[derive(Debug, PartialEq, Eq)]
pub struct GpuMesh {
    label: String,
    buffers: MeshBuffers,
    element_count: u32,
}

impl GpuMesh {
    /// Get the debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Get the mesh kind.
    pub fn kind(&self) -> MeshKind {
        self.buffers.kind()
    }

    /// Get the backing buffers.
    pub fn buffers(&self) -> &MeshBuffers {
        &self.buffers
    }

    /// Number of vertices (vertex-only) or indices (indexed) to draw.
    pub fn element_count(&self) -> u32 {
        self.element_count
    }
}

/// Stack of GPU meshes, destroyed last-in first-out.
#[derive(Debug, Default)]
pub struct MeshPool {
    entries: Vec<GpuMesh>,
}

impl MeshPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `data` and append it to the pool.
    ///
    /// Allocates one host-visible buffer for vertex-only meshes and two for
    /// indexed ones. If the index buffer fails, the vertex buffer is freed
    /// again and the pool is unchanged.
    pub fn push(
        &mut self,
        allocator: &mut ResourceAllocator,
        data: &MeshData,
    ) -> Result<&GpuMesh, AllocationError> {
        let vertex_bytes = data.vertex_bytes();
        let vertices = allocator.create_buffer(
            &BufferDescriptor::new(vertex_bytes.len() as u64, BufferUsage::VERTEX)
                .with_label(format!("{} vertices", data.label))
                .with_host_visible(true),
            Some(vertex_bytes),
        )?;

        let buffers = match data.index_bytes() {
            None => MeshBuffers::VertexOnly { vertices },
            Some(index_bytes) => {
                let indices = allocator.create_buffer(
                    &BufferDescriptor::new(index_bytes.len() as u64, BufferUsage::INDEX)
                        .with_label(format!("{} indices", data.label))
                        .with_host_visible(true),
                    Some(index_bytes),
                );
                match indices {
                    Ok(indices) => MeshBuffers::Indexed { vertices, indices },
                    Err(error) => {
                        if let Err(e) = allocator.destroy_buffer(vertices) {
                            log::warn!("Failed to free vertices of '{}': {}", data.label, e);
                        }
                        return Err(error);
                    }
                }
            }
        };

        log::debug!(
            "Pushed mesh '{}' ({:?}, {} elements)",
            data.label,
            buffers.kind(),
            data.element_count()
        );
        self.entries.push(GpuMesh {
            label: data.label.clone(),
            buffers,
            element_count: data.element_count(),
        });
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Destroy the most recently pushed mesh.
    ///
    /// Returns `false` on an empty pool. Fails without changing the pool if
    /// submitted work may still use the mesh.
    pub fn pop(&mut self, allocator: &mut ResourceAllocator) -> Result<bool, SurfaceError> {
        let Some(last) = self.entries.last() else {
            return Ok(false);
        };
        allocator.ensure_idle(&last.label)?;

        if let Some(mesh) = self.entries.pop() {
            log::debug!("Popping mesh '{}'", mesh.label);
            Self::destroy(allocator, mesh)?;
        }
        Ok(true)
    }

    /// Destroy every mesh in reverse insertion order.
    pub fn clear(&mut self, allocator: &mut ResourceAllocator) -> Result<(), SurfaceError> {
        let count = self.entries.len();
        while self.pop(allocator)? {}
        if count > 0 {
            log::debug!("Cleared {} mesh(es)", count);
        }
        Ok(())
    }

    fn destroy(allocator: &mut ResourceAllocator, mesh: GpuMesh) -> Result<(), SurfaceError> {
        match mesh.buffers {
            MeshBuffers::VertexOnly { vertices } => allocator.destroy_buffer(vertices),
            MeshBuffers::Indexed { vertices, indices } => {
                allocator.destroy_buffer(indices)?;
                allocator.destroy_buffer(vertices)
            }
        }
    }

    /// Number of meshes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get a mesh by insertion index.
    pub fn get(&self, index: usize) -> Option<&GpuMesh> {
        self.entries.get(index)
    }

    /// Get the most recently pushed mesh.
    pub fn last(&self) -> Option<&GpuMesh> {
        self.entries.last()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GpuMesh> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::device::DeviceContext;
    use crate::error::ResourceBusyError;

    fn setup() -> (DummyBackend, DeviceContext, ResourceAllocator) {
        let backend = DummyBackend::new();
        let surface = backend.create_surface();
        let ctx = DeviceContext::acquire(backend.instance(), surface).unwrap();
        let allocator = ResourceAllocator::init(&ctx).unwrap();
        (backend, ctx, allocator)
    }

    #[test]
    fn test_push_kinds() {
        let (_backend, _ctx, mut allocator) = setup();
        let mut pool = MeshPool::new();

        let triangle = pool.push(&mut allocator, &MeshData::triangle()).unwrap();
        assert_eq!(triangle.kind(), MeshKind::VertexOnly);
        assert_eq!(triangle.element_count(), 3);
        assert!(triangle.buffers().index_buffer().is_none());

        let plane = pool.push(&mut allocator, &MeshData::plane(1.0)).unwrap();
        assert_eq!(plane.kind(), MeshKind::Indexed);
        assert_eq!(plane.element_count(), 6);
        assert_eq!(plane.buffers().index_buffer().map(GpuBuffer::size), Some(24));

        assert_eq!(allocator.report().outstanding_buffers, 3);
    }

    #[test]
    fn test_pop_empty_is_noop() {
        let (_backend, _ctx, mut allocator) = setup();
        let mut pool = MeshPool::new();
        assert!(!pool.pop(&mut allocator).unwrap());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_failed_index_upload_rolls_back() {
        let (backend, _ctx, mut allocator) = setup();
        let mut pool = MeshPool::new();

        // Vertex buffer succeeds, index buffer fails.
        backend.fail_allocation_after(1);
        assert!(matches!(
            pool.push(&mut allocator, &MeshData::plane(1.0)),
            Err(AllocationError::Backend { .. })
        ));
        assert!(pool.is_empty());
        assert_eq!(allocator.report().outstanding_buffers, 0);
        assert_eq!(allocator.report().backend_allocations, 0);
    }

    #[test]
    fn test_pop_while_busy_keeps_entry() {
        let (_backend, ctx, mut allocator) = setup();
        let mut pool = MeshPool::new();
        pool.push(&mut allocator, &MeshData::triangle()).unwrap();

        ctx.submissions().mark_submitted();
        assert!(matches!(
            pool.pop(&mut allocator),
            Err(SurfaceError::ResourceBusy(ResourceBusyError { .. }))
        ));
        assert_eq!(pool.len(), 1);

        ctx.wait_idle().unwrap();
        assert!(pool.pop(&mut allocator).unwrap());
        assert!(pool.is_empty());
    }
}
