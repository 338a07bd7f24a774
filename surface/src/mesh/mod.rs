//! Drawable meshes: CPU-side data and the GPU resource pool.

mod data;
mod pool;

pub use data::{MeshData, Vertex};
pub use pool::{GpuMesh, MeshBuffers, MeshKind, MeshPool};
