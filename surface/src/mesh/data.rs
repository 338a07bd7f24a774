//! CPU-side mesh data and generators.

/// A vertex with a position and a color.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position in normalized device coordinates.
    pub position: [f32; 3],
    /// Linear RGB color.
    pub color: [f32; 3],
}

impl Vertex {
    /// Create a vertex.
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }
}

/// Mesh geometry ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    /// Debug label; buffer labels are derived from it.
    pub label: String,
    /// Vertices.
    pub vertices: Vec<Vertex>,
    /// Indices into `vertices`, if the mesh is indexed.
    pub indices: Option<Vec<u32>>,
}

impl MeshData {
    /// Create a vertex-only mesh.
    pub fn new(label: impl Into<String>, vertices: Vec<Vertex>) -> Self {
        Self {
            label: label.into(),
            vertices,
            indices: None,
        }
    }

    /// Attach indices, making the mesh indexed.
    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    /// A single colored triangle (vertex-only).
    pub fn triangle() -> Self {
        Self::new(
            "triangle",
            vec![
                Vertex::new([0.0, -0.5, 0.0], [1.0, 0.0, 0.0]),
                Vertex::new([0.5, 0.5, 0.0], [0.0, 1.0, 0.0]),
                Vertex::new([-0.5, 0.5, 0.0], [0.0, 0.0, 1.0]),
            ],
        )
    }

    /// A square plane in the XY plane (indexed, two triangles).
    pub fn plane(half_extent: f32) -> Self {
        let h = half_extent;
        let color = [0.8, 0.8, 0.8];
        Self::new(
            "plane",
            vec![
                Vertex::new([-h, -h, 0.0], color),
                Vertex::new([h, -h, 0.0], color),
                Vertex::new([h, h, 0.0], color),
                Vertex::new([-h, h, 0.0], color),
            ],
        )
        .with_indices(vec![0, 1, 2, 2, 3, 0])
    }

    /// Check if the mesh has indices.
    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// Number of elements to draw: indices if indexed, vertices otherwise.
    pub fn element_count(&self) -> u32 {
        match &self.indices {
            Some(indices) => indices.len() as u32,
            None => self.vertices.len() as u32,
        }
    }

    /// Vertex data as bytes.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as bytes.
    pub fn index_bytes(&self) -> Option<&[u8]> {
        self.indices.as_deref().map(bytemuck::cast_slice)
    }
}
