//! Deduplicated backend shapes
//!
//! Keyed by the identity of the shared mesh data, not its contents: two nodes
//! referencing the same `Arc<MeshData>` share one shape.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{BackendHandle, BackendResult, RayTraceBackend, ShapeHandle};
use crate::scene::MeshData;

/// Identity of a mesh's vertex/index data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryKey(usize);

impl GeometryKey {
    /// Key of a shared mesh
    pub fn of(mesh: &Arc<MeshData>) -> Self {
        Self(Arc::as_ptr(mesh) as usize)
    }
}

#[derive(Debug)]
struct CachedShape {
    /// Keeps the key's address from being recycled
    _mesh: Arc<MeshData>,
    shape: ShapeHandle,
}

/// Cache of backend shapes, one per distinct mesh
///
/// Shapes live until [`release_all`](Self::release_all) at teardown.
#[derive(Debug, Default)]
pub struct ShapeCache {
    shapes: HashMap<GeometryKey, CachedShape>,
}

impl ShapeCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Shape for a mesh, compiling it on first request
    ///
    /// Failures are not cached; the next request tries again.
    pub fn get_or_create<B: RayTraceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mesh: &Arc<MeshData>,
    ) -> BackendResult<ShapeHandle> {
        let key = GeometryKey::of(mesh);
        if let Some(cached) = self.shapes.get(&key) {
            return Ok(cached.shape);
        }

        let shape = backend.create_shape(&mesh.vertices, &mesh.indices)?;
        log::debug!(
            "Created shape {shape:?} for {} triangles ({} shapes cached)",
            mesh.triangle_count(),
            self.shapes.len() + 1
        );
        self.shapes.insert(
            key,
            CachedShape {
                _mesh: Arc::clone(mesh),
                shape,
            },
        );
        Ok(shape)
    }

    /// Whether a mesh has a cached shape
    pub fn contains(&self, key: GeometryKey) -> bool {
        self.shapes.contains_key(&key)
    }

    /// Number of cached shapes
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Dispose every cached shape
    ///
    /// Every instance using them must already be destroyed. Returns the
    /// number of shapes released.
    pub fn release_all<B: RayTraceBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let count = self.shapes.len();
        for (_, cached) in self.shapes.drain() {
            backend.dispose(BackendHandle::Shape(cached.shape));
        }
        count
    }
}
