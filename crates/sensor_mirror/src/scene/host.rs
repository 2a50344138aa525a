//! Host scene interface
//!
//! The mirror never owns the host scene graph. It observes it through
//! [`HostScene`] once per tick and diffs what it sees against what it has
//! already pushed to the backend.

use std::sync::Arc;

use crate::foundation::math::{Transform, Vec3};
use crate::mirror::external_bodies::ExternalBody;
use crate::mirror::materials::SurfaceMaterial;

slotmap::new_key_type! {
    /// Identity of a node in the host scene
    pub struct NodeId;

    /// Identity of a non-mesh body (terrain, wire, ...) in the host scene
    pub struct BodyId;
}

/// Triangle geometry shared between host nodes
///
/// Nodes sharing one `Arc<MeshData>` share one backend shape. The data is
/// treated as immutable for as long as it is referenced by the scene.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    /// Vertex positions in node-local space
    pub vertices: Vec<Vec3>,
    /// Triangle list, three indices per triangle
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Create mesh data from vertices and a triangle list
    pub fn new(vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Single triangle in the XY plane
    pub fn triangle() -> Self {
        Self::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![0, 1, 2],
        )
    }

    /// Axis-aligned cube centred on the origin
    pub fn cube(half_extent: f32) -> Self {
        let h = half_extent;
        let vertices = vec![
            Vec3::new(-h, -h, -h),
            Vec3::new(h, -h, -h),
            Vec3::new(h, h, -h),
            Vec3::new(-h, h, -h),
            Vec3::new(-h, -h, h),
            Vec3::new(h, -h, h),
            Vec3::new(h, h, h),
            Vec3::new(-h, h, h),
        ];
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 5, 0, 5, 4, // -y
            3, 7, 6, 3, 6, 2, // +y
            0, 4, 7, 0, 7, 3, // -x
            1, 2, 6, 1, 6, 5, // +x
        ];
        Self::new(vertices, indices)
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Surface material assigned to a host node
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialBinding {
    /// Material shared by every node bound to it
    pub material: Arc<SurfaceMaterial>,
    /// Whether descendants without their own binding inherit it
    pub propagate_to_children: bool,
}

impl MaterialBinding {
    /// Binding that applies to the node and its descendants
    pub fn propagating(material: Arc<SurfaceMaterial>) -> Self {
        Self {
            material,
            propagate_to_children: true,
        }
    }

    /// Binding that applies to the node only
    pub fn local(material: Arc<SurfaceMaterial>) -> Self {
        Self {
            material,
            propagate_to_children: false,
        }
    }
}

/// Explicit inclusion or exclusion of a hierarchy in the sensor environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusionRule {
    /// `true` force-includes, `false` force-excludes
    pub include: bool,
    /// Whether the rule applies to descendants without their own rule
    pub propagate_to_children: bool,
}

impl Default for InclusionRule {
    fn default() -> Self {
        Self {
            include: true,
            propagate_to_children: true,
        }
    }
}

/// A non-mesh body found in the host scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostBody {
    /// Host identity
    pub id: BodyId,
    /// Backend-native object
    pub body: ExternalBody,
}

/// Read access to the host scene graph
pub trait HostScene {
    /// Nodes carrying geometry, optionally including inactive ones
    fn geometry_nodes(&self, include_inactive: bool) -> Vec<NodeId>;

    /// Non-mesh bodies, optionally including inactive ones
    fn external_bodies(&self, include_inactive: bool) -> Vec<HostBody>;

    /// Whether the node still exists
    fn is_alive(&self, node: NodeId) -> bool;

    /// Whether the node and all of its ancestors are enabled
    fn is_active_in_hierarchy(&self, node: NodeId) -> bool;

    /// Parent node, `None` for roots and dead nodes
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Direct children
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Geometry of the node
    fn mesh(&self, node: NodeId) -> Option<Arc<MeshData>>;

    /// World transform, with lossy world scale
    fn world_transform(&self, node: NodeId) -> Transform;

    /// Surface material bound directly on the node
    fn surface_material(&self, node: NodeId) -> Option<MaterialBinding>;

    /// Inclusion rule set directly on the node
    fn inclusion(&self, node: NodeId) -> Option<InclusionRule>;

    /// Whether the body still exists
    fn is_body_alive(&self, body: BodyId) -> bool;

    /// Whether the body is enabled
    fn is_body_active(&self, body: BodyId) -> bool;
}

/// Nearest-ancestor search
///
/// The node's own value always wins. Otherwise the closest ancestor whose
/// value propagates to children is returned; ancestors with non-propagating
/// values are skipped.
pub fn find_nearest<H, T>(
    host: &H,
    node: NodeId,
    lookup: impl Fn(&H, NodeId) -> Option<T>,
    propagates: impl Fn(&T) -> bool,
) -> Option<T>
where
    H: HostScene + ?Sized,
{
    if let Some(own) = lookup(host, node) {
        return Some(own);
    }
    let mut current = host.parent(node);
    while let Some(ancestor) = current {
        if let Some(value) = lookup(host, ancestor) {
            if propagates(&value) {
                return Some(value);
            }
        }
        current = host.parent(ancestor);
    }
    None
}

/// Surface material that applies to a node
pub fn resolve_material<H: HostScene + ?Sized>(host: &H, node: NodeId) -> Option<Arc<SurfaceMaterial>> {
    find_nearest(host, node, |h, n| h.surface_material(n), |b| b.propagate_to_children).map(|b| b.material)
}

/// Inclusion rule that applies to a node
pub fn resolve_inclusion<H: HostScene + ?Sized>(host: &H, node: NodeId) -> Option<InclusionRule> {
    find_nearest(host, node, |h, n| h.inclusion(n), |r| r.propagate_to_children)
}
