//! In-memory host scene graph
//!
//! A minimal hierarchy of named nodes with local transforms, geometry,
//! surface materials and inclusion rules, plus the non-mesh bodies attached to
//! it. Used by tests and the demo app as the [`HostScene`] the mirror observes.

use std::sync::Arc;

use slotmap::SlotMap;

use super::host::{BodyId, HostBody, HostScene, InclusionRule, MaterialBinding, MeshData, NodeId};
use crate::foundation::math::Transform;
use crate::mirror::external_bodies::ExternalBody;

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    active_self: bool,
    local: Transform,
    mesh: Option<Arc<MeshData>>,
    material: Option<MaterialBinding>,
    inclusion: Option<InclusionRule>,
}

#[derive(Debug, Clone)]
struct Body {
    body: ExternalBody,
    node: Option<NodeId>,
    active_self: bool,
}

/// Hierarchical scene of nodes and bodies
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    bodies: SlotMap<BodyId, Body>,
}

impl SceneGraph {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an active node with identity transform
    ///
    /// A dead parent makes the node a root.
    pub fn create_node(&mut self, name: impl Into<String>, parent: Option<NodeId>) -> NodeId {
        let parent = parent.filter(|p| self.nodes.contains_key(*p));
        let id = self.nodes.insert(Node {
            name: name.into(),
            parent,
            children: Vec::new(),
            active_self: true,
            local: Transform::identity(),
            mesh: None,
            material: None,
            inclusion: None,
        });
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.push(id);
        }
        id
    }

    /// Create a node carrying geometry
    pub fn create_mesh_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        mesh: Arc<MeshData>,
        local: Transform,
    ) -> NodeId {
        let id = self.create_node(name, parent);
        if let Some(node) = self.nodes.get_mut(id) {
            node.mesh = Some(mesh);
            node.local = local;
        }
        id
    }

    /// Destroy a node and its whole subtree
    ///
    /// Bodies attached to destroyed nodes are destroyed with them.
    pub fn destroy_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|&c| c != id);
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
            }
        }
        let nodes = &self.nodes;
        self.bodies
            .retain(|_, body| body.node.map_or(true, |n| nodes.contains_key(n)));
        true
    }

    /// Enable or disable a node (and with it, its subtree)
    pub fn set_active(&mut self, id: NodeId, active: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.active_self = active;
        }
    }

    /// Set the transform relative to the parent
    pub fn set_local_transform(&mut self, id: NodeId, local: Transform) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.local = local;
        }
    }

    /// Transform relative to the parent
    pub fn local_transform(&self, id: NodeId) -> Option<Transform> {
        self.nodes.get(id).map(|n| n.local)
    }

    /// Replace the node's geometry
    pub fn set_mesh(&mut self, id: NodeId, mesh: Option<Arc<MeshData>>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.mesh = mesh;
        }
    }

    /// Bind a surface material to the node
    pub fn set_surface_material(&mut self, id: NodeId, binding: Option<MaterialBinding>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.material = binding;
        }
    }

    /// Set the node's inclusion rule
    pub fn set_inclusion(&mut self, id: NodeId, rule: Option<InclusionRule>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.inclusion = rule;
        }
    }

    /// Node name
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).map(|n| n.name.as_str())
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Attach a non-mesh body, optionally to a node whose activity it follows
    pub fn attach_body(&mut self, body: ExternalBody, node: Option<NodeId>) -> BodyId {
        self.bodies.insert(Body {
            body,
            node: node.filter(|n| self.nodes.contains_key(*n)),
            active_self: true,
        })
    }

    /// Enable or disable a body
    pub fn set_body_active(&mut self, id: BodyId, active: bool) {
        if let Some(body) = self.bodies.get_mut(id) {
            body.active_self = active;
        }
    }

    /// Destroy a body
    pub fn destroy_body(&mut self, id: BodyId) -> bool {
        self.bodies.remove(id).is_some()
    }

    /// Number of live bodies
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

impl HostScene for SceneGraph {
    fn geometry_nodes(&self, include_inactive: bool) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.mesh.is_some())
            .map(|(id, _)| id)
            .filter(|&id| include_inactive || self.is_active_in_hierarchy(id))
            .collect()
    }

    fn external_bodies(&self, include_inactive: bool) -> Vec<HostBody> {
        self.bodies
            .iter()
            .filter(|&(id, _)| include_inactive || self.is_body_active(id))
            .map(|(id, body)| HostBody { id, body: body.body })
            .collect()
    }

    fn is_alive(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    fn is_active_in_hierarchy(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            match self.nodes.get(id) {
                Some(n) if n.active_self => current = n.parent,
                _ => return false,
            }
        }
        true
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes.get(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn mesh(&self, node: NodeId) -> Option<Arc<MeshData>> {
        self.nodes.get(node).and_then(|n| n.mesh.clone())
    }

    fn world_transform(&self, node: NodeId) -> Transform {
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.nodes.get(id) else { break };
            chain.push(n.local);
            current = n.parent;
        }
        chain
            .iter()
            .rev()
            .fold(Transform::identity(), |world, local| world.compose(local))
    }

    fn surface_material(&self, node: NodeId) -> Option<MaterialBinding> {
        self.nodes.get(node).and_then(|n| n.material.clone())
    }

    fn inclusion(&self, node: NodeId) -> Option<InclusionRule> {
        self.nodes.get(node).and_then(|n| n.inclusion)
    }

    fn is_body_alive(&self, body: BodyId) -> bool {
        self.bodies.contains_key(body)
    }

    fn is_body_active(&self, body: BodyId) -> bool {
        self.bodies.get(body).is_some_and(|b| {
            b.active_self && b.node.map_or(true, |n| self.is_active_in_hierarchy(n))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeId;
    use crate::foundation::math::Vec3;
    use crate::mirror::materials::SurfaceMaterial;
    use crate::scene::{resolve_inclusion, resolve_material};
    use approx::assert_relative_eq;

    #[test]
    fn test_destroy_removes_subtree() {
        let mut scene = SceneGraph::new();
        let root = scene.create_node("root", None);
        let child = scene.create_node("child", Some(root));
        let grandchild = scene.create_node("grandchild", Some(child));
        let other = scene.create_node("other", None);

        assert!(scene.destroy_node(child));

        assert!(scene.is_alive(root));
        assert!(!scene.is_alive(child));
        assert!(!scene.is_alive(grandchild));
        assert!(scene.is_alive(other));
        assert!(scene.children(root).is_empty());
    }

    #[test]
    fn test_active_in_hierarchy() {
        let mut scene = SceneGraph::new();
        let root = scene.create_node("root", None);
        let child = scene.create_node("child", Some(root));

        scene.set_active(root, false);
        assert!(!scene.is_active_in_hierarchy(child));

        scene.set_active(root, true);
        assert!(scene.is_active_in_hierarchy(child));
    }

    #[test]
    fn test_world_transform_composes_parents() {
        let mut scene = SceneGraph::new();
        let root = scene.create_node("root", None);
        scene.set_local_transform(
            root,
            Transform::from_position(Vec3::new(1.0, 0.0, 0.0)).with_scale(Vec3::new(2.0, 2.0, 2.0)),
        );
        let child = scene.create_node("child", Some(root));
        scene.set_local_transform(child, Transform::from_position(Vec3::new(0.0, 1.0, 0.0)));

        let world = scene.world_transform(child);
        assert_relative_eq!(world.position, Vec3::new(1.0, 2.0, 0.0));
        assert_relative_eq!(world.scale, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_geometry_nodes_filter_inactive() {
        let mut scene = SceneGraph::new();
        let mesh = Arc::new(MeshData::triangle());
        let a = scene.create_mesh_node("a", None, mesh.clone(), Transform::identity());
        let b = scene.create_mesh_node("b", None, mesh, Transform::identity());
        scene.create_node("empty", None);
        scene.set_active(b, false);

        assert_eq!(scene.geometry_nodes(false), vec![a]);
        assert_eq!(scene.geometry_nodes(true).len(), 2);
    }

    #[test]
    fn test_bodies_follow_their_node() {
        let mut scene = SceneGraph::new();
        let node = scene.create_node("terrain", None);
        let body = scene.attach_body(ExternalBody::Terrain(NativeId(7)), Some(node));

        scene.set_active(node, false);
        assert!(!scene.is_body_active(body));
        assert!(scene.external_bodies(false).is_empty());

        scene.destroy_node(node);
        assert!(!scene.is_body_alive(body));
    }

    #[test]
    fn test_nearest_material_skips_non_propagating_ancestor() {
        let mut scene = SceneGraph::new();
        let far = Arc::new(SurfaceMaterial::lambertian(0.2));
        let near = Arc::new(SurfaceMaterial::lambertian(0.9));
        let root = scene.create_node("root", None);
        let middle = scene.create_node("middle", Some(root));
        let leaf = scene.create_node("leaf", Some(middle));
        scene.set_surface_material(root, Some(MaterialBinding::propagating(far.clone())));
        scene.set_surface_material(middle, Some(MaterialBinding::local(near.clone())));

        assert_eq!(resolve_material(&scene, leaf), Some(far));
        assert_eq!(resolve_material(&scene, middle), Some(near));
    }

    #[test]
    fn test_own_inclusion_rule_wins() {
        let mut scene = SceneGraph::new();
        let root = scene.create_node("root", None);
        let leaf = scene.create_node("leaf", Some(root));
        scene.set_inclusion(root, Some(InclusionRule::default()));
        scene.set_inclusion(
            leaf,
            Some(InclusionRule {
                include: false,
                propagate_to_children: false,
            }),
        );

        assert_eq!(resolve_inclusion(&scene, leaf).map(|r| r.include), Some(false));
        assert_eq!(resolve_inclusion(&scene, root).map(|r| r.include), Some(true));
    }
}
