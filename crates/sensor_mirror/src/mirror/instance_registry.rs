//! Host nodes with geometry and their backend instances
//!
//! Each tick the registry diffs the visibility of every tracked node against
//! the previous tick, creates or destroys instances on edges, and pushes the
//! world transform of every node that has an instance.
//!
//! Records are keyed by the full versioned node id, so a destroyed node keeps
//! its record until the next pass prunes it even when the host reuses its slot.

use std::collections::HashMap;

use super::materials::MaterialCache;
use super::shape_cache::ShapeCache;
use crate::backend::{
    BackendError, BackendHandle, BackendResult, EntityId, InstanceHandle, MaterialHandle, RayTraceBackend,
    SceneHandle,
};
use crate::scene::{resolve_inclusion, resolve_material, HostScene, NodeId};

/// Tracked state of one host node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    /// Host node
    pub node: NodeId,
    /// Visibility observed on the last pass
    pub visible: bool,
    /// Tracked even while disabled, from an inclusion rule
    pub force_include: bool,
    /// Material resolved when the instance was created
    pub material: Option<MaterialHandle>,
    /// Backend instance, present only while visible
    pub instance: Option<InstanceHandle>,
    /// Entity id of the instance
    pub entity: Option<EntityId>,
}

/// What one instance pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Instances created
    pub created: usize,
    /// Instances destroyed on a visible to hidden edge
    pub destroyed: usize,
    /// Dead nodes dropped
    pub pruned: usize,
    /// Instance creations that failed
    pub failed: usize,
    /// Transforms pushed
    pub transforms_pushed: usize,
}

/// Backend resources an instance pass works against
pub struct InstanceTarget<'a, B: ?Sized> {
    /// Backend
    pub backend: &'a mut B,
    /// Scene instances are placed in
    pub scene: SceneHandle,
    /// Shape cache
    pub shapes: &'a mut ShapeCache,
    /// Material cache
    pub materials: &'a mut MaterialCache,
    /// Track nodes even while disabled in the hierarchy
    pub track_invisible: bool,
}

/// Registry of host nodes carrying geometry
#[derive(Debug)]
pub struct InstanceRegistry {
    records: HashMap<NodeId, NodeRecord>,
    last_entity: u32,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            last_entity: 0,
        }
    }

    /// Start tracking a node
    ///
    /// Nodes without geometry, nodes already tracked and nodes excluded by an
    /// inclusion rule are skipped. Returns whether the node is now tracked
    /// anew.
    pub fn register<H: HostScene + ?Sized>(&mut self, host: &H, node: NodeId) -> bool {
        if self.records.contains_key(&node) || !host.is_alive(node) || host.mesh(node).is_none() {
            return false;
        }
        let rule = resolve_inclusion(host, node);
        if rule.is_some_and(|r| !r.include) {
            log::debug!("Node {node:?} excluded from the sensor environment");
            return false;
        }

        self.records.insert(
            node,
            NodeRecord {
                node,
                visible: false,
                force_include: rule.is_some_and(|r| r.include),
                material: None,
                instance: None,
                entity: None,
            },
        );
        true
    }

    /// Register a node and every descendant carrying geometry
    ///
    /// Returns the number of nodes newly tracked.
    pub fn register_subtree<H: HostScene + ?Sized>(&mut self, host: &H, root: NodeId) -> usize {
        let mut registered = 0;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if self.register(host, node) {
                registered += 1;
            }
            stack.extend(host.children(node));
        }
        registered
    }

    /// Diff every tracked node against the host and update the backend
    ///
    /// A failed creation leaves the node without an instance until its
    /// visibility changes again.
    pub fn reconcile<B, H>(&mut self, host: &H, target: &mut InstanceTarget<'_, B>) -> ReconcileStats
    where
        B: RayTraceBackend + ?Sized,
        H: HostScene + ?Sized,
    {
        let mut stats = ReconcileStats::default();
        let nodes: Vec<NodeId> = self.records.keys().copied().collect();

        for node in nodes {
            if !host.is_alive(node) {
                if let Some(instance) = self.records.remove(&node).and_then(|r| r.instance) {
                    target.backend.dispose(BackendHandle::Instance(instance));
                }
                stats.pruned += 1;
                continue;
            }

            let Some(mut record) = self.records.get(&node).copied() else {
                continue;
            };
            let should_be_visible =
                host.is_active_in_hierarchy(node) || target.track_invisible || record.force_include;

            if should_be_visible && !record.visible {
                match self.create_instance(host, node, target) {
                    Ok((instance, material, entity)) => {
                        record.instance = Some(instance);
                        record.material = Some(material);
                        record.entity = Some(entity);
                        stats.created += 1;
                    }
                    Err(e) => {
                        log::warn!("Could not create instance for node {node:?}: {e}");
                        stats.failed += 1;
                    }
                }
            } else if !should_be_visible && record.visible {
                if let Some(instance) = record.instance.take() {
                    target.backend.dispose(BackendHandle::Instance(instance));
                    stats.destroyed += 1;
                }
                record.entity = None;
            }
            record.visible = should_be_visible;

            if let Some(instance) = record.instance {
                target.backend.set_transform(instance, &host.world_transform(node));
                stats.transforms_pushed += 1;
            }
            self.records.insert(node, record);
        }

        stats
    }

    fn create_instance<B, H>(
        &mut self,
        host: &H,
        node: NodeId,
        target: &mut InstanceTarget<'_, B>,
    ) -> BackendResult<(InstanceHandle, MaterialHandle, EntityId)>
    where
        B: RayTraceBackend + ?Sized,
        H: HostScene + ?Sized,
    {
        let mesh = host.mesh(node).ok_or(BackendError::MissingGeometry)?;
        let shape = target.shapes.get_or_create(&mut *target.backend, &mesh)?;
        let material = target
            .materials
            .resolve(&mut *target.backend, resolve_material(host, node).as_ref())?;
        let entity = self.next_entity()?;
        let instance = target.backend.create_instance(target.scene, shape, material, entity)?;
        Ok((instance, material, entity))
    }

    fn next_entity(&mut self) -> BackendResult<EntityId> {
        let next = self
            .last_entity
            .checked_add(1)
            .ok_or_else(|| BackendError::CreationFailed("entity ids exhausted".to_string()))?;
        self.last_entity = next;
        Ok(EntityId(next))
    }

    /// Destroy every instance and stop tracking all nodes
    ///
    /// Returns the number of instances destroyed.
    pub fn destroy_all<B: RayTraceBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut destroyed = 0;
        for (_, record) in self.records.drain() {
            if let Some(instance) = record.instance {
                backend.dispose(BackendHandle::Instance(instance));
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Tracked state of a node
    pub fn get(&self, node: NodeId) -> Option<&NodeRecord> {
        self.records.get(&node)
    }

    /// Whether a node is tracked
    pub fn contains(&self, node: NodeId) -> bool {
        self.records.contains_key(&node)
    }

    /// Number of tracked nodes
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of nodes that currently have an instance
    pub fn instance_count(&self) -> usize {
        self.records.values().filter(|r| r.instance.is_some()).count()
    }
}
