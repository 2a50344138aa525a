//! Non-mesh bodies owned by the physics side
//!
//! Terrains, terrain pagers, wires and cables are added to the backend scene
//! directly. There is no geometry to cache; the registry only tracks whether
//! each body is currently added and applies add/remove on visibility changes.
//! Records are keyed by the versioned body id so a reused slot never shadows
//! a stale record.

use std::collections::HashMap;

use crate::backend::{MaterialHandle, NativeId, NativeObject, RayTraceBackend, SceneHandle};
use crate::scene::{BodyId, HostBody, HostScene};

/// A backend-native body that can be added to the sensor environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalBody {
    /// Deformable terrain
    Terrain(NativeId),
    /// Paged deformable terrain
    TerrainPager(NativeId),
    /// Wire
    Wire(NativeId),
    /// Cable
    Cable(NativeId),
}

impl ExternalBody {
    /// Backend object for this body
    pub const fn native(self) -> NativeObject {
        match self {
            Self::Terrain(id) => NativeObject::Terrain(id),
            Self::TerrainPager(id) => NativeObject::TerrainPager(id),
            Self::Wire(id) => NativeObject::Wire(id),
            Self::Cable(id) => NativeObject::Cable(id),
        }
    }

    /// Human-readable kind
    pub const fn kind_name(self) -> &'static str {
        match self {
            Self::Terrain(_) => "terrain",
            Self::TerrainPager(_) => "terrain pager",
            Self::Wire(_) => "wire",
            Self::Cable(_) => "cable",
        }
    }

    /// Add the body to the scene and give it the default surface material
    ///
    /// Returns `false` if the backend refused; no material is assigned then.
    pub fn add<B: RayTraceBackend + ?Sized>(self, backend: &mut B, scene: SceneHandle, material: MaterialHandle) -> bool {
        let native = self.native();
        if !backend.add(scene, native) {
            return false;
        }
        backend.assign_material(native, material);
        true
    }

    /// Remove the body from the scene
    pub fn remove<B: RayTraceBackend + ?Sized>(self, backend: &mut B, scene: SceneHandle) {
        backend.remove(scene, self.native());
    }
}

/// Tracked state of one body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalBodyRecord {
    /// The body
    pub body: ExternalBody,
    /// Visibility observed on the last pass
    pub visible: bool,
    /// Whether the body is currently added to the backend scene
    pub added: bool,
}

/// What one body pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyStats {
    /// Bodies added to the scene
    pub added: usize,
    /// Bodies removed because they were hidden
    pub removed: usize,
    /// Dead bodies dropped
    pub pruned: usize,
    /// Adds the backend refused
    pub failed: usize,
}

/// Backend resources a body pass works against
#[derive(Debug, Clone, Copy)]
pub struct BodyTarget {
    /// Scene bodies are added to
    pub scene: SceneHandle,
    /// Material assigned on add
    pub material: MaterialHandle,
    /// Log every successful add at info level
    pub log_on_add: bool,
}

/// Registry of external bodies
#[derive(Debug, Default)]
pub struct ExternalBodyRegistry {
    records: HashMap<BodyId, ExternalBodyRecord>,
}

impl ExternalBodyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a body; it is added on the next pass if active
    pub fn register(&mut self, host_body: HostBody) -> bool {
        if self.records.contains_key(&host_body.id) {
            return false;
        }
        self.records.insert(
            host_body.id,
            ExternalBodyRecord {
                body: host_body.body,
                visible: false,
                added: false,
            },
        );
        true
    }

    /// Diff every tracked body against the host
    pub fn reconcile<B, H>(&mut self, host: &H, backend: &mut B, target: BodyTarget) -> BodyStats
    where
        B: RayTraceBackend + ?Sized,
        H: HostScene + ?Sized,
    {
        let mut stats = BodyStats::default();
        let ids: Vec<BodyId> = self.records.keys().copied().collect();

        for id in ids {
            if !host.is_body_alive(id) {
                if let Some(record) = self.records.remove(&id) {
                    if record.added {
                        record.body.remove(backend, target.scene);
                    }
                    log::debug!("Dropped dead {}", record.body.kind_name());
                }
                stats.pruned += 1;
                continue;
            }

            let should_be_visible = host.is_body_active(id);
            let Some(record) = self.records.get_mut(&id) else {
                continue;
            };
            if should_be_visible == record.visible {
                continue;
            }

            if should_be_visible && !record.added {
                if record.body.add(backend, target.scene, target.material) {
                    record.added = true;
                    stats.added += 1;
                    if target.log_on_add {
                        log::info!("Sensor environment added {} {:?}", record.body.kind_name(), record.body);
                    }
                } else {
                    log::warn!("Could not add {} {:?} to the sensor environment", record.body.kind_name(), record.body);
                    stats.failed += 1;
                }
            } else if !should_be_visible && record.added {
                record.body.remove(backend, target.scene);
                record.added = false;
                stats.removed += 1;
            }
            record.visible = should_be_visible;
        }

        stats
    }

    /// Remove every added body from the scene and stop tracking all of them
    ///
    /// Returns the number of records cleared.
    pub fn clear_all<B: RayTraceBackend + ?Sized>(&mut self, backend: &mut B, scene: SceneHandle) -> usize {
        let count = self.records.len();
        for (_, record) in self.records.drain() {
            if record.added {
                record.body.remove(backend, scene);
            }
        }
        count
    }

    /// Tracked state of a body
    pub fn get(&self, id: BodyId) -> Option<&ExternalBodyRecord> {
        self.records.get(&id)
    }

    /// Number of tracked bodies
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of bodies currently added to the scene
    pub fn added_count(&self) -> usize {
        self.records.values().filter(|r| r.added).count()
    }
}
