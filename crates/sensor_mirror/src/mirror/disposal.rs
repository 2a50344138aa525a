//! Ordered teardown of every backend resource the mirror owns
//!
//! Runs once, before the backend scene is released:
//!
//! 0. sensors and rigid bodies are removed from the environment
//! 1. every instance is destroyed
//! 2. every cached shape is released
//! 3. external bodies are removed and forgotten
//! 4. the ambient material is unset, then it and every surface material,
//!    the default last, are released
//! 5. the scene is released and its handle cleared

use super::attachments::AttachedNatives;
use super::external_bodies::ExternalBodyRegistry;
use super::instance_registry::InstanceRegistry;
use super::materials::MaterialCache;
use super::shape_cache::ShapeCache;
use crate::backend::{RayTraceBackend, SceneHandle};

/// Counts of what teardown released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposalReport {
    /// Sensor natives disposed
    pub sensors: usize,
    /// Rigid bodies removed
    pub rigid_bodies: usize,
    /// Instances destroyed
    pub instances: usize,
    /// Shapes released
    pub shapes: usize,
    /// External body records cleared
    pub external_bodies: usize,
    /// Materials released
    pub materials: usize,
    /// Whether a scene was released
    pub scene_released: bool,
}

/// Everything teardown touches
pub struct DisposalParts<'a, B: ?Sized> {
    /// Backend
    pub backend: &'a mut B,
    /// Scene handle, cleared last
    pub scene: &'a mut Option<SceneHandle>,
    /// Sensors and rigid bodies
    pub attachments: &'a mut AttachedNatives,
    /// Node instances
    pub instances: &'a mut InstanceRegistry,
    /// Shapes
    pub shapes: &'a mut ShapeCache,
    /// External bodies
    pub bodies: &'a mut ExternalBodyRegistry,
    /// Materials
    pub materials: &'a mut MaterialCache,
}

/// One-shot teardown
#[derive(Debug, Default)]
pub struct DisposalSequencer {
    done: bool,
}

impl DisposalSequencer {
    /// Create a sequencer that has not run
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether teardown already ran
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Tear everything down in order
    ///
    /// Returns `None` if teardown already ran.
    pub fn run<B: RayTraceBackend + ?Sized>(&mut self, parts: DisposalParts<'_, B>) -> Option<DisposalReport> {
        if self.done {
            log::warn!("Sensor environment already disposed");
            return None;
        }
        self.done = true;

        let DisposalParts {
            backend,
            scene,
            attachments,
            instances,
            shapes,
            bodies,
            materials,
        } = parts;
        let mut report = DisposalReport::default();

        if let Some(handle) = *scene {
            (report.sensors, report.rigid_bodies) = attachments.release_all(backend, handle);
        }
        report.instances = instances.destroy_all(backend);
        report.shapes = shapes.release_all(backend);
        if let Some(handle) = *scene {
            report.external_bodies = bodies.clear_all(backend, handle);
        }
        report.materials = materials.release_all(backend, *scene);
        if let Some(handle) = scene.take() {
            backend.release_scene(handle);
            report.scene_released = true;
        }

        log::info!(
            "Sensor environment disposed: {} instances, {} shapes, {} bodies, {} materials, {} sensors",
            report.instances,
            report.shapes,
            report.external_bodies,
            report.materials,
            report.sensors
        );
        Some(report)
    }
}
