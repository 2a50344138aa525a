//! Sensor and rigid-body natives living in the sensor environment

use std::collections::BTreeSet;

use crate::backend::{BackendHandle, NativeId, NativeObject, RayTraceBackend, SceneHandle, SensorHandle};

/// Natives created for or added to the environment on behalf of sensors
#[derive(Debug, Default)]
pub struct AttachedNatives {
    sensors: BTreeSet<SensorHandle>,
    added_sensors: BTreeSet<SensorHandle>,
    rigid_bodies: BTreeSet<NativeId>,
}

impl AttachedNatives {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sensor native created on the backend
    pub fn track_sensor(&mut self, sensor: SensorHandle) {
        self.sensors.insert(sensor);
    }

    /// Whether a sensor native is alive
    pub fn has_sensor(&self, sensor: SensorHandle) -> bool {
        self.sensors.contains(&sensor)
    }

    /// Add a sensor to the scene, once
    pub fn add_sensor<B: RayTraceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: SceneHandle,
        sensor: SensorHandle,
    ) -> bool {
        if self.added_sensors.contains(&sensor) {
            return true;
        }
        if !backend.add(scene, NativeObject::Sensor(sensor)) {
            return false;
        }
        self.added_sensors.insert(sensor);
        true
    }

    /// Remove a sensor from the scene and dispose it
    pub fn release_sensor<B: RayTraceBackend + ?Sized>(&mut self, backend: &mut B, scene: SceneHandle, sensor: SensorHandle) {
        if self.added_sensors.remove(&sensor) {
            backend.remove(scene, NativeObject::Sensor(sensor));
        }
        if self.sensors.remove(&sensor) {
            backend.dispose(BackendHandle::Sensor(sensor));
        }
    }

    /// Add a rigid body to the scene, once
    pub fn add_rigid_body<B: RayTraceBackend + ?Sized>(&mut self, backend: &mut B, scene: SceneHandle, body: NativeId) -> bool {
        if self.rigid_bodies.contains(&body) {
            return true;
        }
        if !backend.add(scene, NativeObject::RigidBody(body)) {
            return false;
        }
        self.rigid_bodies.insert(body);
        true
    }

    /// Number of sensor natives alive
    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Number of rigid bodies added
    pub fn rigid_body_count(&self) -> usize {
        self.rigid_bodies.len()
    }

    /// Remove everything from the scene and dispose every sensor native
    ///
    /// Returns `(sensors, rigid bodies)` released.
    pub fn release_all<B: RayTraceBackend + ?Sized>(&mut self, backend: &mut B, scene: SceneHandle) -> (usize, usize) {
        for sensor in std::mem::take(&mut self.added_sensors) {
            backend.remove(scene, NativeObject::Sensor(sensor));
        }
        let rigid_bodies = self.rigid_bodies.len();
        for body in std::mem::take(&mut self.rigid_bodies) {
            backend.remove(scene, NativeObject::RigidBody(body));
        }
        let sensors = self.sensors.len();
        for sensor in std::mem::take(&mut self.sensors) {
            backend.dispose(BackendHandle::Sensor(sensor));
        }
        (sensors, rigid_bodies)
    }
}
