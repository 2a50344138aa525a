//! In-process backend that records every call
//!
//! Used by the test suites and the demo app. Besides the call log it keeps
//! live-resource accounting and notes resource-lifetime violations (e.g. a
//! shape disposed while an instance still references it, or the scene
//! released while ray-trace resources are alive).

use std::collections::{BTreeMap, HashMap, HashSet};

use super::{
    BackendError, BackendHandle, BackendResult, EntityId, InstanceHandle, MaterialHandle, NativeObject,
    RayTraceBackend, SceneHandle, SensorHandle, ShapeHandle,
};
use crate::foundation::math::{Transform, Vec3};
use crate::mirror::materials::{AmbientMaterial, SurfaceMaterial};
use crate::output::{ChannelId, RecordDescriptor};
use crate::sensor::SensorDescriptor;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// `create_scene`
    CreateScene(SceneHandle),
    /// `release_scene`
    ReleaseScene(SceneHandle),
    /// `create_shape`, recorded only on success
    CreateShape(ShapeHandle),
    /// `create_material`
    CreateMaterial(MaterialHandle),
    /// `create_ambient_material`
    CreateAmbientMaterial(MaterialHandle),
    /// `set_ambient_material`
    SetAmbientMaterial(SceneHandle, Option<MaterialHandle>),
    /// `create_instance`
    CreateInstance {
        /// Target scene
        scene: SceneHandle,
        /// Created instance
        instance: InstanceHandle,
        /// Placed shape
        shape: ShapeHandle,
        /// Instance material
        material: MaterialHandle,
        /// Entity id
        entity: EntityId,
    },
    /// `set_transform`
    SetTransform(InstanceHandle),
    /// `add`
    Add {
        /// Target scene
        scene: SceneHandle,
        /// Added object
        object: NativeObject,
    },
    /// `remove`
    Remove {
        /// Target scene
        scene: SceneHandle,
        /// Removed object
        object: NativeObject,
    },
    /// `assign_material`
    AssignMaterial(NativeObject, MaterialHandle),
    /// `dispose`
    Dispose(BackendHandle),
    /// `create_sensor`
    CreateSensor(SensorHandle),
    /// `set_sensor_frame`
    SetSensorFrame(SensorHandle),
    /// `set_sensor_enabled`
    SetSensorEnabled(SensorHandle, bool),
    /// `add_output`
    AddOutput(SensorHandle, ChannelId),
    /// `remove_output`
    RemoveOutput(SensorHandle, ChannelId),
}

impl BackendCall {
    /// Scene handle referenced by this call, if any
    pub fn scene(&self) -> Option<SceneHandle> {
        match self {
            Self::CreateScene(scene) | Self::ReleaseScene(scene) | Self::SetAmbientMaterial(scene, _) => Some(*scene),
            Self::CreateInstance { scene, .. } | Self::Add { scene, .. } | Self::Remove { scene, .. } => Some(*scene),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct InstanceState {
    shape: ShapeHandle,
    material: MaterialHandle,
    entity: EntityId,
    transform: Option<Transform>,
}

#[derive(Debug, Clone)]
struct SensorState {
    descriptor: SensorDescriptor,
    frame: Option<Transform>,
    enabled: bool,
    outputs: BTreeMap<ChannelId, RecordDescriptor>,
}

/// Recording backend
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_handle: u64,
    calls: Vec<BackendCall>,
    scenes: HashSet<SceneHandle>,
    shapes: HashSet<ShapeHandle>,
    materials: HashMap<MaterialHandle, SurfaceMaterial>,
    ambient_materials: HashMap<MaterialHandle, AmbientMaterial>,
    scene_ambient: HashMap<SceneHandle, MaterialHandle>,
    instances: HashMap<InstanceHandle, InstanceState>,
    sensors: HashMap<SensorHandle, SensorState>,
    added: HashSet<NativeObject>,
    rejected: HashSet<NativeObject>,
    output_data: HashMap<(SensorHandle, ChannelId), Vec<u8>>,
    violations: Vec<String>,
    fail_scene_creation: bool,
}

impl RecordingBackend {
    /// Create a new recording backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_scene` fail
    pub fn fail_scene_creation(&mut self) {
        self.fail_scene_creation = true;
    }

    /// Make `add` refuse the given object
    pub fn reject_add(&mut self, object: NativeObject) {
        self.rejected.insert(object);
    }

    /// Write raw records to a sensor output, as a ray-trace pass would
    pub fn inject_output(&mut self, sensor: SensorHandle, channel: ChannelId, bytes: Vec<u8>) {
        self.output_data.insert((sensor, channel), bytes);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Number of calls matching a predicate
    pub fn count_calls(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    /// Forget the call log, keeping live state
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Resource-lifetime violations observed so far
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Number of live shapes
    pub fn live_shapes(&self) -> usize {
        self.shapes.len()
    }

    /// Number of live instances
    pub fn live_instances(&self) -> usize {
        self.instances.len()
    }

    /// Number of live surface and ambient materials
    pub fn live_materials(&self) -> usize {
        self.materials.len() + self.ambient_materials.len()
    }

    /// Number of live sensors
    pub fn live_sensors(&self) -> usize {
        self.sensors.len()
    }

    /// Whether a scene is alive
    pub fn has_scene(&self, scene: SceneHandle) -> bool {
        self.scenes.contains(&scene)
    }

    /// Whether a native object is currently in the scene
    pub fn is_added(&self, object: NativeObject) -> bool {
        self.added.contains(&object)
    }

    /// Last transform pushed to an instance
    pub fn instance_transform(&self, instance: InstanceHandle) -> Option<Transform> {
        self.instances.get(&instance).and_then(|state| state.transform)
    }

    /// Material of a live instance
    pub fn instance_material(&self, instance: InstanceHandle) -> Option<MaterialHandle> {
        self.instances.get(&instance).map(|state| state.material)
    }

    /// Entity id of a live instance
    pub fn instance_entity(&self, instance: InstanceHandle) -> Option<EntityId> {
        self.instances.get(&instance).map(|state| state.entity)
    }

    /// Definition a live material was created from
    pub fn material(&self, material: MaterialHandle) -> Option<&SurfaceMaterial> {
        self.materials.get(&material)
    }

    /// Definition a live ambient material was created from
    pub fn ambient_material(&self, material: MaterialHandle) -> Option<&AmbientMaterial> {
        self.ambient_materials.get(&material)
    }

    /// Ambient material currently set on a scene
    pub fn scene_ambient(&self, scene: SceneHandle) -> Option<MaterialHandle> {
        self.scene_ambient.get(&scene).copied()
    }

    /// Descriptor a live sensor was created from
    pub fn sensor_descriptor(&self, sensor: SensorHandle) -> Option<&SensorDescriptor> {
        self.sensors.get(&sensor).map(|state| &state.descriptor)
    }

    /// Last frame pushed to a sensor
    pub fn sensor_frame(&self, sensor: SensorHandle) -> Option<Transform> {
        self.sensors.get(&sensor).and_then(|state| state.frame)
    }

    /// Whether a sensor is enabled
    pub fn sensor_enabled(&self, sensor: SensorHandle) -> Option<bool> {
        self.sensors.get(&sensor).map(|state| state.enabled)
    }

    /// Output channels registered on a sensor
    pub fn sensor_outputs(&self, sensor: SensorHandle) -> Vec<(ChannelId, RecordDescriptor)> {
        self.sensors
            .get(&sensor)
            .map(|state| state.outputs.iter().map(|(id, record)| (*id, record.clone())).collect())
            .unwrap_or_default()
    }

    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn violation(&mut self, message: String) {
        log::error!("Backend lifetime violation: {message}");
        self.violations.push(message);
    }
}

fn validate_geometry(vertices: &[Vec3], indices: &[u32]) -> BackendResult<()> {
    if vertices.is_empty() || indices.is_empty() {
        return Err(BackendError::DegenerateGeometry("empty mesh".to_string()));
    }
    if indices.len() % 3 != 0 {
        return Err(BackendError::DegenerateGeometry(format!(
            "{} indices is not a triangle list",
            indices.len()
        )));
    }
    if let Some(index) = indices.iter().find(|&&index| index as usize >= vertices.len()) {
        return Err(BackendError::DegenerateGeometry(format!(
            "index {index} out of range for {} vertices",
            vertices.len()
        )));
    }
    Ok(())
}

impl RayTraceBackend for RecordingBackend {
    fn create_scene(&mut self) -> BackendResult<SceneHandle> {
        if std::mem::take(&mut self.fail_scene_creation) {
            return Err(BackendError::CreationFailed("scene".to_string()));
        }
        let scene = SceneHandle(self.allocate());
        self.scenes.insert(scene);
        self.calls.push(BackendCall::CreateScene(scene));
        Ok(scene)
    }

    fn release_scene(&mut self, scene: SceneHandle) {
        self.calls.push(BackendCall::ReleaseScene(scene));
        if !self.instances.is_empty() || !self.shapes.is_empty() || !self.added.is_empty() {
            self.violation(format!(
                "scene {scene:?} released with {} instances, {} shapes, {} added objects alive",
                self.instances.len(),
                self.shapes.len(),
                self.added.len()
            ));
        }
        if self.live_materials() > 0 {
            self.violation(format!("scene {scene:?} released with {} materials alive", self.live_materials()));
        }
        self.scene_ambient.remove(&scene);
        self.scenes.remove(&scene);
    }

    fn create_shape(&mut self, vertices: &[Vec3], indices: &[u32]) -> BackendResult<ShapeHandle> {
        validate_geometry(vertices, indices)?;
        let shape = ShapeHandle(self.allocate());
        self.shapes.insert(shape);
        self.calls.push(BackendCall::CreateShape(shape));
        Ok(shape)
    }

    fn create_material(&mut self, material: &SurfaceMaterial) -> BackendResult<MaterialHandle> {
        let handle = MaterialHandle(self.allocate());
        self.materials.insert(handle, material.clone());
        self.calls.push(BackendCall::CreateMaterial(handle));
        Ok(handle)
    }

    fn create_ambient_material(&mut self, material: &AmbientMaterial) -> BackendResult<MaterialHandle> {
        material.validate()?;
        let handle = MaterialHandle(self.allocate());
        self.ambient_materials.insert(handle, material.clone());
        self.calls.push(BackendCall::CreateAmbientMaterial(handle));
        Ok(handle)
    }

    fn set_ambient_material(&mut self, scene: SceneHandle, material: Option<MaterialHandle>) {
        self.calls.push(BackendCall::SetAmbientMaterial(scene, material));
        if !self.scenes.contains(&scene) {
            self.violation(format!("ambient material set on dead scene {scene:?}"));
            return;
        }
        match material {
            Some(material) if !self.ambient_materials.contains_key(&material) => {
                self.violation(format!("dead ambient material {material:?} set on {scene:?}"));
            }
            Some(material) => {
                self.scene_ambient.insert(scene, material);
            }
            None => {
                self.scene_ambient.remove(&scene);
            }
        }
    }

    fn create_instance(
        &mut self,
        scene: SceneHandle,
        shape: ShapeHandle,
        material: MaterialHandle,
        entity: EntityId,
    ) -> BackendResult<InstanceHandle> {
        if !self.scenes.contains(&scene) {
            return Err(BackendError::InvalidHandle(format!("{scene:?}")));
        }
        if !self.shapes.contains(&shape) {
            return Err(BackendError::InvalidHandle(format!("{shape:?}")));
        }
        if !self.materials.contains_key(&material) {
            return Err(BackendError::InvalidHandle(format!("{material:?}")));
        }
        let instance = InstanceHandle(self.allocate());
        self.instances.insert(
            instance,
            InstanceState {
                shape,
                material,
                entity,
                transform: None,
            },
        );
        self.calls.push(BackendCall::CreateInstance {
            scene,
            instance,
            shape,
            material,
            entity,
        });
        Ok(instance)
    }

    fn set_transform(&mut self, instance: InstanceHandle, transform: &Transform) {
        self.calls.push(BackendCall::SetTransform(instance));
        match self.instances.get_mut(&instance) {
            Some(state) => state.transform = Some(*transform),
            None => self.violation(format!("transform pushed to dead instance {instance:?}")),
        }
    }

    fn add(&mut self, scene: SceneHandle, object: NativeObject) -> bool {
        self.calls.push(BackendCall::Add { scene, object });
        if !self.scenes.contains(&scene) || self.rejected.contains(&object) {
            return false;
        }
        self.added.insert(object)
    }

    fn remove(&mut self, scene: SceneHandle, object: NativeObject) {
        self.calls.push(BackendCall::Remove { scene, object });
        if !self.added.remove(&object) {
            log::debug!("Removing {object:?} which was not in the scene");
        }
    }

    fn assign_material(&mut self, object: NativeObject, material: MaterialHandle) {
        self.calls.push(BackendCall::AssignMaterial(object, material));
        if !self.materials.contains_key(&material) {
            self.violation(format!("dead material {material:?} assigned to {object:?}"));
        }
    }

    fn dispose(&mut self, handle: BackendHandle) {
        self.calls.push(BackendCall::Dispose(handle));
        let known = match handle {
            BackendHandle::Shape(shape) => {
                if self.instances.values().any(|state| state.shape == shape) {
                    self.violation(format!("{shape:?} disposed while instances still use it"));
                }
                self.shapes.remove(&shape)
            }
            BackendHandle::Instance(instance) => self.instances.remove(&instance).is_some(),
            BackendHandle::Material(material) => {
                if self.instances.values().any(|state| state.material == material) {
                    self.violation(format!("{material:?} disposed while instances still use it"));
                }
                if self.scene_ambient.values().any(|&ambient| ambient == material) {
                    self.violation(format!("{material:?} disposed while still the scene ambient material"));
                }
                self.materials.remove(&material).is_some() || self.ambient_materials.remove(&material).is_some()
            }
            BackendHandle::Sensor(sensor) => {
                if self.added.contains(&NativeObject::Sensor(sensor)) {
                    self.violation(format!("{sensor:?} disposed while still in the scene"));
                }
                self.sensors.remove(&sensor).is_some()
            }
        };
        if !known {
            self.violation(format!("double dispose of {handle:?}"));
        }
    }

    fn create_sensor(&mut self, descriptor: &SensorDescriptor) -> BackendResult<SensorHandle> {
        let sensor = SensorHandle(self.allocate());
        self.sensors.insert(
            sensor,
            SensorState {
                descriptor: descriptor.clone(),
                frame: None,
                enabled: true,
                outputs: BTreeMap::new(),
            },
        );
        self.calls.push(BackendCall::CreateSensor(sensor));
        Ok(sensor)
    }

    fn set_sensor_frame(&mut self, sensor: SensorHandle, frame: &Transform) {
        self.calls.push(BackendCall::SetSensorFrame(sensor));
        if let Some(state) = self.sensors.get_mut(&sensor) {
            state.frame = Some(*frame);
        }
    }

    fn set_sensor_enabled(&mut self, sensor: SensorHandle, enabled: bool) {
        self.calls.push(BackendCall::SetSensorEnabled(sensor, enabled));
        if let Some(state) = self.sensors.get_mut(&sensor) {
            state.enabled = enabled;
        }
    }

    fn add_output(&mut self, sensor: SensorHandle, channel: ChannelId, record: &RecordDescriptor) -> bool {
        self.calls.push(BackendCall::AddOutput(sensor, channel));
        let Some(state) = self.sensors.get_mut(&sensor) else {
            return false;
        };
        if state.outputs.contains_key(&channel) {
            return false;
        }
        state.outputs.insert(channel, record.clone());
        true
    }

    fn remove_output(&mut self, sensor: SensorHandle, channel: ChannelId) {
        self.calls.push(BackendCall::RemoveOutput(sensor, channel));
        if let Some(state) = self.sensors.get_mut(&sensor) {
            state.outputs.remove(&channel);
        }
        self.output_data.remove(&(sensor, channel));
    }

    fn read_output(&self, sensor: SensorHandle, channel: ChannelId) -> Option<Vec<u8>> {
        let registered = self
            .sensors
            .get(&sensor)
            .is_some_and(|state| state.outputs.contains_key(&channel));
        if !registered {
            return None;
        }
        Some(self.output_data.get(&(sensor, channel)).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_geometry_is_rejected() {
        let mut backend = RecordingBackend::new();
        let vertices = vec![Vec3::zeros(), Vec3::x(), Vec3::y()];

        assert!(backend.create_shape(&vertices, &[]).is_err());
        assert!(backend.create_shape(&vertices, &[0, 1]).is_err());
        assert!(backend.create_shape(&vertices, &[0, 1, 3]).is_err());
        assert!(backend.create_shape(&vertices, &[0, 1, 2]).is_ok());
        assert_eq!(backend.count_calls(|c| matches!(c, BackendCall::CreateShape(_))), 1);
    }

    #[test]
    fn test_release_scene_with_live_shape_is_a_violation() {
        let mut backend = RecordingBackend::new();
        let scene = backend.create_scene().unwrap();
        backend
            .create_shape(&[Vec3::zeros(), Vec3::x(), Vec3::y()], &[0, 1, 2])
            .unwrap();

        backend.release_scene(scene);

        assert_eq!(backend.violations().len(), 1);
    }

    #[test]
    fn test_disposing_the_scene_ambient_is_a_violation() {
        let mut backend = RecordingBackend::new();
        let scene = backend.create_scene().unwrap();
        let fog = backend.create_ambient_material(&AmbientMaterial::fog(0.5)).unwrap();
        backend.set_ambient_material(scene, Some(fog));

        backend.dispose(BackendHandle::Material(fog));

        assert_eq!(backend.violations().len(), 1);
        assert_eq!(backend.live_materials(), 0);
    }

    #[test]
    fn test_invalid_ambient_is_refused() {
        let mut backend = RecordingBackend::new();

        assert!(backend.create_ambient_material(&AmbientMaterial::Air { visibility: -1.0 }).is_err());
        assert_eq!(backend.count_calls(|c| matches!(c, BackendCall::CreateAmbientMaterial(_))), 0);
    }
}
