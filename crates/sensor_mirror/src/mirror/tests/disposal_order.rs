//! Teardown order and post-teardown behaviour

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::{mirror, place};
use crate::backend::{
    BackendCall, BackendError, BackendHandle, BackendResult, EntityId, InstanceHandle, MaterialHandle, NativeId,
    NativeObject, RayTraceBackend, RecordingBackend, SceneHandle, SensorHandle, ShapeHandle,
};
use crate::core::config::MirrorConfig;
use crate::foundation::math::{Transform, Vec3};
use crate::mirror::{AmbientMaterial, ExternalBody, MirrorError, SceneMirror, SurfaceMaterial};
use crate::output::{ChannelId, RecordDescriptor};
use crate::scene::{MeshData, SceneGraph};
use crate::sensor::SensorDescriptor;

fn populated() -> (SceneGraph, Vec<ExternalBody>) {
    let mut host = SceneGraph::new();
    let a = Arc::new(MeshData::cube(1.0));
    let b = Arc::new(MeshData::triangle());
    for i in 0..3 {
        place(&mut host, &format!("a{i}"), &a, i as f32);
    }
    for i in 0..2 {
        place(&mut host, &format!("b{i}"), &b, i as f32);
    }
    let bodies = vec![
        ExternalBody::Terrain(NativeId(100)),
        ExternalBody::Wire(NativeId(101)),
    ];
    for body in &bodies {
        host.attach_body(*body, None);
    }
    (host, bodies)
}

fn position(calls: &[BackendCall], predicate: impl Fn(&BackendCall) -> bool) -> Vec<usize> {
    calls
        .iter()
        .enumerate()
        .filter(|(_, c)| predicate(c))
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn test_shutdown_releases_everything_in_order() {
    let (host, bodies) = populated();
    let mut mirror = mirror();
    mirror.initialize(&host).unwrap();
    let scene = mirror.scene().unwrap();
    assert_eq!(mirror.instance_count(), 5);
    assert_eq!(mirror.external_bodies().added_count(), 2);
    mirror.backend_mut().clear_calls();

    let report = mirror.shutdown().unwrap();

    assert_eq!(report.instances, 5);
    assert_eq!(report.shapes, 2);
    assert_eq!(report.external_bodies, 2);
    assert_eq!(report.materials, 1);
    assert!(report.scene_released);

    let backend = mirror.backend();
    assert_eq!(backend.live_instances(), 0);
    assert_eq!(backend.live_shapes(), 0);
    assert_eq!(backend.live_materials(), 0);
    for body in &bodies {
        assert!(!backend.is_added(body.native()));
    }
    assert!(backend.violations().is_empty(), "{:?}", backend.violations());

    let calls = backend.calls();
    let instances = position(calls, |c| matches!(c, BackendCall::Dispose(BackendHandle::Instance(_))));
    let shapes = position(calls, |c| matches!(c, BackendCall::Dispose(BackendHandle::Shape(_))));
    let removes = position(calls, |c| matches!(c, BackendCall::Remove { .. }));
    let materials = position(calls, |c| matches!(c, BackendCall::Dispose(BackendHandle::Material(_))));
    let release = position(calls, |c| matches!(c, BackendCall::ReleaseScene(_)));

    assert!(instances.iter().max() < shapes.iter().min());
    assert!(shapes.iter().max() < removes.iter().min());
    assert!(removes.iter().max() < materials.iter().min());
    assert_eq!(release, vec![calls.len() - 1]);
    assert_eq!(calls.last().and_then(BackendCall::scene), Some(scene));
}

#[test]
fn test_nothing_references_scene_after_shutdown() {
    let (mut host, _) = populated();
    let mut mirror = mirror();
    mirror.initialize(&host).unwrap();
    mirror.shutdown();
    mirror.backend_mut().clear_calls();

    let node = place(&mut host, "late", &Arc::new(MeshData::triangle()), 9.0);
    assert_eq!(mirror.synchronize(&host), Default::default());
    assert_eq!(mirror.register_created_object(&host, node), 0);
    assert!(mirror.shutdown().is_none());

    assert!(mirror.backend().calls().is_empty());
    assert!(!mirror.is_active());
    assert!(mirror.is_disposed());
}

#[test]
fn test_sensors_removed_before_instances() {
    let (host, _) = populated();
    let mut mirror = mirror();
    mirror.initialize(&host).unwrap();
    let sensor = mirror
        .create_sensor(&SensorDescriptor::Imu { body: NativeId(7) })
        .unwrap();
    assert!(mirror.add_sensor(sensor).unwrap());
    assert!(mirror.add_rigid_body(NativeId(7)).unwrap());
    mirror.backend_mut().clear_calls();

    let report = mirror.shutdown().unwrap();

    assert_eq!(report.sensors, 1);
    assert_eq!(report.rigid_bodies, 1);
    let calls = mirror.backend().calls();
    let sensor_removed = position(calls, |c| {
        matches!(c, BackendCall::Remove { object: NativeObject::Sensor(s), .. } if *s == sensor)
    });
    let first_instance = position(calls, |c| matches!(c, BackendCall::Dispose(BackendHandle::Instance(_))));
    assert!(sensor_removed.iter().max() < first_instance.iter().min());
    assert_eq!(mirror.backend().live_sensors(), 0);
    assert!(mirror.backend().violations().is_empty());
}

/// Backend handle that stays inspectable after the mirror owning it is dropped
#[derive(Debug, Clone, Default)]
struct SharedBackend(Rc<RefCell<RecordingBackend>>);

impl RayTraceBackend for SharedBackend {
    fn create_scene(&mut self) -> BackendResult<SceneHandle> {
        self.0.borrow_mut().create_scene()
    }

    fn release_scene(&mut self, scene: SceneHandle) {
        self.0.borrow_mut().release_scene(scene);
    }

    fn create_shape(&mut self, vertices: &[Vec3], indices: &[u32]) -> BackendResult<ShapeHandle> {
        self.0.borrow_mut().create_shape(vertices, indices)
    }

    fn create_material(&mut self, material: &SurfaceMaterial) -> BackendResult<MaterialHandle> {
        self.0.borrow_mut().create_material(material)
    }

    fn create_ambient_material(&mut self, material: &AmbientMaterial) -> BackendResult<MaterialHandle> {
        self.0.borrow_mut().create_ambient_material(material)
    }

    fn set_ambient_material(&mut self, scene: SceneHandle, material: Option<MaterialHandle>) {
        self.0.borrow_mut().set_ambient_material(scene, material);
    }

    fn create_instance(
        &mut self,
        scene: SceneHandle,
        shape: ShapeHandle,
        material: MaterialHandle,
        entity: EntityId,
    ) -> BackendResult<InstanceHandle> {
        self.0.borrow_mut().create_instance(scene, shape, material, entity)
    }

    fn set_transform(&mut self, instance: InstanceHandle, transform: &Transform) {
        self.0.borrow_mut().set_transform(instance, transform);
    }

    fn add(&mut self, scene: SceneHandle, object: NativeObject) -> bool {
        self.0.borrow_mut().add(scene, object)
    }

    fn remove(&mut self, scene: SceneHandle, object: NativeObject) {
        self.0.borrow_mut().remove(scene, object);
    }

    fn assign_material(&mut self, object: NativeObject, material: MaterialHandle) {
        self.0.borrow_mut().assign_material(object, material);
    }

    fn dispose(&mut self, handle: BackendHandle) {
        self.0.borrow_mut().dispose(handle);
    }

    fn create_sensor(&mut self, descriptor: &SensorDescriptor) -> BackendResult<SensorHandle> {
        self.0.borrow_mut().create_sensor(descriptor)
    }

    fn set_sensor_frame(&mut self, sensor: SensorHandle, frame: &Transform) {
        self.0.borrow_mut().set_sensor_frame(sensor, frame);
    }

    fn set_sensor_enabled(&mut self, sensor: SensorHandle, enabled: bool) {
        self.0.borrow_mut().set_sensor_enabled(sensor, enabled);
    }

    fn add_output(&mut self, sensor: SensorHandle, channel: ChannelId, record: &RecordDescriptor) -> bool {
        self.0.borrow_mut().add_output(sensor, channel, record)
    }

    fn remove_output(&mut self, sensor: SensorHandle, channel: ChannelId) {
        self.0.borrow_mut().remove_output(sensor, channel);
    }

    fn read_output(&self, sensor: SensorHandle, channel: ChannelId) -> Option<Vec<u8>> {
        self.0.borrow().read_output(sensor, channel)
    }
}

#[test]
fn test_drop_runs_teardown_once() {
    let (host, _) = populated();
    let shared = SharedBackend::default();
    {
        let mut mirror = SceneMirror::new(shared.clone(), MirrorConfig::default());
        mirror.initialize(&host).unwrap();
    }

    let backend = shared.0.borrow();
    assert_eq!(backend.live_instances(), 0);
    assert_eq!(backend.live_shapes(), 0);
    assert_eq!(
        backend.count_calls(|c| matches!(c, BackendCall::ReleaseScene(_))),
        1
    );
    assert!(backend.violations().is_empty());
}

#[test]
fn test_ambient_unset_before_materials_released() {
    let (host, _) = populated();
    let mut mirror = mirror();
    mirror.initialize(&host).unwrap();
    mirror.set_ambient_material(Some(&AmbientMaterial::rainfall(25.0))).unwrap();
    let ambient = mirror.ambient_material().unwrap();
    let scene = mirror.scene().unwrap();
    mirror.backend_mut().clear_calls();

    let report = mirror.shutdown().unwrap();

    assert_eq!(report.materials, 2);
    let backend = mirror.backend();
    assert_eq!(backend.live_materials(), 0);
    assert_eq!(backend.scene_ambient(scene), None);
    assert!(backend.violations().is_empty(), "{:?}", backend.violations());

    let calls = backend.calls();
    let removes = position(calls, |c| matches!(c, BackendCall::Remove { .. }));
    let unset = position(calls, |c| matches!(c, BackendCall::SetAmbientMaterial(_, None)));
    let disposed = position(calls, |c| *c == BackendCall::Dispose(BackendHandle::Material(ambient)));
    let release = position(calls, |c| matches!(c, BackendCall::ReleaseScene(_)));
    assert_eq!(unset.len(), 1);
    assert!(removes.iter().max() < unset.iter().min());
    assert!(unset < disposed);
    assert!(disposed < release);
}

#[test]
fn test_drop_releases_ambient_material() {
    let (host, _) = populated();
    let shared = SharedBackend::default();
    {
        let config = MirrorConfig {
            ambient_material: Some(AmbientMaterial::fog(0.2)),
            ..MirrorConfig::default()
        };
        let mut mirror = SceneMirror::new(shared.clone(), config);
        mirror.initialize(&host).unwrap();
        assert!(mirror.ambient_material().is_some());
    }

    let backend = shared.0.borrow();
    assert_eq!(backend.live_materials(), 0);
    assert!(backend.violations().is_empty(), "{:?}", backend.violations());
}

#[test]
fn test_drop_after_shutdown_does_nothing_more() {
    let (host, _) = populated();
    let shared = SharedBackend::default();
    {
        let mut mirror = SceneMirror::new(shared.clone(), MirrorConfig::default());
        mirror.initialize(&host).unwrap();
        mirror.shutdown();
        shared.0.borrow_mut().clear_calls();
    }

    assert!(shared.0.borrow().calls().is_empty());
}

#[test]
fn test_failed_scene_creation_leaves_mirror_inactive() {
    let mut backend = RecordingBackend::new();
    backend.fail_scene_creation();
    let mut mirror = SceneMirror::new(backend, MirrorConfig::default());

    assert!(mirror.initialize(&SceneGraph::new()).is_err());
    assert!(!mirror.is_active());
    assert!(mirror.initialize(&SceneGraph::new()).is_ok());
}

#[test]
fn test_ambient_material_requires_active_environment() {
    let mut mirror = mirror();
    assert_eq!(
        mirror.set_ambient_material(Some(&AmbientMaterial::air())),
        Err(MirrorError::NotInitialized)
    );

    mirror.initialize(&SceneGraph::new()).unwrap();
    assert!(matches!(
        mirror.set_ambient_material(Some(&AmbientMaterial::Air { visibility: 0.0 })),
        Err(MirrorError::Backend(BackendError::InvalidParameter(_)))
    ));
    assert!(mirror.ambient_material().is_none());

    mirror.set_ambient_material(Some(&AmbientMaterial::snowfall(4.0))).unwrap();
    mirror.set_ambient_material(None).unwrap();
    assert!(mirror.ambient_material().is_none());
    assert_eq!(mirror.backend().live_materials(), 1);

    mirror.shutdown();
    assert_eq!(
        mirror.set_ambient_material(Some(&AmbientMaterial::air())),
        Err(MirrorError::Disposed)
    );
    assert!(mirror.backend().violations().is_empty());
}
