//! Scene mirror: keeps the backend scene in step with the host scene
//!
//! The mirror owns the backend, the caches and the registries, and is driven
//! explicitly:
//! 1. [`SceneMirror::initialize`] creates the backend scene and scans the host
//! 2. [`SceneMirror::synchronize`] reconciles once per simulation step, after
//!    host transforms are final
//! 3. [`SceneMirror::shutdown`] (or drop) tears everything down in order
//!
//! Sensors receive `&mut SceneMirror` for everything they need from the
//! environment.

use thiserror::Error;

use super::attachments::AttachedNatives;
use super::disposal::{DisposalParts, DisposalReport, DisposalSequencer};
use super::external_bodies::{BodyStats, BodyTarget, ExternalBodyRegistry};
use super::instance_registry::{InstanceRegistry, InstanceTarget, ReconcileStats};
use super::materials::{AmbientMaterial, MaterialCache};
use super::shape_cache::ShapeCache;
use crate::backend::{BackendError, MaterialHandle, NativeId, RayTraceBackend, SceneHandle, SensorHandle};
use crate::core::config::MirrorConfig;
use crate::output::{ChannelId, OutputComposer, OutputError, SensorRegistry};
use crate::scene::{HostBody, HostScene, NodeId};
use crate::sensor::{SensorDescriptor, SensorKind};

/// Mirror lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// `initialize` has not run
    #[error("Sensor environment is not initialized")]
    NotInitialized,

    /// `initialize` already ran
    #[error("Sensor environment is already initialized")]
    AlreadyInitialized,

    /// The environment was torn down
    #[error("Sensor environment is disposed")]
    Disposed,

    /// Backend failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Output binding failure
    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}

/// What one synchronization step did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Node instance pass
    pub instances: ReconcileStats,
    /// External body pass
    pub bodies: BodyStats,
}

/// Mirror of the host scene in the ray-tracing backend
pub struct SceneMirror<B: RayTraceBackend> {
    backend: B,
    config: MirrorConfig,
    scene: Option<SceneHandle>,
    shapes: ShapeCache,
    materials: MaterialCache,
    instances: InstanceRegistry,
    bodies: ExternalBodyRegistry,
    channels: SensorRegistry,
    attachments: AttachedNatives,
    disposal: DisposalSequencer,
}

impl<B: RayTraceBackend> SceneMirror<B> {
    /// Create an uninitialized mirror
    pub fn new(backend: B, config: MirrorConfig) -> Self {
        let materials = MaterialCache::new(config.default_material.clone());
        Self {
            backend,
            config,
            scene: None,
            shapes: ShapeCache::new(),
            materials,
            instances: InstanceRegistry::new(),
            bodies: ExternalBodyRegistry::new(),
            channels: SensorRegistry::new(),
            attachments: AttachedNatives::new(),
            disposal: DisposalSequencer::new(),
        }
    }

    /// Create the backend scene and build the initial mirror from the host
    ///
    /// Every node with geometry and every external body found is registered,
    /// then reconciled once so visible nodes get instances.
    pub fn initialize<H: HostScene + ?Sized>(&mut self, host: &H) -> Result<SyncStats, MirrorError> {
        if self.disposal.is_done() {
            return Err(MirrorError::Disposed);
        }
        if self.scene.is_some() {
            return Err(MirrorError::AlreadyInitialized);
        }

        let scene = self.backend.create_scene()?;
        if let Err(e) = self.materials.initialize(&mut self.backend) {
            self.backend.release_scene(scene);
            return Err(e.into());
        }
        self.scene = Some(scene);
        if let Some(ambient) = &self.config.ambient_material {
            if let Err(e) = self.materials.set_ambient(&mut self.backend, scene, Some(ambient)) {
                log::warn!("Ambient material {ambient:?} not applied, using none: {e}");
            }
        }

        let include_inactive = self.config.include_inactive_on_scan;
        let mut nodes = 0;
        for node in host.geometry_nodes(include_inactive) {
            if self.instances.register(host, node) {
                nodes += 1;
            }
        }
        let mut bodies = 0;
        for body in host.external_bodies(include_inactive) {
            if self.bodies.register(body) {
                bodies += 1;
            }
        }

        let stats = self.reconcile(host, scene);
        log::info!(
            "Sensor environment initialized: {nodes} nodes ({} instances, {} shapes), {bodies} external bodies",
            stats.instances.created,
            self.shapes.len()
        );
        Ok(stats)
    }

    /// Reconcile the backend scene with the host
    ///
    /// Call once per step after host transforms are final. A no-op with a
    /// warning unless the mirror is initialized and not disposed.
    pub fn synchronize<H: HostScene + ?Sized>(&mut self, host: &H) -> SyncStats {
        let Some(scene) = self.scene else {
            log::warn!("Synchronizing a sensor environment that is not active");
            return SyncStats::default();
        };
        let stats = self.reconcile(host, scene);
        log::trace!("Sensor environment step: {stats:?}");
        stats
    }

    fn reconcile<H: HostScene + ?Sized>(&mut self, host: &H, scene: SceneHandle) -> SyncStats {
        let mut target = InstanceTarget {
            backend: &mut self.backend,
            scene,
            shapes: &mut self.shapes,
            materials: &mut self.materials,
            track_invisible: self.config.track_invisible,
        };
        let instances = self.instances.reconcile(host, &mut target);

        let Some(material) = self.materials.default_handle() else {
            return SyncStats {
                instances,
                bodies: BodyStats::default(),
            };
        };
        let bodies = self.bodies.reconcile(
            host,
            &mut self.backend,
            BodyTarget {
                scene,
                material,
                log_on_add: self.config.log_on_add,
            },
        );
        SyncStats { instances, bodies }
    }

    /// Register a node created at runtime together with its subtree
    ///
    /// Instances are created on the next [`synchronize`](Self::synchronize).
    /// Returns the number of nodes newly tracked.
    pub fn register_created_object<H: HostScene + ?Sized>(&mut self, host: &H, root: NodeId) -> usize {
        if self.scene.is_none() {
            log::warn!("Registering {root:?} with a sensor environment that is not active");
            return 0;
        }
        let registered = self.instances.register_subtree(host, root);
        if registered > 0 && self.config.log_on_add {
            log::info!("Sensor environment registered {registered} nodes under {root:?}");
        }
        registered
    }

    /// Register an external body created at runtime
    pub fn register_external_body(&mut self, body: HostBody) -> bool {
        if self.scene.is_none() {
            log::warn!("Registering {:?} with a sensor environment that is not active", body.body);
            return false;
        }
        self.bodies.register(body)
    }

    /// Set the medium lidar beams travel through; `None` clears it
    ///
    /// Replaces and disposes any previous ambient material. An invalid
    /// material is refused and the current one kept.
    pub fn set_ambient_material(&mut self, material: Option<&AmbientMaterial>) -> Result<(), MirrorError> {
        let scene = self.require_scene()?;
        self.materials.set_ambient(&mut self.backend, scene, material)?;
        Ok(())
    }

    /// Backend ambient material currently set
    pub const fn ambient_material(&self) -> Option<MaterialHandle> {
        self.materials.ambient_handle()
    }

    /// Create a sensor native owned by the environment
    pub fn create_sensor(&mut self, descriptor: &SensorDescriptor) -> Result<SensorHandle, MirrorError> {
        self.require_scene()?;
        let sensor = self.backend.create_sensor(descriptor)?;
        self.attachments.track_sensor(sensor);
        Ok(sensor)
    }

    /// Add a sensor to the environment
    pub fn add_sensor(&mut self, sensor: SensorHandle) -> Result<bool, MirrorError> {
        let scene = self.require_scene()?;
        let added = self.attachments.add_sensor(&mut self.backend, scene, sensor);
        if !added {
            log::warn!("Could not add {sensor:?} to the sensor environment");
        } else if self.config.log_on_add {
            log::info!("Sensor environment added {sensor:?}");
        }
        Ok(added)
    }

    /// Remove a sensor from the environment and dispose its native
    ///
    /// A warned no-op once the environment is disposed.
    pub fn remove_sensor(&mut self, sensor: SensorHandle) {
        let Some(scene) = self.scene else {
            log::warn!("Removing {sensor:?} from a sensor environment that is not active");
            return;
        };
        self.attachments.release_sensor(&mut self.backend, scene, sensor);
    }

    /// Whether a sensor native created through the environment is alive
    pub fn has_sensor(&self, sensor: SensorHandle) -> bool {
        self.attachments.has_sensor(sensor)
    }

    /// Add a rigid body measured by a sensor to the environment
    pub fn add_rigid_body(&mut self, body: NativeId) -> Result<bool, MirrorError> {
        let scene = self.require_scene()?;
        Ok(self.attachments.add_rigid_body(&mut self.backend, scene, body))
    }

    /// Allocate a fresh output channel id
    pub fn allocate_channel_id(&mut self) -> Result<ChannelId, MirrorError> {
        Ok(self.channels.next_channel_id()?)
    }

    /// Bind an output composer to a sensor
    pub fn bind_output(
        &mut self,
        composer: &mut OutputComposer,
        sensor: SensorHandle,
        kind: SensorKind,
    ) -> Result<ChannelId, MirrorError> {
        self.require_scene()?;
        Ok(composer.bind(&mut self.channels, &mut self.backend, sensor, kind)?)
    }

    /// Unbind an output composer
    pub fn unbind_output(&mut self, composer: &mut OutputComposer) -> Option<ChannelId> {
        if self.scene.is_none() {
            log::warn!("Unbinding an output from a sensor environment that is not active");
            return None;
        }
        composer.unbind(&mut self.backend)
    }

    fn require_scene(&self) -> Result<SceneHandle, MirrorError> {
        match self.scene {
            Some(scene) => Ok(scene),
            None if self.disposal.is_done() => Err(MirrorError::Disposed),
            None => Err(MirrorError::NotInitialized),
        }
    }

    /// Tear down every backend resource and release the scene
    ///
    /// Runs once; later calls return `None`.
    pub fn shutdown(&mut self) -> Option<DisposalReport> {
        self.disposal.run(DisposalParts {
            backend: &mut self.backend,
            scene: &mut self.scene,
            attachments: &mut self.attachments,
            instances: &mut self.instances,
            shapes: &mut self.shapes,
            bodies: &mut self.bodies,
            materials: &mut self.materials,
        })
    }

    /// Backend
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable backend, for sensors driving their natives
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Configuration
    pub const fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Backend scene, while active
    pub const fn scene(&self) -> Option<SceneHandle> {
        self.scene
    }

    /// Whether initialized and not disposed
    pub const fn is_active(&self) -> bool {
        self.scene.is_some()
    }

    /// Whether teardown ran
    pub const fn is_disposed(&self) -> bool {
        self.disposal.is_done()
    }

    /// Node registry
    pub const fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    /// External body registry
    pub const fn external_bodies(&self) -> &ExternalBodyRegistry {
        &self.bodies
    }

    /// Number of live node instances
    pub fn instance_count(&self) -> usize {
        self.instances.instance_count()
    }

    /// Number of cached shapes
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Number of sensor natives alive
    pub fn sensor_count(&self) -> usize {
        self.attachments.sensor_count()
    }
}

impl<B: RayTraceBackend> Drop for SceneMirror<B> {
    fn drop(&mut self) {
        if !self.disposal.is_done() {
            self.shutdown();
        }
    }
}

impl<B: RayTraceBackend + std::fmt::Debug> std::fmt::Debug for SceneMirror<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneMirror")
            .field("scene", &self.scene)
            .field("nodes", &self.instances.len())
            .field("instances", &self.instances.instance_count())
            .field("shapes", &self.shapes.len())
            .field("bodies", &self.bodies.len())
            .field("disposed", &self.disposal.is_done())
            .finish_non_exhaustive()
    }
}
