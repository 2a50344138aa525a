//! Backend abstraction for the ray-tracing sensor environment
//!
//! The backend owns its own geometric scene and is consumed through the narrow
//! [`RayTraceBackend`] trait. Everything the mirror creates on the backend side
//! is referred to by one of the opaque handle types below.

pub mod recording;

pub use recording::{BackendCall, RecordingBackend};

use crate::foundation::math::{Transform, Vec3};
use crate::mirror::materials::{AmbientMaterial, SurfaceMaterial};
use crate::output::{ChannelId, RecordDescriptor};
use crate::sensor::SensorDescriptor;
use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors reported by a backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Geometry could not be compiled into a shape (empty, non-triangle, bad indices)
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// A handle passed to the backend is unknown or already disposed
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// The node no longer carries geometry
    #[error("Node has no geometry")]
    MissingGeometry,

    /// The backend refused to create a resource
    #[error("Creation failed: {0}")]
    CreationFailed(String),

    /// A resource parameter is out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

macro_rules! backend_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

backend_handle!(
    /// Handle to the backend scene that instances and bodies live in
    SceneHandle
);
backend_handle!(
    /// Handle to backend-compiled geometry
    ShapeHandle
);
backend_handle!(
    /// Handle to a placed shape in the backend scene
    InstanceHandle
);
backend_handle!(
    /// Handle to a backend surface or ambient material
    MaterialHandle
);
backend_handle!(
    /// Handle to a backend sensor (lidar, IMU, encoder)
    SensorHandle
);
backend_handle!(
    /// Identity of a native object owned by the physics side (terrain, wire, body, ...)
    NativeId
);

/// Entity id attached to every instance; reported back by ray hits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

/// Any disposable backend resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendHandle {
    /// Compiled shape
    Shape(ShapeHandle),
    /// Placed instance
    Instance(InstanceHandle),
    /// Surface material
    Material(MaterialHandle),
    /// Sensor
    Sensor(SensorHandle),
}

/// Native objects that can be added to and removed from the backend scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeObject {
    /// Deformable terrain
    Terrain(NativeId),
    /// Paged deformable terrain
    TerrainPager(NativeId),
    /// Wire
    Wire(NativeId),
    /// Cable
    Cable(NativeId),
    /// Rigid body (measured by an IMU)
    RigidBody(NativeId),
    /// Sensor
    Sensor(SensorHandle),
}

/// Interface to the external ray-tracing backend
///
/// All calls are synchronous and are only made from the simulation step.
pub trait RayTraceBackend {
    /// Create the scene that instances and bodies are added to
    fn create_scene(&mut self) -> BackendResult<SceneHandle>;

    /// Release the scene; every resource in it must already be gone
    fn release_scene(&mut self, scene: SceneHandle);

    /// Compile triangle geometry into a shape
    fn create_shape(&mut self, vertices: &[Vec3], indices: &[u32]) -> BackendResult<ShapeHandle>;

    /// Create a surface material
    fn create_material(&mut self, material: &SurfaceMaterial) -> BackendResult<MaterialHandle>;

    /// Create an ambient material from its atmospheric configuration
    fn create_ambient_material(&mut self, material: &AmbientMaterial) -> BackendResult<MaterialHandle>;

    /// Set or clear the ambient material of the scene
    fn set_ambient_material(&mut self, scene: SceneHandle, material: Option<MaterialHandle>);

    /// Place a shape in the scene
    fn create_instance(
        &mut self,
        scene: SceneHandle,
        shape: ShapeHandle,
        material: MaterialHandle,
        entity: EntityId,
    ) -> BackendResult<InstanceHandle>;

    /// Set the world transform of an instance (position, rotation, non-uniform scale)
    fn set_transform(&mut self, instance: InstanceHandle, transform: &Transform);

    /// Add a native object to the scene, returns false if the backend refused
    fn add(&mut self, scene: SceneHandle, object: NativeObject) -> bool;

    /// Remove a native object from the scene
    fn remove(&mut self, scene: SceneHandle, object: NativeObject);

    /// Assign a surface material to a native object
    fn assign_material(&mut self, object: NativeObject, material: MaterialHandle);

    /// Dispose a backend resource
    fn dispose(&mut self, handle: BackendHandle);

    /// Create a sensor from its descriptor
    fn create_sensor(&mut self, descriptor: &SensorDescriptor) -> BackendResult<SensorHandle>;

    /// Move a sensor
    fn set_sensor_frame(&mut self, sensor: SensorHandle, frame: &Transform);

    /// Enable or disable a sensor
    fn set_sensor_enabled(&mut self, sensor: SensorHandle, enabled: bool);

    /// Register an output record layout with the sensor's output handler
    fn add_output(&mut self, sensor: SensorHandle, channel: ChannelId, record: &RecordDescriptor) -> bool;

    /// Remove an output from the sensor's output handler
    fn remove_output(&mut self, sensor: SensorHandle, channel: ChannelId);

    /// Latest raw records written to an output channel
    fn read_output(&self, sensor: SensorHandle, channel: ChannelId) -> Option<Vec<u8>>;
}
