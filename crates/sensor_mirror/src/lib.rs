//! # Sensor Mirror
//!
//! Keeps the geometric scene of an external ray-tracing sensor backend in
//! step with a host scene graph, and composes the binary records sensors
//! write to their output channels.
//!
//! ## Features
//!
//! - **Shape deduplication**: one backend shape per distinct mesh
//! - **Visibility diffing**: instances follow host nodes being enabled,
//!   disabled, created and destroyed
//! - **External bodies**: terrains, wires and cables added on visibility change
//! - **Sensors**: lidar, IMU, joint encoder and wheel odometer natives
//! - **Ambient medium**: air, fog, rain or snow for lidar beams to travel through
//! - **Output records**: exact, ordered binary layouts with typed views
//! - **Ordered teardown**: every backend resource released before the scene
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sensor_mirror::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut host = SceneGraph::new();
//!     let cube = Arc::new(MeshData::cube(0.5));
//!     host.create_mesh_node("crate", None, cube, Transform::identity());
//!     let lidar_node = host.create_node("lidar", None);
//!
//!     let mut mirror = SceneMirror::new(RecordingBackend::new(), MirrorConfig::default());
//!     mirror.initialize(&host)?;
//!
//!     let mut lidar = LidarSensor::new(lidar_node, LidarConfig::default());
//!     lidar.add_output(&mut mirror, OutputComposer::point_cloud_24())?;
//!     lidar.init(&mut mirror, &host)?;
//!
//!     for _ in 0..10 {
//!         mirror.synchronize(&host);
//!         lidar.tick(&mut mirror, &host);
//!     }
//!
//!     mirror.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod backend;
pub mod config;
pub mod core;
pub mod foundation;
pub mod mirror;
pub mod output;
pub mod scene;
pub mod sensor;

/// Common imports for users of the mirror
pub mod prelude {
    pub use crate::{
        backend::{NativeId, RayTraceBackend, RecordingBackend},
        core::{Config, LidarConfig, MirrorConfig, SensorEnvironmentConfig},
        foundation::math::{Quat, Transform, Vec3},
        mirror::{AmbientMaterial, ExternalBody, MirrorError, SceneMirror, SurfaceMaterial},
        output::{ChannelId, OutputComposer, OutputField, PointXyzir, PointXyzirAdt},
        scene::{HostScene, InclusionRule, MaterialBinding, MeshData, NodeId, SceneGraph},
        sensor::{EncoderSensor, ImuSensor, LidarModel, LidarSensor, OdometerSensor, SensorError},
    };
}
