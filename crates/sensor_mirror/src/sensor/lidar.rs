//! Lidar sensor
//!
//! Follows a host node, emits one record per ray hit on each bound output.

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use super::{SensorDescriptor, SensorError, SensorKind};
use crate::backend::{RayTraceBackend, SensorHandle};
use crate::core::config::LidarConfig;
use crate::mirror::SceneMirror;
use crate::output::{ChannelId, OutputComposer};
use crate::scene::{HostScene, NodeId};

/// Scan pattern preset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "preset")]
pub enum LidarModel {
    /// Single horizontal ring sweeping 360 degrees
    #[serde(rename = "generic360_horizontal_sweep")]
    Generic360HorizontalSweep {
        /// Sweeps per second
        frequency: f32,
    },
    /// Ouster OS0
    #[serde(rename = "ouster_os0")]
    OusterOs0,
    /// Ouster OS1
    #[default]
    #[serde(rename = "ouster_os1")]
    OusterOs1,
    /// Ouster OS2
    #[serde(rename = "ouster_os2")]
    OusterOs2,
    /// No pattern; the lidar cannot be initialized
    #[serde(rename = "none")]
    None,
}

impl LidarModel {
    /// Horizontal sweep at the usual 10 Hz
    pub const fn generic_360() -> Self {
        Self::Generic360HorizontalSweep { frequency: 10.0 }
    }
}

pub(super) fn descriptor(model: LidarModel, config: &LidarConfig) -> SensorDescriptor {
    SensorDescriptor::Lidar {
        model,
        range: [config.range_min, config.range_max],
        beam_divergence: config.beam_divergence,
        beam_exit_radius: config.beam_exit_radius,
        raytrace_depth: config.raytrace_depth,
    }
}

/// Lidar attached to a host node
#[derive(Debug)]
pub struct LidarSensor {
    node: NodeId,
    config: LidarConfig,
    native: Option<SensorHandle>,
    outputs: Vec<OutputComposer>,
    enabled: bool,
}

impl LidarSensor {
    /// Create a lidar; the configured output fields become its first output
    pub fn new(node: NodeId, config: LidarConfig) -> Self {
        let outputs = if config.outputs.is_empty() {
            Vec::new()
        } else {
            vec![OutputComposer::with_fields(&config.outputs)]
        };
        Self {
            node,
            config,
            native: None,
            outputs,
            enabled: true,
        }
    }

    /// Add an output channel
    ///
    /// Before init the output is bound during init; afterwards it is bound
    /// right away. Returns the output index.
    pub fn add_output<B: RayTraceBackend>(
        &mut self,
        mirror: &mut SceneMirror<B>,
        mut composer: OutputComposer,
    ) -> Result<usize, SensorError> {
        if let Some(native) = self.native {
            mirror.bind_output(&mut composer, native, SensorKind::Lidar)?;
        }
        self.outputs.push(composer);
        Ok(self.outputs.len() - 1)
    }

    /// Create the native, bind every output and add the lidar to the environment
    ///
    /// On failure the lidar stays inactive and owns no native.
    pub fn init<B: RayTraceBackend, H: HostScene + ?Sized>(
        &mut self,
        mirror: &mut SceneMirror<B>,
        host: &H,
    ) -> Result<(), SensorError> {
        if self.native.is_some() {
            return Ok(());
        }
        if self.config.model == LidarModel::None {
            log::warn!("No lidar model selected for {:?}, lidar will be inactive", self.node);
            return Err(SensorError::NoModel);
        }

        let native = mirror.create_sensor(&descriptor(self.config.model, &self.config))?;
        mirror.backend_mut().set_sensor_frame(native, &host.world_transform(self.node));

        let failure = self
            .outputs
            .iter_mut()
            .find_map(|composer| mirror.bind_output(composer, native, SensorKind::Lidar).err());
        if let Some(e) = failure {
            log::error!("Lidar output could not be bound, lidar will be inactive: {e}");
            for bound in self.outputs.iter_mut().filter(|c| c.is_bound()) {
                mirror.unbind_output(bound);
            }
            mirror.remove_sensor(native);
            return Err(e.into());
        }

        if !mirror.add_sensor(native)? {
            log::warn!("Lidar {native:?} not added properly");
        }
        if !self.enabled {
            mirror.backend_mut().set_sensor_enabled(native, false);
        }
        self.native = Some(native);
        Ok(())
    }

    /// Move the lidar to its node's current world frame
    pub fn tick<B: RayTraceBackend, H: HostScene + ?Sized>(&mut self, mirror: &mut SceneMirror<B>, host: &H) {
        let Some(native) = self.native else { return };
        if !self.enabled || !mirror.is_active() || !host.is_alive(self.node) {
            return;
        }
        mirror.backend_mut().set_sensor_frame(native, &host.world_transform(self.node));
    }

    /// Enable or disable ray tracing for this lidar
    pub fn set_enabled<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>, enabled: bool) {
        self.enabled = enabled;
        if let Some(native) = self.native.filter(|&n| mirror.has_sensor(n)) {
            mirror.backend_mut().set_sensor_enabled(native, enabled);
        }
    }

    /// Unbind outputs, remove the lidar from the environment and dispose it
    pub fn destroy<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>) {
        let Some(native) = self.native.take() else { return };
        if !mirror.is_active() {
            log::warn!("Destroying lidar {native:?} after its environment was disposed");
            return;
        }
        for composer in &mut self.outputs {
            mirror.unbind_output(composer);
        }
        mirror.remove_sensor(native);
    }

    /// Latest records of one output
    pub fn view<T: Pod, B: RayTraceBackend>(&self, mirror: &SceneMirror<B>, output: usize) -> Result<Vec<T>, SensorError> {
        let composer = self.outputs.get(output).ok_or(SensorError::NoSuchOutput(output))?;
        Ok(composer.view(mirror.backend())?)
    }

    /// Host node the lidar follows
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Backend native, once initialized
    pub const fn native(&self) -> Option<SensorHandle> {
        self.native
    }

    /// Whether init succeeded and the lidar is not destroyed
    pub const fn is_initialized(&self) -> bool {
        self.native.is_some()
    }

    /// Output channels
    pub fn outputs(&self) -> &[OutputComposer] {
        &self.outputs
    }

    /// Channel ids of the bound outputs
    pub fn channels(&self) -> Vec<ChannelId> {
        self.outputs.iter().filter_map(OutputComposer::channel).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};
    use crate::core::config::MirrorConfig;
    use crate::foundation::math::{Transform, Vec3};
    use crate::output::{OutputField, PointXyzir};
    use crate::scene::SceneGraph;
    use approx::assert_relative_eq;

    fn setup() -> (SceneMirror<RecordingBackend>, SceneGraph, NodeId) {
        let mut host = SceneGraph::new();
        let node = host.create_node("lidar", None);
        host.set_local_transform(node, Transform::from_position(Vec3::new(0.0, 0.0, 2.0)));
        let mut mirror = SceneMirror::new(RecordingBackend::new(), MirrorConfig::default());
        mirror.initialize(&host).unwrap();
        (mirror, host, node)
    }

    #[test]
    fn test_init_binds_pending_outputs() {
        let (mut mirror, host, node) = setup();
        let mut lidar = LidarSensor::new(node, LidarConfig::default());
        lidar.add_output(&mut mirror, OutputComposer::point_cloud_24()).unwrap();

        lidar.init(&mut mirror, &host).unwrap();

        let native = lidar.native().unwrap();
        assert_eq!(lidar.channels().len(), 2);
        assert_eq!(mirror.backend().sensor_outputs(native).len(), 2);
        assert!(mirror.backend().is_added(crate::backend::NativeObject::Sensor(native)));
    }

    #[test]
    fn test_output_added_after_init_binds_immediately() {
        let (mut mirror, host, node) = setup();
        let mut lidar = LidarSensor::new(node, LidarConfig::default());
        lidar.init(&mut mirror, &host).unwrap();

        let index = lidar.add_output(&mut mirror, OutputComposer::point_cloud_48()).unwrap();

        assert!(lidar.outputs()[index].is_bound());
    }

    #[test]
    fn test_no_model_leaves_lidar_inactive() {
        let (mut mirror, host, node) = setup();
        let config = LidarConfig {
            model: LidarModel::None,
            ..LidarConfig::default()
        };
        let mut lidar = LidarSensor::new(node, config);

        assert_eq!(lidar.init(&mut mirror, &host), Err(SensorError::NoModel));
        assert!(!lidar.is_initialized());
        assert_eq!(mirror.backend().live_sensors(), 0);
    }

    #[test]
    fn test_bad_output_releases_native() {
        let (mut mirror, host, node) = setup();
        let config = LidarConfig {
            outputs: vec![OutputField::SpeedF64],
            ..LidarConfig::default()
        };
        let mut lidar = LidarSensor::new(node, config);

        assert!(matches!(lidar.init(&mut mirror, &host), Err(SensorError::Mirror(_))));
        assert!(!lidar.is_initialized());
        assert_eq!(mirror.backend().live_sensors(), 0);
    }

    #[test]
    fn test_tick_follows_node() {
        let (mut mirror, mut host, node) = setup();
        let mut lidar = LidarSensor::new(node, LidarConfig::default());
        lidar.init(&mut mirror, &host).unwrap();

        host.set_local_transform(node, Transform::from_position(Vec3::new(5.0, 0.0, 2.0)));
        lidar.tick(&mut mirror, &host);

        let frame = mirror.backend().sensor_frame(lidar.native().unwrap()).unwrap();
        assert_relative_eq!(frame.position, Vec3::new(5.0, 0.0, 2.0));
    }

    #[test]
    fn test_disable_and_destroy() {
        let (mut mirror, host, node) = setup();
        let mut lidar = LidarSensor::new(node, LidarConfig::default());
        lidar.init(&mut mirror, &host).unwrap();
        let native = lidar.native().unwrap();

        lidar.set_enabled(&mut mirror, false);
        assert_eq!(mirror.backend().sensor_enabled(native), Some(false));

        lidar.destroy(&mut mirror);
        assert_eq!(mirror.backend().live_sensors(), 0);
        assert!(!mirror.backend().is_added(crate::backend::NativeObject::Sensor(native)));
        assert_eq!(mirror.backend().count_calls(|c| matches!(c, BackendCall::RemoveOutput(..))), 1);
    }

    #[test]
    fn test_destroy_after_shutdown_is_a_no_op() {
        let (mut mirror, host, node) = setup();
        let mut lidar = LidarSensor::new(node, LidarConfig::default());
        lidar.init(&mut mirror, &host).unwrap();
        let report = mirror.shutdown().unwrap();
        assert_eq!(report.sensors, 1);
        mirror.backend_mut().clear_calls();

        lidar.destroy(&mut mirror);

        assert!(mirror.backend().calls().is_empty());
        assert!(!lidar.is_initialized());
    }

    #[test]
    fn test_view_unbound_output_index() {
        let (mirror, _host, node) = setup();
        let lidar = LidarSensor::new(node, LidarConfig::default());

        let points: Vec<[f32; 4]> = lidar.view(&mirror, 0).unwrap();
        assert!(points.is_empty());
        assert!(lidar.view::<PointXyzir, _>(&mirror, 3).is_err());
    }
}
