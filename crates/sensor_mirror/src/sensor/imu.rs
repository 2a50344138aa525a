//! IMU sensor
//!
//! Measures a rigid body: acceleration, angular velocity and magnetic field,
//! sampled at a local offset from a host node.

use bytemuck::{Pod, Zeroable};

use super::{SensorDescriptor, SensorError, SensorKind};
use crate::backend::{NativeId, RayTraceBackend, SensorHandle};
use crate::foundation::math::{Transform, Vec3};
use crate::mirror::SceneMirror;
use crate::output::{OutputComposer, OutputField};
use crate::scene::{HostScene, NodeId};

/// One IMU sample as written by the backend
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ImuRecord {
    /// Linear acceleration
    pub acceleration: [f32; 3],
    /// Angular velocity
    pub angular_velocity: [f32; 3],
    /// Magnetic field
    pub magnetic_field: [f32; 3],
}

impl ImuRecord {
    /// Acceleration as a vector
    pub fn acceleration(&self) -> Vec3 {
        Vec3::from(self.acceleration)
    }

    /// Angular velocity as a vector
    pub fn angular_velocity(&self) -> Vec3 {
        Vec3::from(self.angular_velocity)
    }

    /// Magnetic field as a vector
    pub fn magnetic_field(&self) -> Vec3 {
        Vec3::from(self.magnetic_field)
    }
}

/// IMU mounted on a host node, measuring a rigid body
#[derive(Debug)]
pub struct ImuSensor {
    node: NodeId,
    body: NativeId,
    local: Transform,
    native: Option<SensorHandle>,
    output: OutputComposer,
    enabled: bool,
}

impl ImuSensor {
    /// Create an IMU at `local` relative to `node`, measuring `body`
    pub fn new(node: NodeId, body: NativeId, local: Transform) -> Self {
        Self {
            node,
            body,
            local,
            native: None,
            output: OutputComposer::with_fields(&[
                OutputField::AccelerationVec3F32,
                OutputField::AngularVelocityVec3F32,
                OutputField::MagneticFieldVec3F32,
            ]),
            enabled: true,
        }
    }

    fn frame<H: HostScene + ?Sized>(&self, host: &H) -> Transform {
        host.world_transform(self.node).compose(&self.local)
    }

    /// Create the native, add the measured body and the IMU to the environment
    pub fn init<B: RayTraceBackend, H: HostScene + ?Sized>(
        &mut self,
        mirror: &mut SceneMirror<B>,
        host: &H,
    ) -> Result<(), SensorError> {
        if self.native.is_some() {
            return Ok(());
        }

        let native = mirror.create_sensor(&SensorDescriptor::Imu { body: self.body })?;
        if !mirror.add_rigid_body(self.body)? {
            log::warn!("Rigid body {:?} measured by IMU could not be added", self.body);
        }
        mirror.backend_mut().set_sensor_frame(native, &self.frame(host));

        if let Err(e) = mirror.bind_output(&mut self.output, native, SensorKind::Imu) {
            log::error!("IMU output could not be bound, IMU will be inactive: {e}");
            mirror.remove_sensor(native);
            return Err(e.into());
        }
        if !mirror.add_sensor(native)? {
            log::warn!("IMU {native:?} not added properly");
        }
        if !self.enabled {
            mirror.backend_mut().set_sensor_enabled(native, false);
        }
        self.native = Some(native);
        Ok(())
    }

    /// Move the IMU with its node
    pub fn tick<B: RayTraceBackend, H: HostScene + ?Sized>(&mut self, mirror: &mut SceneMirror<B>, host: &H) {
        let Some(native) = self.native else { return };
        if !self.enabled || !mirror.is_active() || !host.is_alive(self.node) {
            return;
        }
        let frame = self.frame(host);
        mirror.backend_mut().set_sensor_frame(native, &frame);
    }

    /// Enable or disable sampling
    pub fn set_enabled<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>, enabled: bool) {
        self.enabled = enabled;
        if let Some(native) = self.native.filter(|&n| mirror.has_sensor(n)) {
            mirror.backend_mut().set_sensor_enabled(native, enabled);
        }
    }

    /// Unbind the output, remove the IMU from the environment and dispose it
    pub fn destroy<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>) {
        let Some(native) = self.native.take() else { return };
        if !mirror.is_active() {
            log::warn!("Destroying IMU {native:?} after its environment was disposed");
            return;
        }
        mirror.unbind_output(&mut self.output);
        mirror.remove_sensor(native);
    }

    /// Most recent sample
    pub fn latest<B: RayTraceBackend>(&self, mirror: &SceneMirror<B>) -> Result<Option<ImuRecord>, SensorError> {
        if self.native.is_none() {
            return Err(SensorError::NotInitialized);
        }
        let samples: Vec<ImuRecord> = self.output.view(mirror.backend())?;
        Ok(samples.last().copied())
    }

    /// Measured body
    pub const fn body(&self) -> NativeId {
        self.body
    }

    /// Backend native, once initialized
    pub const fn native(&self) -> Option<SensorHandle> {
        self.native
    }

    /// Output channel
    pub const fn output(&self) -> &OutputComposer {
        &self.output
    }
}
