//! Encoder sensor
//!
//! Samples the position and/or speed of one degree of freedom of a joint.

use serde::{Deserialize, Serialize};

use super::{SensorDescriptor, SensorError, SensorKind};
use crate::backend::{NativeId, RayTraceBackend, SensorHandle};
use crate::mirror::SceneMirror;
use crate::output::{OutputComposer, OutputField};

/// Kind of a constraint a joint sensor may be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Rotational, one degree of freedom
    Hinge,
    /// Translational, one degree of freedom
    Prismatic,
    /// Rotation and translation about one axis
    CylindricalJoint,
    /// Vehicle wheel with steering and suspension
    WheelJoint,
    /// Ball joint
    BallJoint,
    /// Lock joint
    LockJoint,
    /// Distance joint
    DistanceJoint,
    /// Hinge following a spline
    SplineJoint,
    /// Hinge with slack
    SlackHingeJoint,
    /// Cylindrical joint with slack
    SlackCylindricalJoint,
}

impl ConstraintKind {
    /// Whether an encoder can sample this kind
    pub const fn supports_encoder(self) -> bool {
        matches!(
            self,
            Self::Hinge | Self::Prismatic | Self::CylindricalJoint | Self::WheelJoint
        )
    }

    /// Whether an odometer can roll a wheel on this kind
    pub const fn supports_odometer(self) -> bool {
        matches!(
            self,
            Self::Hinge
                | Self::WheelJoint
                | Self::CylindricalJoint
                | Self::SplineJoint
                | Self::SlackHingeJoint
                | Self::SlackCylindricalJoint
        )
    }
}

/// A constraint owned by the physics side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    /// Native identity
    pub id: NativeId,
    /// Kind
    pub kind: ConstraintKind,
}

/// Degree of freedom sampled on a cylindrical joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TwoDofSample {
    /// Translation
    #[default]
    First,
    /// Rotation
    Second,
}

/// Secondary constraint sampled on a wheel joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WheelJointSample {
    /// Wheel rotation
    #[default]
    WheelAxle,
    /// Steering angle
    Steering,
    /// Suspension travel
    Suspension,
}

/// Encoder counting mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncoderMode {
    /// Position wraps within the measurement range
    #[default]
    Incremental,
    /// Position is absolute within the measurement range
    Absolute,
}

/// Latest position and speed; zero for fields not selected
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EncoderReading {
    /// Position in sensor units
    pub position: f64,
    /// Speed in sensor units per second
    pub speed: f64,
}

/// Encoder attached to a constraint
#[derive(Debug)]
pub struct EncoderSensor {
    constraint: Constraint,
    /// Sample the first or second DoF of cylindrical joints
    pub two_dof: TwoDofSample,
    /// Secondary constraint sampled on wheel joints
    pub wheel: WheelJointSample,
    /// Counting mode
    pub mode: EncoderMode,
    /// Measurement cycle `[min, max]`
    pub range: [f64; 2],
    /// Emit the position
    pub output_position: bool,
    /// Emit the speed
    pub output_speed: bool,
    native: Option<SensorHandle>,
    output: OutputComposer,
    enabled: bool,
}

impl EncoderSensor {
    /// Create an encoder emitting the position of `constraint`
    pub fn new(constraint: Constraint) -> Self {
        Self {
            constraint,
            two_dof: TwoDofSample::default(),
            wheel: WheelJointSample::default(),
            mode: EncoderMode::default(),
            range: [f64::MIN, f64::MAX],
            output_position: true,
            output_speed: false,
            native: None,
            output: OutputComposer::new(),
            enabled: true,
        }
    }

    /// Create the native, bind the selected outputs and add the encoder to the environment
    pub fn init<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>) -> Result<(), SensorError> {
        if self.native.is_some() {
            return Ok(());
        }
        if !self.constraint.kind.supports_encoder() {
            log::warn!(
                "Unsupported constraint {:?} for encoder, encoder will be inactive",
                self.constraint.kind
            );
            return Err(SensorError::UnsupportedAttachment(self.constraint.kind));
        }
        if !self.output_position && !self.output_speed {
            log::warn!("No output configured for encoder on {:?}", self.constraint.id);
            return Err(SensorError::NoOutputs);
        }

        let mut fields = Vec::with_capacity(2);
        if self.output_position {
            fields.push(OutputField::PositionF64);
        }
        if self.output_speed {
            fields.push(OutputField::SpeedF64);
        }
        self.output = OutputComposer::with_fields(&fields);

        let native = mirror.create_sensor(&SensorDescriptor::Encoder {
            constraint: self.constraint,
            two_dof: self.two_dof,
            wheel: self.wheel,
            mode: self.mode,
            range: self.range,
        })?;
        if let Err(e) = mirror.bind_output(&mut self.output, native, SensorKind::Encoder) {
            log::error!("Encoder output could not be bound, encoder will be inactive: {e}");
            mirror.remove_sensor(native);
            return Err(e.into());
        }
        if !mirror.add_sensor(native)? {
            log::warn!("Encoder {native:?} not added properly");
        }
        if !self.enabled {
            mirror.backend_mut().set_sensor_enabled(native, false);
        }
        self.native = Some(native);
        Ok(())
    }

    /// Enable or disable sampling
    pub fn set_enabled<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>, enabled: bool) {
        self.enabled = enabled;
        if let Some(native) = self.native.filter(|&n| mirror.has_sensor(n)) {
            mirror.backend_mut().set_sensor_enabled(native, enabled);
        }
    }

    /// Unbind the output, remove the encoder from the environment and dispose it
    pub fn destroy<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>) {
        let Some(native) = self.native.take() else { return };
        if !mirror.is_active() {
            log::warn!("Destroying encoder {native:?} after its environment was disposed");
            return;
        }
        mirror.unbind_output(&mut self.output);
        mirror.remove_sensor(native);
    }

    /// Latest reading
    ///
    /// Fields that are not selected, or not yet written, read as zero.
    pub fn read<B: RayTraceBackend>(&self, mirror: &SceneMirror<B>) -> Result<EncoderReading, SensorError> {
        if self.native.is_none() {
            return Err(SensorError::NotInitialized);
        }
        let layout = self.output.layout();
        let bytes = self.output.raw(mirror.backend());
        let Some(record) = bytes.chunks_exact(layout.size).last() else {
            return Ok(EncoderReading::default());
        };

        let value = |field: OutputField| {
            layout
                .find(field)
                .and_then(|spec| record.get(spec.offset..spec.offset + spec.width))
                .and_then(|slice| <[u8; 8]>::try_from(slice).ok())
                .map_or(0.0, f64::from_le_bytes)
        };
        Ok(EncoderReading {
            position: value(OutputField::PositionF64),
            speed: value(OutputField::SpeedF64),
        })
    }

    /// Constraint sampled
    pub const fn constraint(&self) -> Constraint {
        self.constraint
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
