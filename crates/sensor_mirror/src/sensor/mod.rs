//! Sensors living in the sensor environment
//!
//! Each sensor owns a backend native and one or more output channels. Sensors
//! take the [`SceneMirror`](crate::mirror::SceneMirror) explicitly at init,
//! on every tick and at teardown.

pub mod encoder;
pub mod imu;
pub mod lidar;
pub mod odometer;

pub use encoder::{
    Constraint, ConstraintKind, EncoderMode, EncoderReading, EncoderSensor, TwoDofSample, WheelJointSample,
};
pub use imu::{ImuRecord, ImuSensor};
pub use lidar::{LidarModel, LidarSensor};
pub use odometer::{OdometerSensor, SignalModifier};

use crate::backend::NativeId;
use crate::mirror::MirrorError;
use crate::output::OutputError;
use thiserror::Error;

/// Kind of sensor, decides which output fields are valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Ray-traced lidar
    Lidar,
    /// Inertial measurement unit
    Imu,
    /// Joint encoder
    Encoder,
    /// Wheel odometer
    Odometer,
}

/// Everything the backend needs to create a sensor native
#[derive(Debug, Clone, PartialEq)]
pub enum SensorDescriptor {
    /// Lidar
    Lidar {
        /// Scan pattern
        model: LidarModel,
        /// Detectable distance `[min, max]` in meters
        range: [f32; 2],
        /// Beam divergence in radians
        beam_divergence: f32,
        /// Beam exit radius in meters
        beam_exit_radius: f32,
        /// Maximum number of bounces
        raytrace_depth: u32,
    },
    /// IMU measuring a rigid body
    Imu {
        /// Measured body
        body: NativeId,
    },
    /// Encoder sampling one degree of freedom of a constraint
    Encoder {
        /// Constraint sampled
        constraint: Constraint,
        /// Degree of freedom for cylindrical joints
        two_dof: TwoDofSample,
        /// Secondary constraint for wheel joints
        wheel: WheelJointSample,
        /// Incremental or absolute
        mode: EncoderMode,
        /// Measurement cycle `[min, max]` in sensor units
        range: [f64; 2],
    },
    /// Odometer integrating the distance rolled by a wheel on a constraint
    Odometer {
        /// Constraint the wheel turns on
        constraint: Constraint,
        /// Wheel radius in meters
        wheel_radius: f64,
        /// Signal modifiers, applied in order
        modifiers: Vec<SignalModifier>,
    },
}

impl SensorDescriptor {
    /// Lidar with default optics
    pub fn lidar(model: LidarModel) -> Self {
        lidar::descriptor(model, &crate::core::config::LidarConfig::default())
    }

    /// Kind of the described sensor
    pub const fn kind(&self) -> SensorKind {
        match self {
            Self::Lidar { .. } => SensorKind::Lidar,
            Self::Imu { .. } => SensorKind::Imu,
            Self::Encoder { .. } => SensorKind::Encoder,
            Self::Odometer { .. } => SensorKind::Odometer,
        }
    }
}

/// Sensor setup and lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// Lidar has no scan pattern
    #[error("No lidar model selected")]
    NoModel,

    /// Joint sensor attached to a constraint it cannot sample
    #[error("Sensor cannot be attached to a {0:?} constraint")]
    UnsupportedAttachment(ConstraintKind),

    /// Sensor parameter out of range
    #[error("Invalid sensor parameter: {0}")]
    InvalidParameter(String),

    /// Sensor configured without any output
    #[error("No output selected")]
    NoOutputs,

    /// Sensor has no native
    #[error("Sensor is not initialized")]
    NotInitialized,

    /// Output index out of range
    #[error("No output {0}")]
    NoSuchOutput(usize),

    /// Environment failure
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// Output failure
    #[error(transparent)]
    Output(#[from] OutputError),
}
