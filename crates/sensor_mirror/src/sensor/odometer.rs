//! Odometer sensor
//!
//! Integrates the distance rolled by a wheel turning on a constraint. The
//! output is a single `DISTANCE_F64` per record.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::{Constraint, SensorDescriptor, SensorError, SensorKind};
use crate::backend::{RayTraceBackend, SensorHandle};
use crate::mirror::SceneMirror;
use crate::output::{OutputComposer, OutputField};

/// Post-processing the backend applies to a scalar sensor signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalModifier {
    /// Zero-mean gaussian noise
    GaussianNoise {
        /// Root mean square of the noise
        rms: f64,
    },
    /// Quantization to multiples of `step`
    Resolution {
        /// Smallest representable change
        step: f64,
    },
    /// Multiplication by `factor`
    Scaling {
        /// Scale factor
        factor: f64,
    },
}

/// Odometer attached to a wheel constraint
#[derive(Debug)]
pub struct OdometerSensor {
    constraint: Constraint,
    /// Wheel radius in meters, must be positive
    pub wheel_radius: f64,
    /// Total gaussian noise RMS, if any
    pub noise_rms: Option<f64>,
    /// Encoder pulses per wheel revolution, quantizing the distance, if any
    pub pulses_per_revolution: Option<u32>,
    /// Scale applied to the signal, if any
    pub scaling: Option<f64>,
    native: Option<SensorHandle>,
    output: OutputComposer,
    enabled: bool,
}

impl OdometerSensor {
    /// Default wheel radius in meters
    pub const WHEEL_RADIUS: f64 = 0.5;

    /// Create a noiseless odometer on `constraint`
    pub fn new(constraint: Constraint) -> Self {
        Self {
            constraint,
            wheel_radius: Self::WHEEL_RADIUS,
            noise_rms: None,
            pulses_per_revolution: None,
            scaling: None,
            native: None,
            output: OutputComposer::new(),
            enabled: true,
        }
    }

    /// Distance between two pulses, if quantized
    pub fn signal_resolution(&self) -> Option<f64> {
        self.pulses_per_revolution
            .map(|pulses| TAU * self.wheel_radius / f64::from(pulses))
    }

    /// Modifiers in the order the backend applies them
    pub fn modifiers(&self) -> Vec<SignalModifier> {
        let noise = self.noise_rms.map(|rms| SignalModifier::GaussianNoise { rms });
        let resolution = self.signal_resolution().map(|step| SignalModifier::Resolution { step });
        let scaling = self.scaling.map(|factor| SignalModifier::Scaling { factor });
        [noise, resolution, scaling].into_iter().flatten().collect()
    }

    fn validate(&self) -> Result<(), SensorError> {
        if !self.constraint.kind.supports_odometer() {
            log::warn!(
                "Unsupported constraint {:?} for odometer, odometer will be inactive",
                self.constraint.kind
            );
            return Err(SensorError::UnsupportedAttachment(self.constraint.kind));
        }
        if self.wheel_radius.is_nan() || self.wheel_radius <= 0.0 {
            log::warn!("Invalid wheel radius {}, odometer will be inactive", self.wheel_radius);
            return Err(SensorError::InvalidParameter(format!("wheel radius {}", self.wheel_radius)));
        }
        if self.pulses_per_revolution == Some(0) {
            log::warn!("Zero pulses per revolution, odometer will be inactive");
            return Err(SensorError::InvalidParameter("0 pulses per revolution".to_string()));
        }
        Ok(())
    }

    /// Create the native, bind the distance output and add the odometer to the environment
    pub fn init<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>) -> Result<(), SensorError> {
        if self.native.is_some() {
            return Ok(());
        }
        self.validate()?;
        self.output = OutputComposer::with_fields(&[OutputField::DistanceF64]);

        let native = mirror.create_sensor(&SensorDescriptor::Odometer {
            constraint: self.constraint,
            wheel_radius: self.wheel_radius,
            modifiers: self.modifiers(),
        })?;
        if let Err(e) = mirror.bind_output(&mut self.output, native, SensorKind::Odometer) {
            log::error!("Odometer output could not be bound, odometer will be inactive: {e}");
            mirror.remove_sensor(native);
            return Err(e.into());
        }
        if !mirror.add_sensor(native)? {
            log::warn!("Odometer {native:?} not added properly");
        }
        if !self.enabled {
            mirror.backend_mut().set_sensor_enabled(native, false);
        }
        self.native = Some(native);
        Ok(())
    }

    /// Enable or disable the odometer
    pub fn set_enabled<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>, enabled: bool) {
        self.enabled = enabled;
        if let Some(native) = self.native.filter(|&n| mirror.has_sensor(n)) {
            mirror.backend_mut().set_sensor_enabled(native, enabled);
        }
    }

    /// Unbind the output, remove the odometer from the environment and dispose it
    pub fn destroy<B: RayTraceBackend>(&mut self, mirror: &mut SceneMirror<B>) {
        let Some(native) = self.native.take() else { return };
        if !mirror.is_active() {
            log::warn!("Destroying odometer {native:?} after its environment was disposed");
            return;
        }
        mirror.unbind_output(&mut self.output);
        mirror.remove_sensor(native);
    }

    /// Latest distance in meters, zero before the first write
    pub fn read<B: RayTraceBackend>(&self, mirror: &SceneMirror<B>) -> Result<f64, SensorError> {
        if self.native.is_none() {
            return Err(SensorError::NotInitialized);
        }
        let size = self.output.layout().size;
        let bytes = self.output.raw(mirror.backend());
        Ok(bytes
            .chunks_exact(size)
            .last()
            .and_then(|record| <[u8; 8]>::try_from(record).ok())
            .map_or(0.0, f64::from_le_bytes))
    }

    /// Constraint the wheel turns on
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
