//! # Sensor environment configuration
//!
//! Serializable settings for the mirror and the sensors, loadable from TOML
//! or RON through the [`Config`] trait.

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError, ConfigFormat};
use crate::mirror::materials::{AmbientMaterial, SurfaceMaterial};
use crate::output::OutputField;
use crate::sensor::LidarModel;

/// Mirror behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Keep instances for nodes disabled in the hierarchy
    pub track_invisible: bool,

    /// Register disabled nodes and bodies during the initial scan
    pub include_inactive_on_scan: bool,

    /// Log every object added to the environment
    pub log_on_add: bool,

    /// Material for nodes without a surface material binding, and for bodies
    pub default_material: SurfaceMaterial,

    /// Medium set on the scene at initialization
    pub ambient_material: Option<AmbientMaterial>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            track_invisible: false,
            include_inactive_on_scan: true,
            log_on_add: false,
            default_material: SurfaceMaterial::default(),
            ambient_material: None,
        }
    }
}

impl Config for MirrorConfig {}

/// Lidar sensor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LidarConfig {
    /// Scan pattern preset
    pub model: LidarModel,

    /// Closest detectable distance in meters
    pub range_min: f32,

    /// Farthest detectable distance in meters
    pub range_max: f32,

    /// Beam divergence in radians
    pub beam_divergence: f32,

    /// Beam exit radius in meters
    pub beam_exit_radius: f32,

    /// Maximum number of ray bounces
    pub raytrace_depth: u32,

    /// Output record layout
    pub outputs: Vec<OutputField>,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            model: LidarModel::default(),
            range_min: 0.1,
            range_max: f32::MAX,
            beam_divergence: 0.001,
            beam_exit_radius: 0.005,
            raytrace_depth: 1,
            outputs: vec![OutputField::XyzVec3F32, OutputField::IntensityF32],
        }
    }
}

impl Config for LidarConfig {}

/// Top-level settings file of an application using the mirror
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorEnvironmentConfig {
    /// Mirror settings
    pub mirror: MirrorConfig,
    /// Lidar settings
    pub lidar: LidarConfig,
}

impl Config for SensorEnvironmentConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let text = r#"
[mirror]
track_invisible = true

[lidar]
range_max = 120.0
outputs = ["XYZ_VEC3_F32", "PADDING_32", "INTENSITY_F32"]

[lidar.model]
preset = "generic360_horizontal_sweep"
frequency = 20.0
"#;
        let config = SensorEnvironmentConfig::from_str_with_format(text, ConfigFormat::Toml).unwrap();

        assert!(config.mirror.track_invisible);
        assert!(config.mirror.include_inactive_on_scan);
        assert_eq!(config.mirror.default_material, SurfaceMaterial::default());
        assert_eq!(config.mirror.ambient_material, None);
        assert_eq!(config.lidar.range_max, 120.0);
        assert_eq!(config.lidar.range_min, 0.1);
        assert_eq!(config.lidar.outputs.len(), 3);
        assert_eq!(config.lidar.model, LidarModel::Generic360HorizontalSweep { frequency: 20.0 });
    }

    #[test]
    fn test_ambient_material_from_toml() {
        let text = r#"
[mirror.ambient_material]
type = "fog"
visibility = 0.4
wavelength = 905.0
maritimeness = 1.0
"#;
        let config = SensorEnvironmentConfig::from_str_with_format(text, ConfigFormat::Toml).unwrap();

        assert_eq!(
            config.mirror.ambient_material,
            Some(AmbientMaterial::Fog {
                visibility: 0.4,
                wavelength: 905.0,
                maritimeness: 1.0
            })
        );
    }

    #[test]
    fn test_ron_flags() {
        let text = "(track_invisible: true, log_on_add: true)";
        let config = MirrorConfig::from_str_with_format(text, ConfigFormat::Ron).unwrap();

        assert!(config.track_invisible);
        assert!(config.log_on_add);
        assert!(config.include_inactive_on_scan);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        assert!(matches!(
            MirrorConfig::load_from_file("mirror.yaml"),
            Err(ConfigError::Io(_) | ConfigError::UnsupportedFormat(_))
        ));
    }
}
