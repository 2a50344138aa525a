//! # Core configuration
//!
//! Re-exports the configuration types used to set up a sensor environment.

pub mod config;

pub use config::{Config, ConfigError, LidarConfig, MirrorConfig, SensorEnvironmentConfig};
