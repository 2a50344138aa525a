//! Foundation module - Core utilities and types
//!
//! - Math types shared with the backend interface
//! - Logging utilities

pub mod logging;
pub mod math;
