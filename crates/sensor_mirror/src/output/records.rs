//! Plain record types matching the composer presets
//!
//! Each type is `#[repr(C)]` with explicit padding so that it can be used
//! with [`OutputComposer::view`](super::OutputComposer::view).

use bytemuck::{Pod, Zeroable};

/// Record of [`OutputComposer::point_cloud_24`](super::OutputComposer::point_cloud_24)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointXyzir {
    /// Hit position
    pub xyz: [f32; 3],
    /// Padding
    pub _pad0: u32,
    /// Intensity
    pub intensity: f32,
    /// Ring index
    pub ring: u16,
    /// Padding
    pub _pad1: u16,
}

/// Record of [`OutputComposer::point_cloud_48`](super::OutputComposer::point_cloud_48)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointXyzirAdt {
    /// Hit position
    pub xyz: [f32; 3],
    /// Padding
    pub _pad0: u32,
    /// Intensity
    pub intensity: f32,
    /// Ring index
    pub ring: u16,
    /// Padding
    pub _pad1: u16,
    /// Azimuth
    pub azimuth: f32,
    /// Distance
    pub distance: f32,
    /// Return type
    pub return_type: u8,
    /// Padding
    pub _pad2: u8,
    /// Padding
    pub _pad3: u16,
    /// Padding
    pub _pad4: u32,
    /// Time stamp
    pub time_stamp: f64,
}

/// Record of [`OutputComposer::entity_id_20`](super::OutputComposer::entity_id_20)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EntityIdPoint {
    /// Hit position
    pub xyz: [f32; 3],
    /// Entity id of the hit instance
    pub entity_id: i32,
    /// Intensity
    pub intensity: f32,
}
