//! The sensor environment mirror
//!
//! Keeps the backend's ray-trace scene consistent with the host scene:
//! - [`ShapeCache`] deduplicates geometry into backend shapes
//! - [`InstanceRegistry`] diffs node visibility and owns instances
//! - [`ExternalBodyRegistry`] adds and removes terrains, wires and cables
//! - [`DisposalSequencer`] tears it all down in order
//! - [`SceneMirror`] owns the above and drives them

pub mod attachments;
pub mod disposal;
pub mod external_bodies;
pub mod instance_registry;
pub mod materials;
pub mod shape_cache;
pub mod synchronizer;

#[cfg(test)]
mod tests;

pub use attachments::AttachedNatives;
pub use disposal::{DisposalReport, DisposalSequencer};
pub use external_bodies::{BodyStats, ExternalBody, ExternalBodyRecord, ExternalBodyRegistry};
pub use instance_registry::{InstanceRegistry, NodeRecord, ReconcileStats};
pub use materials::{AmbientConstants, AmbientMaterial, MaterialCache, SurfaceMaterial};
pub use shape_cache::{GeometryKey, ShapeCache};
pub use synchronizer::{MirrorError, SceneMirror, SyncStats};
