//! Scenario tests driving a full mirror against the in-memory scene graph
//! and the recording backend

mod disposal_order;

use std::sync::Arc;

use crate::backend::RecordingBackend;
use crate::core::config::MirrorConfig;
use crate::foundation::math::{Transform, Vec3};
use crate::mirror::SceneMirror;
use crate::scene::{MeshData, NodeId, SceneGraph};

fn mirror_with(config: MirrorConfig) -> SceneMirror<RecordingBackend> {
    SceneMirror::new(RecordingBackend::new(), config)
}

fn mirror() -> SceneMirror<RecordingBackend> {
    mirror_with(MirrorConfig::default())
}

fn place(scene: &mut SceneGraph, name: &str, mesh: &Arc<MeshData>, x: f32) -> NodeId {
    scene.create_mesh_node(
        name,
        None,
        Arc::clone(mesh),
        Transform::from_position(Vec3::new(x, 0.0, 0.0)),
    )
}
