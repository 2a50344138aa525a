//! Host scene: the side of the world the mirror observes

pub mod host;
pub mod scene_graph;

pub use host::{
    find_nearest, resolve_inclusion, resolve_material, BodyId, HostBody, HostScene, InclusionRule, MaterialBinding,
    MeshData, NodeId,
};
pub use scene_graph::SceneGraph;
