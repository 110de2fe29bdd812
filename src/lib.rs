//! CPU-side scene core for a model viewer: keyframe animation evaluation,
//! cached mesh skinning and normal regeneration with vertex dedup.

pub mod anim;
pub mod mesh_edit;
pub mod scene;
pub mod skinning;
