pub mod mesh;
pub mod node;

use std::sync::Arc;

use glam::Vec3;
use thiserror::Error;

use crate::anim::animator::SceneAnimator;
use crate::anim::clip::AnimationClip;
use crate::skinning::cpu_skinner::CpuSkinner;
use self::mesh::Mesh;
use self::node::{NodeDesc, NodeId};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("mesh {mesh}: {channel} has {got} entries, expected {expected}")]
    ChannelLengthMismatch {
        mesh: String,
        channel: String,
        got: usize,
        expected: usize,
    },
    #[error("mesh {mesh}: {got} channels, importer limit is {limit}")]
    TooManyChannels { mesh: String, got: usize, limit: usize },
    #[error("mesh {mesh}: face {face} references vertex {index}, only {count} vertices")]
    FaceIndexOutOfRange {
        mesh: String,
        face: usize,
        index: u32,
        count: usize,
    },
    #[error("mesh {mesh}: bone {bone} references vertex {index}, only {count} vertices")]
    WeightIndexOutOfRange {
        mesh: String,
        bone: String,
        index: u32,
        count: usize,
    },
    #[error("clip {clip}: channel {channel} has decreasing key times")]
    UnsortedKeys { clip: String, channel: String },
    #[error("node {node} references mesh {index}, only {count} meshes")]
    MeshIndexOutOfRange {
        node: String,
        index: usize,
        count: usize,
    },
}

/// Everything the importer hands over for one loaded model.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SceneDesc {
    pub meshes: Vec<Mesh>,
    pub clips: Vec<AnimationClip>,
    pub root: NodeDesc,
}

/// A loaded model: mesh data plus the animation and skinning state that
/// evolves frame to frame.
pub struct Scene {
    pub meshes: Vec<Mesh>,
    pub animator: SceneAnimator,
    pub skinner: CpuSkinner,
}

impl Scene {
    pub fn new(desc: SceneDesc) -> Result<Self, SceneError> {
        for mesh in &desc.meshes {
            mesh.validate()?;
        }
        for clip in &desc.clips {
            clip.validate()?;
        }
        validate_node(&desc.root, desc.meshes.len())?;

        let clips: Vec<Arc<AnimationClip>> = desc.clips.into_iter().map(Arc::new).collect();
        let animator = SceneAnimator::new(&desc.root, clips);
        let skinner = CpuSkinner::new(&desc.meshes);
        Ok(Self {
            meshes: desc.meshes,
            animator,
            skinner,
        })
    }

    /// Per-frame tick: advance the animation and invalidate skinned
    /// vertex caches.
    pub fn update(&mut self, dt: f64) {
        self.animator.update(dt);
        self.skinner.begin_frame();
    }

    /// Skinned vertex position, or `None` for meshes without bones
    /// (callers fall back to the raw vertex).
    pub fn transformed_position(
        &mut self,
        node: NodeId,
        mesh_index: usize,
        vertex: usize,
    ) -> Option<Vec3> {
        self.skinner
            .transformed_position(&mut self.animator, &self.meshes, node, mesh_index, vertex)
    }

    pub fn transformed_normal(
        &mut self,
        node: NodeId,
        mesh_index: usize,
        vertex: usize,
    ) -> Option<Vec3> {
        self.skinner
            .transformed_normal(&mut self.animator, &self.meshes, node, mesh_index, vertex)
    }

    /// Swap in a rewritten mesh (e.g. after a normal recompute) and bring
    /// any skinned cache built against the old topology up to date.
    pub fn replace_mesh(&mut self, mesh_index: usize, mesh: Mesh) -> Result<(), SceneError> {
        mesh.validate()?;
        self.meshes[mesh_index] = mesh;
        self.skinner.refresh_entry(&self.meshes, mesh_index);
        Ok(())
    }
}

fn validate_node(node: &NodeDesc, mesh_count: usize) -> Result<(), SceneError> {
    for &index in &node.mesh_indices {
        if index >= mesh_count {
            return Err(SceneError::MeshIndexOutOfRange {
                node: node.name.clone(),
                index,
                count: mesh_count,
            });
        }
    }
    for child in &node.children {
        validate_node(child, mesh_count)?;
    }
    Ok(())
}
