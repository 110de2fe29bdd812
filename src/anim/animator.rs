use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use generational_arena::Arena;
use glam::Mat4;
use log::warn;

use crate::scene::mesh::Mesh;
use crate::scene::node::{NodeDesc, NodeId};

use super::clip::AnimationClip;
use super::clock::AnimationClock;
use super::evaluator::ClipEvaluator;

struct NodeState {
    name: String,
    local: Mat4,
    global: Mat4,
    /// Local transform from the importer, used when no channel drives
    /// the node.
    rest_local: Mat4,
    channel: Option<usize>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    mesh_indices: Vec<usize>,
}

/// Animation state of a scene: the runtime node tree, the active clip
/// and its clock, and the per-frame global transforms derived from them.
pub struct SceneAnimator {
    clips: Vec<Arc<AnimationClip>>,
    nodes: Arena<NodeState>,
    by_name: HashMap<String, NodeId>,
    root: NodeId,
    active: Option<usize>,
    evaluator: Option<ClipEvaluator>,
    clock: Option<AnimationClock>,
    bone_matrices: Vec<Mat4>,
    warned_bones: HashSet<String>,
}

impl SceneAnimator {
    pub fn new(root: &NodeDesc, clips: Vec<Arc<AnimationClip>>) -> Self {
        let mut nodes = Arena::new();
        let mut by_name = HashMap::new();
        let root_id = build_tree(&mut nodes, &mut by_name, root, None);
        let mut this = Self {
            clips,
            nodes,
            by_name,
            root: root_id,
            active: None,
            evaluator: None,
            clock: None,
            bone_matrices: vec![],
            warned_bones: HashSet::new(),
        };
        this.propagate();
        this
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn clips(&self) -> &[Arc<AnimationClip>] {
        &self.clips
    }

    pub fn active_clip(&self) -> Option<usize> {
        self.active
    }

    pub fn clock(&self) -> Option<&AnimationClock> {
        self.clock.as_ref()
    }

    pub fn clock_mut(&mut self) -> Option<&mut AnimationClock> {
        self.clock.as_mut()
    }

    /// Select the clip driving the scene, or `None` to show the rest
    /// pose. Resets playback to the clip start.
    pub fn set_active_clip(&mut self, index: Option<usize>) {
        if index == self.active {
            return;
        }
        self.active = index;
        match index {
            Some(i) => {
                let clip = Arc::clone(&self.clips[i]);
                for (_, node) in self.nodes.iter_mut() {
                    node.local = node.rest_local;
                    node.channel = clip
                        .channels
                        .iter()
                        .position(|c| c.node_name == node.name);
                }
                self.evaluator = Some(ClipEvaluator::new(Arc::clone(&clip)));
                self.clock = Some(AnimationClock::new(&clip));
            }
            None => {
                for (_, node) in self.nodes.iter_mut() {
                    node.local = node.rest_local;
                    node.channel = None;
                }
                self.evaluator = None;
                self.clock = None;
            }
        }
        self.recalculate();
    }

    /// Advance playback by a real-time delta and refresh all transforms.
    pub fn update(&mut self, dt: f64) {
        if let Some(clock) = &mut self.clock {
            clock.advance(dt);
        }
        self.recalculate();
    }

    /// Jump playback to an absolute time in seconds.
    pub fn seek(&mut self, seconds: f64) {
        if let Some(clock) = &mut self.clock {
            clock.seek(seconds);
        }
        self.recalculate();
    }

    pub fn local_transform(&self, node: NodeId) -> Mat4 {
        self.nodes.get(node.0).unwrap().local
    }

    pub fn global_transform(&self, node: NodeId) -> Mat4 {
        self.nodes.get(node.0).unwrap().global
    }

    pub fn mesh_indices(&self, node: NodeId) -> &[usize] {
        &self.nodes.get(node.0).unwrap().mesh_indices
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes.get(node.0).unwrap().children
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).unwrap().parent
    }

    /// Bone matrices for a skinned mesh drawn at `node`, in the mesh's
    /// bone order. Valid until the next call; costly, avoid redundant
    /// invocations within a frame.
    pub fn bone_matrices_for_mesh(&mut self, node: NodeId, mesh: &Mesh) -> &[Mat4] {
        if self.bone_matrices.len() < mesh.bones.len() {
            self.bone_matrices.resize(mesh.bones.len(), Mat4::IDENTITY);
        }
        let inverse_global = self.global_transform(node).inverse();
        for (i, bone) in mesh.bones.iter().enumerate() {
            self.bone_matrices[i] = match self.by_name.get(&bone.name) {
                Some(id) => {
                    let bone_global = self.nodes.get(id.0).unwrap().global;
                    inverse_global * bone_global * bone.offset_matrix
                }
                None => {
                    if self.warned_bones.insert(bone.name.clone()) {
                        warn!("mesh {} bone {} has no scene node", mesh.name, bone.name);
                    }
                    bone.offset_matrix
                }
            };
        }
        &self.bone_matrices[..mesh.bones.len()]
    }

    fn recalculate(&mut self) {
        if let (Some(evaluator), Some(clock)) = (&mut self.evaluator, &self.clock) {
            if clock.at_end() {
                evaluator.evaluate_end_position();
            } else {
                evaluator.evaluate(clock.ticks());
            }
            let transforms = evaluator.transforms();
            for (_, node) in self.nodes.iter_mut() {
                if let Some(channel) = node.channel {
                    node.local = transforms[channel];
                }
            }
        }
        self.propagate();
    }

    fn propagate(&mut self) {
        let mut stack = vec![(self.root, Mat4::IDENTITY)];
        while let Some((id, parent_global)) = stack.pop() {
            let node = self.nodes.get_mut(id.0).unwrap();
            node.global = parent_global * node.local;
            let global = node.global;
            for child in node.children.clone() {
                stack.push((child, global));
            }
        }
    }
}

fn build_tree(
    nodes: &mut Arena<NodeState>,
    by_name: &mut HashMap<String, NodeId>,
    desc: &NodeDesc,
    parent: Option<NodeId>,
) -> NodeId {
    let id = NodeId(nodes.insert(NodeState {
        name: desc.name.clone(),
        local: desc.transform,
        global: Mat4::IDENTITY,
        rest_local: desc.transform,
        channel: None,
        parent,
        children: vec![],
        mesh_indices: desc.mesh_indices.clone(),
    }));
    by_name.insert(desc.name.clone(), id);
    for child in &desc.children {
        let child_id = build_tree(nodes, by_name, child, Some(id));
        nodes.get_mut(id.0).unwrap().children.push(child_id);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::clip::{NodeChannel, VectorKey};
    use crate::scene::mesh::{Bone, Face, VertexWeight};
    use glam::Vec3;

    fn two_level_tree() -> NodeDesc {
        let mut root = NodeDesc::leaf("root", Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        root.children = vec![NodeDesc::leaf(
            "child",
            Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)),
        )];
        root
    }

    fn slide_clip(node: &str) -> Arc<AnimationClip> {
        Arc::new(AnimationClip {
            name: "slide".to_owned(),
            duration_in_ticks: 10.0,
            ticks_per_second: 10.0,
            channels: vec![NodeChannel {
                node_name: node.to_owned(),
                position_keys: vec![
                    VectorKey { time: 0.0, value: Vec3::ZERO },
                    VectorKey { time: 10.0, value: Vec3::new(10.0, 0.0, 0.0) },
                ],
                rotation_keys: vec![],
                scaling_keys: vec![],
            }],
        })
    }

    #[test]
    fn globals_compose_down_the_tree() {
        let animator = SceneAnimator::new(&two_level_tree(), vec![]);
        let child = animator.node_id("child").unwrap();
        let global = animator.global_transform(child);
        let expected = Mat4::from_translation(Vec3::new(1.0, 2.0, 0.0));
        assert!(global.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn animated_channel_overrides_the_rest_pose() {
        let mut animator = SceneAnimator::new(&two_level_tree(), vec![slide_clip("child")]);
        animator.set_active_clip(Some(0));
        animator.update(0.5); // tick 5

        let child = animator.node_id("child").unwrap();
        let local = animator.local_transform(child);
        let expected = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        assert!(local.abs_diff_eq(expected, 1e-4), "{local}");

        // non-animated parent keeps its rest transform
        let root = animator.root();
        assert!(animator
            .local_transform(root)
            .abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)), 1e-6));
    }

    #[test]
    fn disabling_the_clip_restores_the_rest_pose() {
        let mut animator = SceneAnimator::new(&two_level_tree(), vec![slide_clip("child")]);
        animator.set_active_clip(Some(0));
        animator.update(0.5);
        animator.set_active_clip(None);

        let child = animator.node_id("child").unwrap();
        assert!(animator
            .local_transform(child)
            .abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)), 1e-6));
    }

    #[test]
    fn bind_pose_bone_matrices_are_identity() {
        // offset matrix = inverse of the bone's bind-pose global and the
        // mesh hangs off the identity root, so the composed bone matrix
        // must cancel out exactly
        let mut tree = NodeDesc::leaf("root", Mat4::IDENTITY);
        tree.children = vec![NodeDesc::leaf(
            "child",
            Mat4::from_translation(Vec3::new(1.0, 2.0, 0.0)),
        )];
        let mut animator = SceneAnimator::new(&tree, vec![]);
        let child_global = Mat4::from_translation(Vec3::new(1.0, 2.0, 0.0));
        let mesh = Mesh {
            name: "m".to_owned(),
            material_index: 0,
            positions: vec![Vec3::ZERO],
            normals: vec![],
            tangents: vec![],
            bitangents: vec![],
            texcoords: vec![],
            colors: vec![],
            faces: vec![Face { indices: vec![0] }],
            bones: vec![Bone {
                name: "child".to_owned(),
                offset_matrix: child_global.inverse(),
                weights: vec![VertexWeight { vertex_id: 0, weight: 1.0 }],
            }],
        };
        let root = animator.root();
        let matrices = animator.bone_matrices_for_mesh(root, &mesh);
        assert!(matrices[0].abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn unknown_bone_falls_back_to_its_offset() {
        let mut animator = SceneAnimator::new(&two_level_tree(), vec![]);
        let offset = Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
        let mesh = Mesh {
            name: "m".to_owned(),
            material_index: 0,
            positions: vec![Vec3::ZERO],
            normals: vec![],
            tangents: vec![],
            bitangents: vec![],
            texcoords: vec![],
            colors: vec![],
            faces: vec![],
            bones: vec![Bone {
                name: "missing".to_owned(),
                offset_matrix: offset,
                weights: vec![],
            }],
        };
        let root = animator.root();
        let matrices = animator.bone_matrices_for_mesh(root, &mesh);
        assert!(matrices[0].abs_diff_eq(offset, 1e-6));
    }
}
