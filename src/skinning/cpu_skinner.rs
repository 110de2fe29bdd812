use glam::{Mat4, Vec3};
use log::debug;

use crate::anim::animator::SceneAnimator;
use crate::scene::mesh::Mesh;
use crate::scene::node::NodeId;

use super::bone_map::BoneVertexIndex;

/// Skinned vertex data for one mesh, valid for the single node the mesh
/// was last evaluated for. A request for a different node, or the
/// per-frame `begin_frame()`, marks the entry dirty.
struct CachedMeshData {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    dirty: bool,
    last_node: Option<NodeId>,
    bone_map: BoneVertexIndex,
    source_vertex_count: usize,
}

impl CachedMeshData {
    fn new(mesh: &Mesh) -> Self {
        let vertex_count = mesh.vertex_count();
        Self {
            positions: vec![Vec3::ZERO; vertex_count],
            normals: vec![Vec3::ZERO; vertex_count],
            dirty: true,
            last_node: None,
            bone_map: BoneVertexIndex::build(mesh),
            source_vertex_count: vertex_count,
        }
    }

    fn compatible_with(&self, mesh: &Mesh) -> bool {
        self.source_vertex_count == mesh.vertex_count()
    }

    fn cache(&mut self, mesh: &Mesh, bone_matrices: &[Mat4]) {
        for (i, &position) in mesh.positions.iter().enumerate() {
            self.positions[i] = evaluate_bone_influences(
                position,
                self.bone_map.influences_for_vertex(i),
                bone_matrices,
                false,
            );
        }
        for (i, &normal) in mesh.normals.iter().enumerate() {
            self.normals[i] = evaluate_bone_influences(
                normal,
                self.bone_map.influences_for_vertex(i),
                bone_matrices,
                true,
            );
        }
        self.dirty = false;
    }
}

/// Weighted blend of one vertex attribute over its bone influences.
/// Directions go through the upper 3x3 only.
fn evaluate_bone_influences(
    value: Vec3,
    influences: &[(u32, f32)],
    bone_matrices: &[Mat4],
    is_direction: bool,
) -> Vec3 {
    let mut out = Vec3::ZERO;
    for &(bone, weight) in influences {
        let matrix = &bone_matrices[bone as usize];
        let transformed = if is_direction {
            matrix.transform_vector3(value)
        } else {
            matrix.transform_point3(value)
        };
        out += transformed * weight;
    }
    out
}

/// Evaluates bone deformations on the CPU, one cache entry per skinned
/// mesh. Meshes without bones are never entered; callers fall back to
/// the raw vertex data for those.
pub struct CpuSkinner {
    cache: Vec<Option<CachedMeshData>>,
}

impl CpuSkinner {
    pub fn new(meshes: &[Mesh]) -> Self {
        let cache = meshes
            .iter()
            .map(|mesh| mesh.has_bones().then(|| CachedMeshData::new(mesh)))
            .collect();
        Self { cache }
    }

    pub fn is_skinned(&self, mesh_index: usize) -> bool {
        self.cache[mesh_index].is_some()
    }

    /// A new frame has begun; bone matrices may have moved, so all
    /// cached data is stale.
    pub fn begin_frame(&mut self) {
        for entry in self.cache.iter_mut().flatten() {
            entry.dirty = true;
        }
    }

    /// Re-key the cache entry for a mesh whose data was swapped out.
    pub fn refresh_entry(&mut self, meshes: &[Mesh], mesh_index: usize) {
        let mesh = &meshes[mesh_index];
        let up_to_date = match &self.cache[mesh_index] {
            Some(entry) => mesh.has_bones() && entry.compatible_with(mesh),
            None => !mesh.has_bones(),
        };
        if !up_to_date {
            debug!("mesh {} changed, rebuilding skinning cache entry", mesh.name);
            self.cache[mesh_index] = mesh.has_bones().then(|| CachedMeshData::new(mesh));
        }
    }

    /// Skinned position for one vertex. Results are cached between
    /// calls within the same frame.
    pub fn transformed_position(
        &mut self,
        animator: &mut SceneAnimator,
        meshes: &[Mesh],
        node: NodeId,
        mesh_index: usize,
        vertex: usize,
    ) -> Option<Vec3> {
        self.ensure(animator, meshes, node, mesh_index)
            .map(|entry| entry.positions[vertex])
    }

    /// Skinned normal for one vertex; zero if the mesh has no normals.
    pub fn transformed_normal(
        &mut self,
        animator: &mut SceneAnimator,
        meshes: &[Mesh],
        node: NodeId,
        mesh_index: usize,
        vertex: usize,
    ) -> Option<Vec3> {
        self.ensure(animator, meshes, node, mesh_index)
            .map(|entry| entry.normals[vertex])
    }

    fn ensure(
        &mut self,
        animator: &mut SceneAnimator,
        meshes: &[Mesh],
        node: NodeId,
        mesh_index: usize,
    ) -> Option<&CachedMeshData> {
        // a topology change (e.g. a rewritten mesh) is a cache miss, never
        // a silent read of stale data
        if !self.cache[mesh_index]
            .as_ref()
            .map_or(true, |entry| entry.compatible_with(&meshes[mesh_index]))
        {
            self.refresh_entry(meshes, mesh_index);
        }
        let entry = self.cache[mesh_index].as_mut()?;
        let mesh = &meshes[mesh_index];

        // a mesh referenced by several nodes defeats the cache: any node
        // switch forces a recompute. Works, but prevents caching.
        if entry.last_node != Some(node) {
            entry.last_node = Some(node);
            entry.dirty = true;
        }
        if entry.dirty {
            let bone_matrices = animator.bone_matrices_for_mesh(node, mesh);
            entry.cache(mesh, bone_matrices);
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::mesh::{Bone, Face, VertexWeight};
    use crate::scene::node::NodeDesc;
    use glam::Quat;

    fn skinned_mesh(bones: Vec<Bone>) -> Mesh {
        Mesh {
            name: "m".to_owned(),
            material_index: 0,
            positions: vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            normals: vec![Vec3::Z, Vec3::Z],
            tangents: vec![],
            bitangents: vec![],
            texcoords: vec![],
            colors: vec![],
            faces: vec![Face { indices: vec![0, 1] }],
            bones,
        }
    }

    fn bone_to(name: &str, weights: &[(u32, f32)], offset: Mat4) -> Bone {
        Bone {
            name: name.to_owned(),
            offset_matrix: offset,
            weights: weights
                .iter()
                .map(|&(vertex_id, weight)| VertexWeight { vertex_id, weight })
                .collect(),
        }
    }

    /// root -> "a" (translated) and root -> "b" (rotated), no clip.
    fn animator_with_two_bones() -> SceneAnimator {
        let mut root = NodeDesc::leaf("root", Mat4::IDENTITY);
        root.children = vec![
            NodeDesc::leaf("a", Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0))),
            NodeDesc::leaf(
                "b",
                Mat4::from_quat(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
            ),
        ];
        SceneAnimator::new(&root, vec![])
    }

    #[test]
    fn unskinned_meshes_return_none() {
        let meshes = vec![skinned_mesh(vec![])];
        let mut animator = animator_with_two_bones();
        let mut skinner = CpuSkinner::new(&meshes);
        assert!(!skinner.is_skinned(0));
        let root = animator.root();
        assert!(skinner
            .transformed_position(&mut animator, &meshes, root, 0, 0)
            .is_none());
    }

    #[test]
    fn single_full_weight_bone_applies_its_matrix_exactly() {
        let meshes = vec![skinned_mesh(vec![bone_to(
            "a",
            &[(0, 1.0), (1, 1.0)],
            Mat4::IDENTITY,
        )])];
        let mut animator = animator_with_two_bones();
        let mut skinner = CpuSkinner::new(&meshes);
        let root = animator.root();

        // bone matrix is the "a" node's global transform
        let pos = skinner
            .transformed_position(&mut animator, &meshes, root, 0, 0)
            .unwrap();
        assert!(pos.abs_diff_eq(Vec3::new(1.0, 0.0, 3.0), 1e-5), "{pos}");

        // normals ignore the translation part
        let normal = skinner
            .transformed_normal(&mut animator, &meshes, root, 0, 0)
            .unwrap();
        assert!(normal.abs_diff_eq(Vec3::Z, 1e-5), "{normal}");
    }

    #[test]
    fn weights_blend_between_bones() {
        let meshes = vec![skinned_mesh(vec![
            bone_to("a", &[(0, 0.5)], Mat4::IDENTITY),
            bone_to("root", &[(0, 0.5)], Mat4::IDENTITY),
        ])];
        let mut animator = animator_with_two_bones();
        let mut skinner = CpuSkinner::new(&meshes);
        let root = animator.root();

        // halfway between untransformed and translated by (0,0,3)
        let pos = skinner
            .transformed_position(&mut animator, &meshes, root, 0, 0)
            .unwrap();
        assert!(pos.abs_diff_eq(Vec3::new(1.0, 0.0, 1.5), 1e-5), "{pos}");
    }

    #[test]
    fn recompute_after_begin_frame_is_idempotent() {
        let meshes = vec![skinned_mesh(vec![bone_to(
            "b",
            &[(0, 1.0), (1, 1.0)],
            Mat4::IDENTITY,
        )])];
        let mut animator = animator_with_two_bones();
        let mut skinner = CpuSkinner::new(&meshes);
        let root = animator.root();

        let before = skinner
            .transformed_position(&mut animator, &meshes, root, 0, 1)
            .unwrap();
        skinner.begin_frame();
        let after = skinner
            .transformed_position(&mut animator, &meshes, root, 0, 1)
            .unwrap();
        assert!(before.abs_diff_eq(after, 1e-6));
    }

    #[test]
    fn node_switch_invalidates_the_cache() {
        let meshes = vec![skinned_mesh(vec![bone_to(
            "a",
            &[(0, 1.0), (1, 1.0)],
            Mat4::IDENTITY,
        )])];
        let mut animator = animator_with_two_bones();
        let mut skinner = CpuSkinner::new(&meshes);
        let root = animator.root();
        let a = animator.node_id("a").unwrap();

        let from_root = skinner
            .transformed_position(&mut animator, &meshes, root, 0, 0)
            .unwrap();
        // evaluated for node "a" itself, the inverse global cancels the
        // bone transform
        let from_a = skinner
            .transformed_position(&mut animator, &meshes, a, 0, 0)
            .unwrap();
        assert!(from_root.abs_diff_eq(Vec3::new(1.0, 0.0, 3.0), 1e-5));
        assert!(from_a.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5), "{from_a}");
    }

    #[test]
    fn topology_change_rebuilds_the_entry() {
        let mut meshes = vec![skinned_mesh(vec![bone_to(
            "a",
            &[(0, 1.0), (1, 1.0)],
            Mat4::IDENTITY,
        )])];
        let mut animator = animator_with_two_bones();
        let mut skinner = CpuSkinner::new(&meshes);
        let root = animator.root();
        skinner
            .transformed_position(&mut animator, &meshes, root, 0, 0)
            .unwrap();

        // grow the mesh by one vertex; the old entry must not be served
        meshes[0].positions.push(Vec3::splat(7.0));
        meshes[0].normals.push(Vec3::Z);
        meshes[0].bones[0]
            .weights
            .push(VertexWeight { vertex_id: 2, weight: 1.0 });
        let pos = skinner
            .transformed_position(&mut animator, &meshes, root, 0, 2)
            .unwrap();
        assert!(pos.abs_diff_eq(Vec3::new(7.0, 7.0, 10.0), 1e-5), "{pos}");
    }
}
