use crate::scene::mesh::Mesh;

/// Per-vertex bone influences, inverted from a mesh's bone->vertex
/// weight lists. Influences for a vertex live in one contiguous run of
/// the flat `influences` array, addressed by an offset/count pair.
///
/// Meshes without bones produce a valid, empty index.
pub struct BoneVertexIndex {
    counts: Vec<u32>,
    offsets: Vec<u32>,
    influences: Vec<(u32, f32)>,
}

impl BoneVertexIndex {
    pub fn build(mesh: &Mesh) -> Self {
        let vertex_count = mesh.positions.len();
        let mut counts = vec![0u32; vertex_count];
        let mut offsets = vec![0u32; vertex_count];
        if mesh.bones.is_empty() {
            return Self {
                counts,
                offsets,
                influences: vec![],
            };
        }

        let mut total = 0usize;
        for bone in &mesh.bones {
            total += bone.weights.len();
            for weight in &bone.weights {
                counts[weight.vertex_id as usize] += 1;
            }
        }

        let mut sum = 0u32;
        for i in 0..vertex_count {
            offsets[i] = sum;
            sum += counts[i];
        }

        // scatter, bumping each offset as its run fills up
        let mut influences = vec![(0u32, 0f32); total];
        for (bone_index, bone) in mesh.bones.iter().enumerate() {
            for weight in &bone.weights {
                let v = weight.vertex_id as usize;
                influences[offsets[v] as usize] = (bone_index as u32, weight.weight);
                offsets[v] += 1;
            }
        }
        // restore the offsets to run starts
        for i in 0..vertex_count {
            offsets[i] -= counts[i];
        }
        debug_assert!(offsets.first().map_or(true, |&o| o == 0));

        Self {
            counts,
            offsets,
            influences,
        }
    }

    /// All (bone index, weight) pairs influencing a vertex. O(1).
    pub fn influences_for_vertex(&self, vertex: usize) -> &[(u32, f32)] {
        let offset = self.offsets[vertex] as usize;
        let count = self.counts[vertex] as usize;
        &self.influences[offset..offset + count]
    }

    pub fn offset_and_count(&self, vertex: usize) -> (u32, u32) {
        (self.offsets[vertex], self.counts[vertex])
    }

    pub fn influence_count(&self) -> usize {
        self.influences.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.counts.len()
    }
}
