pub mod adjacency;
pub mod normals;
pub mod worker;

use glam::{Vec3, Vec4};

use crate::scene::mesh::{Face, Mesh, MAX_COLOR_CHANNELS, MAX_TEXCOORD_CHANNELS};

use self::adjacency::{PositionClasses, MERGE_EPSILON_SQ};

/// One corner of a face. Faces never share corners; merging happens on
/// write-back, driven by the position classes plus attribute equality.
pub struct EditVertex {
    pub face: usize,
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub tangent: Option<Vec3>,
    pub bitangent: Option<Vec3>,
    pub texcoord: [Option<Vec3>; MAX_TEXCOORD_CHANNELS],
    pub color: [Option<Vec4>; MAX_COLOR_CHANNELS],
}

impl EditVertex {
    /// Whether two corners collapse into one output vertex: positions
    /// within the merge radius and every optional channel either absent
    /// on both or approximately equal.
    pub fn can_be_merged_with(&self, other: &EditVertex) -> bool {
        self.position.distance_squared(other.position) < MERGE_EPSILON_SQ
            && approx_eq_vec(self.normal, other.normal)
            && approx_eq_vec(self.tangent, other.tangent)
            && approx_eq_vec(self.bitangent, other.bitangent)
            && self
                .texcoord
                .iter()
                .zip(&other.texcoord)
                .all(|(&a, &b)| approx_eq_vec(a, b))
            && self
                .color
                .iter()
                .zip(&other.color)
                .all(|(&a, &b)| approx_eq_color(a, b))
    }
}

fn approx_eq_vec(a: Option<Vec3>, b: Option<Vec3>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.distance_squared(b) < MERGE_EPSILON_SQ,
        _ => false,
    }
}

fn approx_eq_color(a: Option<Vec4>, b: Option<Vec4>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs().element_sum() < MERGE_EPSILON_SQ,
        _ => false,
    }
}

pub struct EditFace {
    pub corners: Vec<usize>,
    /// Face normal, populated by the normal solver.
    pub normal: Option<Vec3>,
}

/// Editable face/corner graph with position adjacency. Construction is
/// expensive; build once per mesh snapshot and reuse across recomputes.
///
/// The graph holds no reference to the source mesh; `apply_to_mesh`
/// propagates changes back.
pub struct EditableMeshGraph {
    pub faces: Vec<EditFace>,
    pub vertices: Vec<EditVertex>,
    adjacency: PositionClasses,
}

impl EditableMeshGraph {
    pub fn from_mesh(mesh: &Mesh) -> Self {
        let mut faces = Vec::with_capacity(mesh.faces.len());
        let mut vertices: Vec<EditVertex> = Vec::with_capacity(mesh.faces.len() * 3);
        for (face_index, src) in mesh.faces.iter().enumerate() {
            let mut corners = Vec::with_capacity(src.indices.len());
            for &index in &src.indices {
                let index = index as usize;
                let mut texcoord = [None; MAX_TEXCOORD_CHANNELS];
                for (c, channel) in mesh.texcoords.iter().take(MAX_TEXCOORD_CHANNELS).enumerate() {
                    if !channel.is_empty() {
                        texcoord[c] = Some(channel[index]);
                    }
                }
                let mut color = [None; MAX_COLOR_CHANNELS];
                for (c, channel) in mesh.colors.iter().take(MAX_COLOR_CHANNELS).enumerate() {
                    if !channel.is_empty() {
                        color[c] = Some(channel[index]);
                    }
                }
                corners.push(vertices.len());
                vertices.push(EditVertex {
                    face: face_index,
                    position: mesh.positions[index],
                    normal: mesh.normals.get(index).copied(),
                    tangent: if mesh.has_tangent_basis() {
                        Some(mesh.tangents[index])
                    } else {
                        None
                    },
                    bitangent: if mesh.has_tangent_basis() {
                        Some(mesh.bitangents[index])
                    } else {
                        None
                    },
                    texcoord,
                    color,
                });
            }
            faces.push(EditFace {
                corners,
                normal: None,
            });
        }
        let positions: Vec<Vec3> = vertices.iter().map(|v| v.position).collect();
        let adjacency = PositionClasses::build(&positions);
        Self {
            faces,
            vertices,
            adjacency,
        }
    }

    /// All corners sharing this corner's position, itself included.
    pub fn adjacent_corners(&self, corner: usize) -> &[u32] {
        self.adjacency.class_members(corner)
    }

    /// Write the graph back, deduplicating corners. A corner claims the
    /// next output index and hands it to every still-unassigned member of
    /// its position class it can be merged with; attribute channels are
    /// only emitted when every corner carries them. Mesh name, material
    /// and bones are left untouched.
    pub fn apply_to_mesh(&self, mesh: &mut Mesh) {
        let corner_count = self.vertices.len();
        let mut assigned: Vec<Option<u32>> = vec![None; corner_count];
        let mut representatives: Vec<usize> = Vec::new();
        for i in 0..corner_count {
            if assigned[i].is_some() {
                continue;
            }
            let output = representatives.len() as u32;
            representatives.push(i);
            for &j in self.adjacency.class_members(i) {
                let j = j as usize;
                if assigned[j].is_some() {
                    continue;
                }
                if j == i || self.vertices[i].can_be_merged_with(&self.vertices[j]) {
                    assigned[j] = Some(output);
                }
            }
        }

        let has_normals =
            corner_count > 0 && self.vertices.iter().all(|v| v.normal.is_some());
        let has_tangent_basis = corner_count > 0
            && self
                .vertices
                .iter()
                .all(|v| v.tangent.is_some() && v.bitangent.is_some());

        mesh.positions = representatives
            .iter()
            .map(|&i| self.vertices[i].position)
            .collect();
        mesh.normals = if has_normals {
            representatives
                .iter()
                .map(|&i| self.vertices[i].normal.unwrap())
                .collect()
        } else {
            vec![]
        };
        mesh.tangents = if has_tangent_basis {
            representatives
                .iter()
                .map(|&i| self.vertices[i].tangent.unwrap())
                .collect()
        } else {
            vec![]
        };
        mesh.bitangents = if has_tangent_basis {
            representatives
                .iter()
                .map(|&i| self.vertices[i].bitangent.unwrap())
                .collect()
        } else {
            vec![]
        };
        mesh.texcoords = (0..MAX_TEXCOORD_CHANNELS)
            .filter(|&c| corner_count > 0 && self.vertices.iter().all(|v| v.texcoord[c].is_some()))
            .map(|c| {
                representatives
                    .iter()
                    .map(|&i| self.vertices[i].texcoord[c].unwrap())
                    .collect()
            })
            .collect();
        mesh.colors = (0..MAX_COLOR_CHANNELS)
            .filter(|&c| corner_count > 0 && self.vertices.iter().all(|v| v.color[c].is_some()))
            .map(|c| {
                representatives
                    .iter()
                    .map(|&i| self.vertices[i].color[c].unwrap())
                    .collect()
            })
            .collect();

        mesh.faces = self
            .faces
            .iter()
            .map(|face| Face {
                indices: face
                    .corners
                    .iter()
                    .map(|&corner| assigned[corner].unwrap())
                    .collect(),
            })
            .collect();
    }
}
