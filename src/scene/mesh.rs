use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::SceneError;

/// Importer channel limits for texture coordinate and color sets.
pub const MAX_TEXCOORD_CHANNELS: usize = 4;
pub const MAX_COLOR_CHANNELS: usize = 4;

bitflags! {
    /// Face arities present in a mesh.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PrimitiveTypes: u32 {
        const POINT = 1;
        const LINE = 2;
        const TRIANGLE = 4;
        const POLYGON = 8;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Face {
    pub indices: Vec<u32>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VertexWeight {
    pub vertex_id: u32,
    pub weight: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bone {
    /// Name of the scene node this bone follows.
    pub name: String,
    /// Transforms mesh space in bind pose into this bone's local space.
    pub offset_matrix: Mat4,
    pub weights: Vec<VertexWeight>,
}

/// Importer-facing mesh data. Attribute channels other than `positions`
/// are optional; an empty vec means the channel is absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub material_index: u32,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub bitangents: Vec<Vec3>,
    pub texcoords: Vec<Vec<Vec3>>,
    pub colors: Vec<Vec<Vec4>>,
    pub faces: Vec<Face>,
    pub bones: Vec<Bone>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    pub fn has_tangent_basis(&self) -> bool {
        !self.tangents.is_empty() && !self.bitangents.is_empty()
    }

    pub fn has_bones(&self) -> bool {
        !self.bones.is_empty()
    }

    pub fn primitive_types(&self) -> PrimitiveTypes {
        let mut flags = PrimitiveTypes::empty();
        for face in &self.faces {
            flags |= match face.indices.len() {
                1 => PrimitiveTypes::POINT,
                2 => PrimitiveTypes::LINE,
                3 => PrimitiveTypes::TRIANGLE,
                _ => PrimitiveTypes::POLYGON,
            };
        }
        flags
    }

    /// Check channel lengths and index ranges. Run once on import and
    /// again whenever a rewritten mesh is swapped back in.
    pub fn validate(&self) -> Result<(), SceneError> {
        let vertex_count = self.positions.len();
        self.check_channel("normals", self.normals.len())?;
        self.check_channel("tangents", self.tangents.len())?;
        self.check_channel("bitangents", self.bitangents.len())?;
        if self.texcoords.len() > MAX_TEXCOORD_CHANNELS {
            return Err(SceneError::TooManyChannels {
                mesh: self.name.clone(),
                got: self.texcoords.len(),
                limit: MAX_TEXCOORD_CHANNELS,
            });
        }
        if self.colors.len() > MAX_COLOR_CHANNELS {
            return Err(SceneError::TooManyChannels {
                mesh: self.name.clone(),
                got: self.colors.len(),
                limit: MAX_COLOR_CHANNELS,
            });
        }
        for (i, channel) in self.texcoords.iter().enumerate() {
            self.check_channel(&format!("texcoords[{i}]"), channel.len())?;
        }
        for (i, channel) in self.colors.iter().enumerate() {
            self.check_channel(&format!("colors[{i}]"), channel.len())?;
        }
        for (face_index, face) in self.faces.iter().enumerate() {
            for &index in &face.indices {
                if index as usize >= vertex_count {
                    return Err(SceneError::FaceIndexOutOfRange {
                        mesh: self.name.clone(),
                        face: face_index,
                        index,
                        count: vertex_count,
                    });
                }
            }
        }
        for bone in &self.bones {
            for weight in &bone.weights {
                if weight.vertex_id as usize >= vertex_count {
                    return Err(SceneError::WeightIndexOutOfRange {
                        mesh: self.name.clone(),
                        bone: bone.name.clone(),
                        index: weight.vertex_id,
                        count: vertex_count,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_channel(&self, channel: &str, len: usize) -> Result<(), SceneError> {
        if len != 0 && len != self.positions.len() {
            return Err(SceneError::ChannelLengthMismatch {
                mesh: self.name.clone(),
                channel: channel.to_owned(),
                got: len,
                expected: self.positions.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        Mesh {
            name: "tri".to_owned(),
            material_index: 0,
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![],
            tangents: vec![],
            bitangents: vec![],
            texcoords: vec![],
            colors: vec![],
            faces: vec![Face { indices: vec![0, 1, 2] }],
            bones: vec![],
        }
    }

    #[test]
    fn valid_triangle() {
        assert!(triangle().validate().is_ok());
        assert_eq!(triangle().primitive_types(), PrimitiveTypes::TRIANGLE);
    }

    #[test]
    fn channel_length_mismatch() {
        let mut mesh = triangle();
        mesh.normals = vec![Vec3::Z; 2];
        assert!(matches!(
            mesh.validate(),
            Err(SceneError::ChannelLengthMismatch { .. })
        ));
    }

    #[test]
    fn face_index_out_of_range() {
        let mut mesh = triangle();
        mesh.faces.push(Face { indices: vec![0, 1, 3] });
        assert!(matches!(
            mesh.validate(),
            Err(SceneError::FaceIndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn weight_index_out_of_range() {
        let mut mesh = triangle();
        mesh.bones.push(Bone {
            name: "b".to_owned(),
            offset_matrix: Mat4::IDENTITY,
            weights: vec![VertexWeight { vertex_id: 9, weight: 1.0 }],
        });
        assert!(matches!(
            mesh.validate(),
            Err(SceneError::WeightIndexOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn mixed_primitive_flags() {
        let mut mesh = triangle();
        mesh.faces.push(Face { indices: vec![0, 1] });
        mesh.faces.push(Face { indices: vec![0, 1, 2, 2] });
        let flags = mesh.primitive_types();
        assert!(flags.contains(PrimitiveTypes::TRIANGLE));
        assert!(flags.contains(PrimitiveTypes::LINE));
        assert!(flags.contains(PrimitiveTypes::POLYGON));
        assert!(!flags.contains(PrimitiveTypes::POINT));
    }
}
