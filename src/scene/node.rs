use generational_arena::Index;
use glam::Mat4;
use serde::{Deserialize, Serialize};

/// Importer-provided node hierarchy. Transforms are local to the parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDesc {
    pub name: String,
    pub transform: Mat4,
    /// Scene-wide indices of the meshes drawn at this node.
    pub mesh_indices: Vec<usize>,
    pub children: Vec<NodeDesc>,
}

impl NodeDesc {
    pub fn leaf(name: impl Into<String>, transform: Mat4) -> Self {
        Self {
            name: name.into(),
            transform,
            mesh_indices: vec![],
            children: vec![],
        }
    }
}

/// Handle into the animator's runtime node arena.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub struct NodeId(pub Index);

impl From<NodeId> for Index {
    fn from(id: NodeId) -> Index {
        id.0
    }
}
