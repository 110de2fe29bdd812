use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::Vec3;
use log::debug;

use crate::scene::mesh::Mesh;

use super::EditableMeshGraph;

/// Cooperative cancellation flag, checked between solver phases.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SolveOutcome {
    Done,
    Cancelled,
}

/// Recomputes vertex normals: flat face normals first, then smoothing
/// across position-adjacent faces within an angular threshold.
///
/// Building the graph is the expensive part; construct once and call
/// `compute` repeatedly as the threshold changes.
pub struct NormalSolver {
    graph: EditableMeshGraph,
}

impl NormalSolver {
    pub fn new(mesh: &Mesh) -> Self {
        Self {
            graph: EditableMeshGraph::from_mesh(mesh),
        }
    }

    pub fn compute(&mut self, mesh: &mut Mesh, threshold_angle_degrees: f32) -> SolveOutcome {
        self.compute_cancellable(mesh, threshold_angle_degrees, &CancelToken::new())
    }

    /// Like `compute`, but bails out between phases once `token` is
    /// cancelled. A cancelled run leaves `mesh` untouched.
    pub fn compute_cancellable(
        &mut self,
        mesh: &mut Mesh,
        threshold_angle_degrees: f32,
        token: &CancelToken,
    ) -> SolveOutcome {
        self.calculate_face_normals();
        if token.is_cancelled() {
            debug!("normal recompute cancelled after face pass");
            return SolveOutcome::Cancelled;
        }
        // threshold 0 means hard faceted normals, skip smoothing entirely
        if threshold_angle_degrees > 0.0 {
            self.smooth_normals(threshold_angle_degrees);
            if token.is_cancelled() {
                debug!("normal recompute cancelled after smoothing pass");
                return SolveOutcome::Cancelled;
            }
        }
        self.graph.apply_to_mesh(mesh);
        SolveOutcome::Done
    }

    fn calculate_face_normals(&mut self) {
        let graph = &mut self.graph;
        for face in graph.faces.iter_mut() {
            let mut normal = Vec3::ZERO;
            // only proper triangles get a face normal; points, lines and
            // polygons pass through as zero
            if face.corners.len() == 3 {
                let v0 = graph.vertices[face.corners[0]].position;
                let v1 = graph.vertices[face.corners[1]].position;
                let v2 = graph.vertices[face.corners[2]].position;
                normal = (v1 - v0).cross(v2 - v1);
            }
            if normal.length_squared() > 0.0 {
                normal = normal.normalize();
            }
            for &corner in &face.corners {
                graph.vertices[corner].normal = Some(normal);
            }
            face.normal = Some(normal);
        }
    }

    fn smooth_normals(&mut self, threshold_angle_degrees: f32) {
        let cos_threshold = threshold_angle_degrees.to_radians().cos();
        let graph = &mut self.graph;
        let smoothed: Vec<Vec3> = (0..graph.vertices.len())
            .map(|corner| {
                let face_normal = graph.faces[graph.vertices[corner].face].normal.unwrap();
                let mut normal = face_normal;
                for &adjacent in graph.adjacency.class_members(corner) {
                    let adjacent = adjacent as usize;
                    if adjacent == corner {
                        continue;
                    }
                    let adjacent_normal =
                        graph.faces[graph.vertices[adjacent].face].normal.unwrap();
                    if face_normal.dot(adjacent_normal) >= cos_threshold {
                        normal += adjacent_normal;
                    }
                }
                if normal.length_squared() > 0.0 {
                    normal.normalize()
                } else {
                    normal
                }
            })
            .collect();
        for (vertex, normal) in graph.vertices.iter_mut().zip(smoothed) {
            vertex.normal = Some(normal);
        }
    }
}
