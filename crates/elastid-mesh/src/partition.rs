//! Spatial partitioning: bounding-box material assignment and Dirichlet
//! boundary vertex selection.

use elastid_math::{Aabb, Vec3};

use crate::topology::SENTINEL;
use crate::TetMesh;

impl TetMesh {
    /// Assign each element to a material index by testing its centroid
    /// against the given boxes in order, first match wins. Elements no box
    /// claims stay at the sentinel (-1) and are excluded from
    /// regularization downstream.
    ///
    /// With `normalize` set, centroids are tested relative to the mesh
    /// centroid.
    pub fn partition_by_boxes(&self, boxes: &[Aabb], normalize: bool) -> Vec<i32> {
        let offset = if normalize {
            self.centroid()
        } else {
            Vec3::zeros()
        };
        let mut map = vec![SENTINEL; self.num_tets()];
        for (material, bbox) in boxes.iter().enumerate() {
            for e in 0..self.num_tets() {
                if map[e] != SENTINEL {
                    continue;
                }
                if bbox.contains_relative(&self.tet_centroid(e), &offset) {
                    map[e] = material as i32;
                }
            }
        }
        map
    }

    /// Mark vertices falling inside any of the given boxes; used for
    /// Dirichlet (fixed) boundary conditions. Boxes accumulate: a vertex
    /// selected by an earlier box stays selected.
    ///
    /// With `normalize` set, positions are tested relative to the midpoint
    /// of the mesh's bounding box.
    pub fn dirichlet_vertices(&self, boxes: &[Aabb], normalize: bool) -> Vec<bool> {
        let offset = if normalize {
            self.bounds_midpoint()
        } else {
            Vec3::zeros()
        };
        let mut selected = vec![false; self.vertices.len()];
        for bbox in boxes {
            for (i, v) in self.vertices.iter().enumerate() {
                if bbox.contains_relative(v, &offset) {
                    selected[i] = true;
                }
            }
        }
        selected
    }

    /// Midpoint of the axis-aligned bounds of all vertices.
    pub fn bounds_midpoint(&self) -> Vec3 {
        let mut lo = Vec3::repeat(f64::INFINITY);
        let mut hi = Vec3::repeat(f64::NEG_INFINITY);
        for v in &self.vertices {
            lo = lo.inf(v);
            hi = hi.sup(v);
        }
        (lo + hi) * 0.5
    }
}
