//! The `TetMesh` type and its line-oriented file formats.
//!
//! Surface meshes use `v x y z` / `f i j k` records (1-indexed, `a/b/c`
//! face tokens accepted); volume meshes use `v x y z` / `t i j k l`
//! (0-indexed tetrahedra).

use std::path::Path;

use elastid_math::Vec3;

use crate::topology::{compute_neighbors, compute_two_ring, TWO_RING_SLOTS};
use crate::{MeshError, Result};

/// A tetrahedral mesh with its derived adjacency tables.
#[derive(Debug, Clone)]
pub struct TetMesh {
    /// Vertex positions.
    pub vertices: Vec<Vec3>,
    /// Tetrahedral elements as vertex-index 4-tuples.
    pub tets: Vec<[usize; 4]>,
    /// Surface triangles, re-aligned onto the volume vertex indices.
    pub surface_tris: Vec<[usize; 3]>,
    /// Face-adjacency table; slot v holds the element across the face
    /// opposite vertex v, or -1 on the boundary.
    pub neighbors: Vec<[i32; 4]>,
    /// Fixed-width 2-ring table derived from `neighbors`.
    pub two_ring: Vec<[i32; TWO_RING_SLOTS]>,
}

impl TetMesh {
    /// Build a mesh from vertices and elements, validating each element
    /// and computing the adjacency tables.
    pub fn new(
        vertices: Vec<Vec3>,
        tets: Vec<[usize; 4]>,
        surface_tris: Vec<[usize; 3]>,
    ) -> Result<Self> {
        for (i, t) in tets.iter().enumerate() {
            for &v in t {
                if v >= vertices.len() {
                    return Err(MeshError::InvalidTet {
                        index: i,
                        reason: format!(
                            "vertex index {v} out of range (mesh has {} vertices)",
                            vertices.len()
                        ),
                    });
                }
            }
            let mut s = *t;
            s.sort_unstable();
            if s.windows(2).any(|w| w[0] == w[1]) {
                return Err(MeshError::InvalidTet {
                    index: i,
                    reason: format!("repeated vertex in {t:?}"),
                });
            }
        }
        let neighbors = compute_neighbors(&tets);
        let two_ring = compute_two_ring(&neighbors);
        Ok(Self {
            vertices,
            tets,
            surface_tris,
            neighbors,
            two_ring,
        })
    }

    /// Load a volume mesh file, optionally pairing it with a surface mesh
    /// whose triangles are re-aligned onto the volume vertex indices.
    pub fn load(volume_path: &Path, surface_path: Option<&Path>) -> Result<Self> {
        let volume_text = std::fs::read_to_string(volume_path)?;
        let (vertices, tets) = parse_volume(&volume_text)?;
        let surface_tris = match surface_path {
            Some(p) => {
                let surface_text = std::fs::read_to_string(p)?;
                let (surf_vertices, tris) = parse_surface(&surface_text)?;
                realign_surface(&vertices, &surf_vertices, &tris)?
            }
            None => Vec::new(),
        };
        Self::new(vertices, tets, surface_tris)
    }

    /// Number of elements.
    pub fn num_tets(&self) -> usize {
        self.tets.len()
    }

    /// Mean of all vertex positions.
    pub fn centroid(&self) -> Vec3 {
        if self.vertices.is_empty() {
            return Vec3::zeros();
        }
        self.vertices.iter().sum::<Vec3>() / self.vertices.len() as f64
    }

    /// Centroid of one element.
    pub fn tet_centroid(&self, e: usize) -> Vec3 {
        let t = self.tets[e];
        (self.vertices[t[0]] + self.vertices[t[1]] + self.vertices[t[2]] + self.vertices[t[3]])
            / 4.0
    }

    /// Unsigned volume of one element.
    pub fn tet_volume(&self, e: usize) -> f64 {
        let t = self.tets[e];
        let a = self.vertices[t[1]] - self.vertices[t[0]];
        let b = self.vertices[t[2]] - self.vertices[t[0]];
        let c = self.vertices[t[3]] - self.vertices[t[0]];
        a.cross(&b).dot(&c).abs() / 6.0
    }
}

/// Parse a volume mesh (`v` / `t` records).
pub fn parse_volume(text: &str) -> Result<(Vec<Vec3>, Vec<[usize; 4]>)> {
    let mut vertices = Vec::new();
    let mut tets = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first() {
            Some(&"v") => vertices.push(parse_vertex(&tokens, lineno)?),
            Some(&"t") => {
                if tokens.len() < 5 {
                    return Err(MeshError::Parse {
                        line: lineno + 1,
                        msg: format!("expected 4 tetrahedron indices, got {}", tokens.len() - 1),
                    });
                }
                let mut t = [0usize; 4];
                for (i, tok) in tokens[1..5].iter().enumerate() {
                    t[i] = tok.parse().map_err(|_| MeshError::Parse {
                        line: lineno + 1,
                        msg: format!("bad index '{tok}'"),
                    })?;
                }
                tets.push(t);
            }
            _ => {}
        }
    }
    Ok((vertices, tets))
}

/// Parse a surface mesh (`v` / `f` records, 1-indexed faces).
pub fn parse_surface(text: &str) -> Result<(Vec<Vec3>, Vec<[usize; 3]>)> {
    let mut vertices = Vec::new();
    let mut tris = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first() {
            Some(&"v") => vertices.push(parse_vertex(&tokens, lineno)?),
            Some(&"f") => {
                if tokens.len() < 4 {
                    return Err(MeshError::Parse {
                        line: lineno + 1,
                        msg: format!("expected 3 face indices, got {}", tokens.len() - 1),
                    });
                }
                let mut f = [0usize; 3];
                for (i, tok) in tokens[1..4].iter().enumerate() {
                    // Accept `i`, `i/uv`, `i/uv/n` tokens; indices are 1-based.
                    let head = tok.split('/').next().unwrap_or(tok);
                    let idx: usize = head.parse().map_err(|_| MeshError::Parse {
                        line: lineno + 1,
                        msg: format!("bad face token '{tok}'"),
                    })?;
                    if idx == 0 {
                        return Err(MeshError::Parse {
                            line: lineno + 1,
                            msg: "face indices are 1-based".into(),
                        });
                    }
                    f[i] = idx - 1;
                }
                tris.push(f);
            }
            _ => {}
        }
    }
    Ok((vertices, tris))
}

/// Map surface triangles onto the volume mesh's vertex indices by matching
/// coincident positions (within 1e-8).
pub fn realign_surface(
    volume_vertices: &[Vec3],
    surface_vertices: &[Vec3],
    tris: &[[usize; 3]],
) -> Result<Vec<[usize; 3]>> {
    let mut map = vec![usize::MAX; surface_vertices.len()];
    for (i, sv) in surface_vertices.iter().enumerate() {
        for (j, vv) in volume_vertices.iter().enumerate() {
            if (sv - vv).norm() <= 1e-8 {
                map[i] = j;
                break;
            }
        }
        if map[i] == usize::MAX {
            return Err(MeshError::UnmatchedSurfaceVertex { index: i });
        }
    }
    Ok(tris
        .iter()
        .map(|t| [map[t[0]], map[t[1]], map[t[2]]])
        .collect())
}

fn parse_vertex(tokens: &[&str], lineno: usize) -> Result<Vec3> {
    if tokens.len() < 4 {
        return Err(MeshError::Parse {
            line: lineno + 1,
            msg: format!("expected 3 coordinates, got {}", tokens.len() - 1),
        });
    }
    let mut xyz = [0.0f64; 3];
    for (i, tok) in tokens[1..4].iter().enumerate() {
        xyz[i] = tok.parse().map_err(|_| MeshError::Parse {
            line: lineno + 1,
            msg: format!("bad coordinate '{tok}'"),
        })?;
    }
    Ok(Vec3::new(xyz[0], xyz[1], xyz[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const VOLUME: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
v 1 1 1
t 0 1 2 3
t 4 1 2 3
";

    const SURFACE: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
f 1/1 2/2 3/3
";

    #[test]
    fn test_parse_volume() {
        let (v, t) = parse_volume(VOLUME).unwrap();
        assert_eq!(v.len(), 5);
        assert_eq!(t, vec![[0, 1, 2, 3], [4, 1, 2, 3]]);
    }

    #[test]
    fn test_parse_surface_slash_tokens() {
        let (v, f) = parse_surface(SURFACE).unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(f, vec![[0, 1, 2]]);
    }

    #[test]
    fn test_realign_surface() {
        let (vol_v, _) = parse_volume(VOLUME).unwrap();
        let (surf_v, tris) = parse_surface(SURFACE).unwrap();
        let aligned = realign_surface(&vol_v, &surf_v, &tris).unwrap();
        assert_eq!(aligned, vec![[0, 1, 2]]);
    }

    #[test]
    fn test_mesh_construction_builds_topology() {
        let (v, t) = parse_volume(VOLUME).unwrap();
        let mesh = TetMesh::new(v, t, Vec::new()).unwrap();
        assert_eq!(mesh.num_tets(), 2);
        assert_eq!(mesh.neighbors[0][0], 1);
        assert_eq!(mesh.neighbors[1][0], 0);
    }

    #[test]
    fn test_invalid_tet_out_of_range() {
        let v = vec![Vec3::zeros(); 3];
        let err = TetMesh::new(v, vec![[0, 1, 2, 7]], Vec::new()).unwrap_err();
        assert!(matches!(err, MeshError::InvalidTet { index: 0, .. }));
    }

    #[test]
    fn test_invalid_tet_repeated_vertex() {
        let v = vec![Vec3::zeros(); 4];
        let err = TetMesh::new(v, vec![[0, 1, 1, 2]], Vec::new()).unwrap_err();
        assert!(matches!(err, MeshError::InvalidTet { index: 0, .. }));
    }

    #[test]
    fn test_tet_volume_unit() {
        let v = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let mesh = TetMesh::new(v, vec![[0, 1, 2, 3]], Vec::new()).unwrap();
        assert_relative_eq!(mesh.tet_volume(0), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_error_carries_line() {
        let err = parse_volume("v 0 0\n").unwrap_err();
        match err {
            MeshError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
