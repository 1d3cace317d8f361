//! Face-adjacency and 2-ring neighborhood tables over tetrahedra.

/// Marks a boundary face (no neighbor) or an empty 2-ring slot.
pub const SENTINEL: i32 = -1;

/// Fixed width of a 2-ring row: 4 own slots + 4 slots per direct neighbor.
pub const TWO_RING_SLOTS: usize = 20;

/// One face record used during adjacency construction: the sorted vertex
/// triple plus the owning element and the slot of the opposite vertex.
#[derive(Debug, Clone, Copy)]
struct FaceRecord {
    tri: [usize; 3],
    elem: usize,
    opp_slot: usize,
}

/// Compute the face-adjacency neighbor table.
///
/// Slot `v` of row `e` holds the element sharing the face opposite vertex
/// `v` of tetrahedron `e`, or [`SENTINEL`] when that face lies on the mesh
/// boundary. Adjacency is symmetric by construction: both records of a
/// shared face are written in the same scan step.
///
/// Runs in O(N log N) via a lexicographic sort of all 4N face records.
/// A face shared by more than two elements is malformed input; the scan
/// lets the last matching pair win rather than failing.
pub fn compute_neighbors(tets: &[[usize; 4]]) -> Vec<[i32; 4]> {
    let mut faces = Vec::with_capacity(4 * tets.len());
    for (e, t) in tets.iter().enumerate() {
        let [i, j, k, m] = *t;
        faces.push(FaceRecord {
            tri: sorted3(j, k, m),
            elem: e,
            opp_slot: 0,
        });
        faces.push(FaceRecord {
            tri: sorted3(i, k, m),
            elem: e,
            opp_slot: 1,
        });
        faces.push(FaceRecord {
            tri: sorted3(i, j, m),
            elem: e,
            opp_slot: 2,
        });
        faces.push(FaceRecord {
            tri: sorted3(i, j, k),
            elem: e,
            opp_slot: 3,
        });
    }
    faces.sort_unstable_by_key(|f| f.tri);

    let mut neighbors = vec![[SENTINEL; 4]; tets.len()];
    for w in faces.windows(2) {
        if w[0].tri == w[1].tri {
            neighbors[w[0].elem][w[0].opp_slot] = w[1].elem as i32;
            neighbors[w[1].elem][w[1].opp_slot] = w[0].elem as i32;
        }
    }
    neighbors
}

/// Compute the fixed-width 2-ring table from a neighbor table.
///
/// Row `e` holds the 4 direct neighbor slots of `e` followed by the 4
/// neighbor slots of each direct neighbor. Sentinel entries propagate as
/// sentinels and an element never lists itself: self-references arising
/// from the neighbor-of-neighbor expansion are written as sentinels.
pub fn compute_two_ring(neighbors: &[[i32; 4]]) -> Vec<[i32; TWO_RING_SLOTS]> {
    let mut two_ring = vec![[SENTINEL; TWO_RING_SLOTS]; neighbors.len()];
    for (e, row) in neighbors.iter().enumerate() {
        two_ring[e][..4].copy_from_slice(row);
        for (k, &n) in row.iter().enumerate() {
            if n == SENTINEL {
                continue;
            }
            for (s, &nn) in neighbors[n as usize].iter().enumerate() {
                let entry = if nn == e as i32 { SENTINEL } else { nn };
                two_ring[e][4 + 4 * k + s] = entry;
            }
        }
    }
    two_ring
}

/// Distinct, sorted, sentinel-free entries of one 2-ring row.
pub fn ring_members(row: &[i32; TWO_RING_SLOTS]) -> Vec<usize> {
    let mut members: Vec<usize> = row
        .iter()
        .filter(|&&n| n != SENTINEL)
        .map(|&n| n as usize)
        .collect();
    members.sort_unstable();
    members.dedup();
    members
}

fn sorted3(a: usize, b: usize, c: usize) -> [usize; 3] {
    let mut t = [a, b, c];
    t.sort_unstable();
    t
}
