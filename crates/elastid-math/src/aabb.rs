//! Axis-aligned bounding boxes used for material partitions and boundary
//! condition selection.

use crate::Vec3;

/// Axis-aligned box stored as per-axis [min, max] pairs.
///
/// Infinite bounds are valid and select an entire axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Per-axis lower bounds.
    pub min: Vec3,
    /// Per-axis upper bounds.
    pub max: Vec3,
}

impl Aabb {
    /// Construct from per-axis bounds.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Construct from a flat `[[x0, x1], [y0, y1], [z0, z1]]` layout, as
    /// descriptor files store boxes.
    pub fn from_pairs(pairs: [[f64; 2]; 3]) -> Self {
        Self {
            min: Vec3::new(pairs[0][0], pairs[1][0], pairs[2][0]),
            max: Vec3::new(pairs[0][1], pairs[1][1], pairs[2][1]),
        }
    }

    /// A box covering all of space.
    pub fn everything() -> Self {
        Self {
            min: Vec3::repeat(f64::NEG_INFINITY),
            max: Vec3::repeat(f64::INFINITY),
        }
    }

    /// Whether `p` lies inside the box (bounds inclusive).
    pub fn contains(&self, p: &Vec3) -> bool {
        (0..3).all(|i| self.min[i] <= p[i] && p[i] <= self.max[i])
    }

    /// Whether `p`, expressed relative to `origin`, lies inside the box.
    pub fn contains_relative(&self, p: &Vec3, origin: &Vec3) -> bool {
        self.contains(&(p - origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_inclusive_bounds() {
        let b = Aabb::from_pairs([[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]]);
        assert!(b.contains(&Vec3::new(0.0, 0.5, 1.0)));
        assert!(!b.contains(&Vec3::new(1.1, 0.5, 0.5)));
    }

    #[test]
    fn test_infinite_axis() {
        let b = Aabb::from_pairs([
            [f64::NEG_INFINITY, -0.0678],
            [f64::NEG_INFINITY, f64::INFINITY],
            [f64::NEG_INFINITY, f64::INFINITY],
        ]);
        assert!(b.contains(&Vec3::new(-1.0, 1e6, -1e6)));
        assert!(!b.contains(&Vec3::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_contains_relative() {
        let b = Aabb::from_pairs([[-0.5, 0.5], [-0.5, 0.5], [-0.5, 0.5]]);
        let origin = Vec3::new(10.0, 10.0, 10.0);
        assert!(b.contains_relative(&Vec3::new(10.2, 9.8, 10.0), &origin));
        assert!(!b.contains_relative(&Vec3::new(11.0, 10.0, 10.0), &origin));
    }
}
