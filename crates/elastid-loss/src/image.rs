//! A single-channel depth image.

/// Row-major single-channel image of `f64` depth values.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl Image {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_data(width: usize, height: usize, data: Vec<f64>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        self.data[y * self.width + x] = value;
    }

    pub fn same_shape(&self, other: &Image) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Euclidean norm of the per-pixel difference.
    pub fn l2_distance(&self, other: &Image) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_data_rejects_wrong_length() {
        assert!(Image::from_data(2, 2, vec![0.0; 3]).is_none());
        assert!(Image::from_data(2, 2, vec![0.0; 4]).is_some());
    }

    #[test]
    fn test_l2_distance() {
        let a = Image::from_data(2, 1, vec![1.0, 2.0]).unwrap();
        let b = Image::from_data(2, 1, vec![4.0, 6.0]).unwrap();
        assert_relative_eq!(a.l2_distance(&b), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_get_set_row_major() {
        let mut img = Image::zeros(3, 2);
        img.set(2, 1, 7.0);
        assert_eq!(img.get(2, 1), 7.0);
        assert_eq!(img.data[5], 7.0);
    }
}
