//! Seams towards the renderer and the observed target feed.

use elastid_math::Vec3;

use crate::image::Image;
use crate::Result;

/// A differentiable depth renderer.
///
/// Implementations own camera model and rasterization details. Besides
/// producing an image from vertex positions they must pull a per-pixel
/// cotangent back onto those positions.
pub trait DiffRenderer {
    /// Output resolution as (width, height).
    fn resolution(&self) -> (usize, usize);

    /// Render the mesh at the given vertex positions.
    fn render(&mut self, q: &[Vec3]) -> Image;

    /// Pull a cotangent on the rendered image back onto the vertex
    /// positions it was rendered from.
    fn render_vjp(&mut self, q: &[Vec3], image_bar: &Image) -> Vec<Vec3>;
}

/// Supplier of observed target images, one per frame.
pub trait TargetSource {
    fn num_frames(&self) -> usize;

    fn target(&mut self, frame: usize) -> Result<Image>;
}

/// In-memory target feed.
#[derive(Debug, Clone, Default)]
pub struct StoredTargets {
    frames: Vec<Image>,
}

impl StoredTargets {
    pub fn new(frames: Vec<Image>) -> Self {
        Self { frames }
    }
}

impl TargetSource for StoredTargets {
    fn num_frames(&self) -> usize {
        self.frames.len()
    }

    fn target(&mut self, frame: usize) -> Result<Image> {
        self.frames
            .get(frame)
            .cloned()
            .ok_or(crate::LossError::MissingTarget { frame })
    }
}
