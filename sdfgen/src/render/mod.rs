//! Offscreen rendering of depth and surface-normal buffers
//!
//! Rendering is done by a [`Renderer`], which behaves like a graphics
//! context: its output mode and antialiasing are mutable settings rather than
//! per-call arguments.  Samplers never touch a renderer directly; they go
//! through a [`RenderGuard`], which serializes access and forces the settings
//! that distance sampling requires.
use crate::{Error, mesh::Mesh};

mod camera;
mod guard;
mod raster;

pub use camera::{CameraPose, fibonacci_sphere, viewpoints};
pub use guard::{GuardStats, RenderGuard};
pub use raster::Rasterizer;

/// Generic image type
///
/// The image is laid out in row-major order, and can be indexed either by a
/// `usize` index or a `(row, column)` tuple.
///
/// ```text
///        0 ------------> width (columns)
///        |             |
///        |             |
///        |             |
///        V--------------
///   height (rows)
/// ```
#[derive(Clone, Debug, Default)]
pub struct Image<P> {
    data: Vec<P>,
    width: usize,
    height: usize,
}

impl<P: Default + Clone> Image<P> {
    /// Builds a new image filled with `P::default()`
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![P::default(); width * height],
            width,
            height,
        }
    }
}

impl<P> Image<P> {
    /// Returns the image width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height
    pub fn height(&self) -> usize {
        self.height
    }

    /// Iterates over pixel values
    pub fn iter(&self) -> impl Iterator<Item = &P> + '_ {
        self.data.iter()
    }

    /// Returns the number of pixels in the image
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Generates an image by mapping a simple function over each pixel
    pub fn map<T, F: Fn(&P) -> T>(&self, f: F) -> Image<T> {
        Image {
            data: self.data.iter().map(f).collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Checks a `(row, column)` position
    ///
    /// Returns the input position in the 1D array if valid; panics otherwise
    fn decode_position(&self, pos: (usize, usize)) -> usize {
        let (row, col) = pos;
        assert!(
            row < self.height,
            "row ({row}) must be less than image height ({})",
            self.height
        );
        assert!(
            col < self.width,
            "column ({col}) must be less than image width ({})",
            self.width
        );
        row * self.width + col
    }
}

impl<P> std::ops::Index<usize> for Image<P> {
    type Output = P;
    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

impl<P> std::ops::IndexMut<usize> for Image<P> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// Indexes an image with `(row, col)`
impl<P> std::ops::Index<(usize, usize)> for Image<P> {
    type Output = P;
    fn index(&self, pos: (usize, usize)) -> &Self::Output {
        let index = self.decode_position(pos);
        &self.data[index]
    }
}

impl<P> std::ops::IndexMut<(usize, usize)> for Image<P> {
    fn index_mut(&mut self, pos: (usize, usize)) -> &mut Self::Output {
        let index = self.decode_position(pos);
        &mut self.data[index]
    }
}

/// Distance from the camera plane to the surface; `0.0` marks empty pixels
pub type DepthImage = Image<f32>;

/// World-space surface normals (or shaded color, in [`OutputMode::Color`])
pub type NormalImage = Image<[f32; 3]>;

/// What the renderer writes into its non-depth buffer
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum OutputMode {
    /// Lambert-shaded gray, for looking at
    #[default]
    Color,
    /// Flat world-space face normals
    Normals,
}

/// Mutable context settings
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RenderState {
    /// Output buffer contents
    pub mode: OutputMode,
    /// Resolve each pixel from several sub-pixel samples
    ///
    /// Averaging blends silhouette depths with the far plane, which is
    /// useless for distance estimation.
    pub multisample: bool,
}

impl RenderState {
    /// Settings required for surface sampling
    pub const SURFACE_SAMPLING: RenderState = RenderState {
        mode: OutputMode::Normals,
        multisample: false,
    };
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            mode: OutputMode::Color,
            multisample: true,
        }
    }
}

/// Output of a single render call
#[derive(Clone, Debug)]
pub struct Frame {
    /// Color or normal buffer, depending on [`RenderState::mode`]
    pub image: NormalImage,
    /// Depth buffer
    pub depth: DepthImage,
}

/// An offscreen rendering context
pub trait Renderer: Send {
    /// Returns the current context settings
    fn state(&self) -> RenderState;

    /// Replaces the context settings
    fn set_state(&mut self, state: RenderState);

    /// Renders a square `resolution × resolution` frame of the mesh
    fn render(
        &mut self,
        mesh: &Mesh,
        camera: &CameraPose,
        resolution: u32,
    ) -> Result<Frame, Error>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn image_indexing() {
        let mut img = DepthImage::new(3, 2);
        img[(1, 2)] = 4.0;
        assert_eq!(img[5], 4.0);
        assert_eq!(img.len(), 6);
        let doubled = img.map(|d| d * 2.0);
        assert_eq!(doubled[(1, 2)], 8.0);
    }

    #[test]
    #[should_panic]
    fn image_bounds() {
        let img = DepthImage::new(3, 2);
        let _ = img[(2, 0)];
    }

    #[test]
    fn output_mode_names() {
        assert_eq!(OutputMode::Normals.to_string(), "normals");
        assert_eq!("color".parse::<OutputMode>().unwrap(), OutputMode::Color);
    }
}
