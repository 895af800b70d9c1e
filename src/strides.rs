use serde::{Deserialize, Serialize};

/// Linear offsets into the flat buffers of the crate
///
/// A buffer is `width x height` pixels, row-major, times `depth` slices.
/// The slices are either phase steps or contrast channels.
/// Two layouts are used:
///  * slice-major: `slice * n_pixel + pixel`, the layout of the detector frames stacked
///    one after the other and of the contrast images,
///  * pixel-major: `pixel * depth + slice`, the layout of the harmonic analysis
///    where all the phase steps of a pixel are contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Strides {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Strides {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
    /// Number of pixels in a slice
    #[inline]
    pub fn n_pixel(&self) -> usize {
        self.width * self.height
    }
    /// Total number of samples
    #[inline]
    pub fn len(&self) -> usize {
        self.n_pixel() * self.depth
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Pixel index of the pixel at column `x` and row `y`
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }
    /// Slice-major offset of `pixel` in `slice`
    #[inline]
    pub fn slice_major(&self, pixel: usize, slice: usize) -> usize {
        slice * self.n_pixel() + pixel
    }
    /// Pixel-major offset of `slice` of `pixel`
    #[inline]
    pub fn pixel_major(&self, pixel: usize, slice: usize) -> usize {
        pixel * self.depth + slice
    }
    /// Range of a whole slice in the slice-major layout
    #[inline]
    pub fn slice_range(&self, slice: usize) -> std::ops::Range<usize> {
        let n = self.n_pixel();
        slice * n..(slice + 1) * n
    }
    /// Range of a row of a slice in the slice-major layout
    #[inline]
    pub fn row_range(&self, slice: usize, y: usize) -> std::ops::Range<usize> {
        let start = self.slice_major(self.pixel(0, y), slice);
        start..start + self.width
    }
}
