use std::fmt::Display;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{PhaseSteppingError, Result, Strides};

/// Detector frame
///
/// `width x height` samples, row-major
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame {}x{}px, mean={:.3}", self.width, self.height, self.mean())
    }
}

impl Frame {
    /// Creates a new frame from its shape and samples
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(PhaseSteppingError::InvalidFrame {
                len: data.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
    /// Creates a frame filled with zeros
    pub fn zeros(width: usize, height: usize) -> Self {
        Self::constant(width, height, 0f32)
    }
    /// Creates a frame filled with `value`
    pub fn constant(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }
    /// Creates a frame from a function of the pixel column and row
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f32,
    {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }
    /// Returns `(width, height)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
    /// Spatial average of the frame
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0f32;
        }
        (self.data.iter().map(|x| *x as f64).sum::<f64>() / self.data.len() as f64) as f32
    }
}

impl From<Frame> for Vec<f32> {
    fn from(frame: Frame) -> Self {
        frame.data
    }
}

/// A stack of `depth` images of `width x height` pixels, slice-major
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameBuffer {
    strides: Strides,
    data: Vec<f32>,
}

impl FrameBuffer {
    /// Creates a zeroed buffer
    pub fn zeros(width: usize, height: usize, depth: usize) -> Self {
        let strides = Strides::new(width, height, depth);
        Self {
            data: vec![0f32; strides.len()],
            strides,
        }
    }
    pub(crate) fn from_parts(strides: Strides, data: Vec<f32>) -> Self {
        debug_assert_eq!(strides.len(), data.len());
        Self { strides, data }
    }
    #[inline]
    pub fn strides(&self) -> Strides {
        self.strides
    }
    /// Returns `(width, height, depth)`
    pub fn shape(&self) -> (usize, usize, usize) {
        let Strides {
            width,
            height,
            depth,
        } = self.strides;
        (width, height, depth)
    }
    /// Returns the image at index `k`
    pub fn slice(&self, k: usize) -> &[f32] {
        &self.data[self.strides.slice_range(k)]
    }
    /// Returns the mutable image at index `k`
    pub fn slice_mut(&mut self, k: usize) -> &mut [f32] {
        let range = self.strides.slice_range(k);
        &mut self.data[range]
    }
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Phase-stepping frames stacked along the phase-step axis, slice-major
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStack(pub(crate) FrameBuffer);

impl PhaseStack {
    /// Creates a zeroed stack of `n_steps` frames
    pub fn zeros(width: usize, height: usize, n_steps: usize) -> Self {
        Self(FrameBuffer::zeros(width, height, n_steps))
    }
    /// Stacks the given frames
    pub fn from_frames(frames: &[Frame]) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(PhaseSteppingError::Config(
                "a phase stack needs at least one frame".into(),
            ));
        };
        let (width, height) = first.shape();
        let mut stack = Self::zeros(width, height, frames.len());
        for (k, frame) in frames.iter().enumerate() {
            if frame.shape() != (width, height) {
                return Err(PhaseSteppingError::ShapeMismatch {
                    expected: (width, height),
                    found: frame.shape(),
                });
            }
            stack.0.slice_mut(k).copy_from_slice(frame.as_slice());
        }
        Ok(stack)
    }
    #[inline]
    pub fn n_steps(&self) -> usize {
        self.0.strides.depth
    }
    #[inline]
    pub fn strides(&self) -> Strides {
        self.0.strides
    }
    /// Returns the frame of phase step `step`
    pub fn step(&self, step: usize) -> &[f32] {
        self.0.slice(step)
    }
    pub(crate) fn step_mut(&mut self, step: usize) -> &mut [f32] {
        self.0.slice_mut(step)
    }
    pub fn as_buffer(&self) -> &FrameBuffer {
        &self.0
    }
    /// Spatial average of each phase step
    pub fn mean_per_step(&self) -> Vec<f32> {
        let n = self.strides().n_pixel().max(1) as f64;
        (0..self.n_steps())
            .map(|k| (self.step(k).iter().map(|x| *x as f64).sum::<f64>() / n) as f32)
            .collect()
    }
    /// Reorders the stack so that the phase steps of every pixel are contiguous
    pub fn transpose(&self) -> TransposedStack {
        let strides = self.strides();
        let n_steps = strides.depth;
        let mut data = vec![0f32; strides.len()];
        if n_steps > 0 {
            data.par_chunks_mut(n_steps)
                .enumerate()
                .for_each(|(pixel, samples)| {
                    samples.iter_mut().enumerate().for_each(|(k, s)| {
                        *s = self.0.data[strides.slice_major(pixel, k)];
                    })
                });
        }
        TransposedStack { strides, data }
    }
}

/// Phase-stepping frames in the pixel-major layout
///
/// The samples `[pixel * n_steps, (pixel + 1) * n_steps)` are the phase steps of `pixel`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransposedStack {
    strides: Strides,
    data: Vec<f32>,
}

impl TransposedStack {
    #[inline]
    pub fn n_steps(&self) -> usize {
        self.strides.depth
    }
    #[inline]
    pub fn strides(&self) -> Strides {
        self.strides
    }
    /// Returns the phase-stepping curve of `pixel`
    pub fn samples(&self, pixel: usize) -> &[f32] {
        let start = self.strides.pixel_major(pixel, 0);
        &self.data[start..start + self.n_steps()]
    }
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_frame() {
        assert!(matches!(
            Frame::new(3, 3, vec![0f32; 8]),
            Err(PhaseSteppingError::InvalidFrame { len: 8, .. })
        ));
    }

    #[test]
    fn from_fn_is_row_major() {
        let frame = Frame::from_fn(3, 2, |x, y| (10 * y + x) as f32);
        assert_eq!(frame.as_slice(), &[0., 1., 2., 10., 11., 12.]);
    }

    #[test]
    fn transpose() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let frames: Vec<_> = (0..3)
            .map(|k| Frame::from_fn(2, 2, |x, y| (100 * k + 10 * y + x) as f32))
            .collect();
        let stack = PhaseStack::from_frames(&frames)?;
        assert_eq!(stack.n_steps(), 3);
        let t = stack.transpose();
        assert_eq!(t.samples(0), &[0., 100., 200.]);
        assert_eq!(t.samples(3), &[11., 111., 211.]);
        Ok(())
    }

    #[test]
    fn mean_per_step() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let frames = vec![
            Frame::constant(4, 4, 10.),
            Frame::from_fn(4, 4, |x, _| x as f32),
        ];
        let stack = PhaseStack::from_frames(&frames)?;
        assert_eq!(stack.mean_per_step(), vec![10., 1.5]);
        Ok(())
    }

    #[test]
    fn stack_shape_mismatch() {
        let frames = vec![Frame::zeros(4, 4), Frame::zeros(4, 3)];
        assert!(matches!(
            PhaseStack::from_frames(&frames),
            Err(PhaseSteppingError::ShapeMismatch { .. })
        ));
    }
}
