//! Accumulation of the dark-subtracted frames of a phase-stepping scan

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Frame, PhaseStack, PhaseSteppingError, Result};

/// Phase stack accumulator
///
/// Collects a fixed number of dark-subtracted frames along the phase-step axis
///
/// A step written twice is overwritten and still counts once
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccumulationStore {
    stack: PhaseStack,
    written: Vec<bool>,
}

impl AccumulationStore {
    /// Creates a store for `n_steps` frames of `width x height` pixels
    pub fn new(n_steps: usize, width: usize, height: usize) -> Self {
        Self {
            stack: PhaseStack::zeros(width, height, n_steps),
            written: vec![false; n_steps],
        }
    }
    /// Zeroes the store and resizes it for `n_steps` frames of `width x height` pixels
    pub fn reset(&mut self, n_steps: usize, width: usize, height: usize) -> &mut Self {
        self.stack = PhaseStack::zeros(width, height, n_steps);
        self.written = vec![false; n_steps];
        self
    }
    /// Writes `frame - dark` at phase step `step`
    ///
    /// If `clamp_nonfinite` is set, NaN and infinite differences are replaced by 0
    pub fn write_step(
        &mut self,
        step: usize,
        frame: &Frame,
        dark: &Frame,
        clamp_nonfinite: bool,
    ) -> Result<&mut Self> {
        let n_steps = self.n_steps();
        if step >= n_steps {
            return Err(PhaseSteppingError::OutOfRange {
                index: step,
                n_steps,
            });
        }
        let shape = self.shape();
        for found in [frame.shape(), dark.shape()] {
            if found != shape {
                return Err(PhaseSteppingError::ShapeMismatch {
                    expected: shape,
                    found,
                });
            }
        }
        self.stack
            .step_mut(step)
            .par_iter_mut()
            .zip(frame.as_slice().par_iter().zip(dark.as_slice().par_iter()))
            .for_each(|(s, (f, d))| {
                let value = f - d;
                *s = if clamp_nonfinite && !value.is_finite() {
                    0f32
                } else {
                    value
                };
            });
        self.written[step] = true;
        Ok(self)
    }
    #[inline]
    pub fn n_steps(&self) -> usize {
        self.stack.n_steps()
    }
    /// Number of distinct phase steps written since the last reset
    #[inline]
    pub fn n_written(&self) -> usize {
        self.written.iter().filter(|w| **w).count()
    }
    /// Checks if a frame has been written at phase step `step`
    #[inline]
    pub fn is_written(&self, step: usize) -> bool {
        self.written.get(step).copied().unwrap_or(false)
    }
    /// Checks if every phase step has been written
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.written.iter().all(|w| *w)
    }
    /// Returns `(width, height)`
    pub fn shape(&self) -> (usize, usize) {
        let strides = self.stack.strides();
        (strides.width, strides.height)
    }
    pub fn stack(&self) -> &PhaseStack {
        &self.stack
    }
}

/// Averaged dark field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DarkField {
    sum: Vec<f64>,
    shape: (usize, usize),
    n_frame: usize,
    n_expected: usize,
    mean: Option<Frame>,
}

impl DarkField {
    /// Creates an empty dark field expecting `n_expected` frames of `width x height` pixels
    pub fn new(n_expected: usize, width: usize, height: usize) -> Self {
        Self {
            sum: vec![0f64; width * height],
            shape: (width, height),
            n_frame: 0,
            n_expected,
            mean: None,
        }
    }
    /// Adds a dark frame, the mean is computed with the last expected frame
    pub fn add(&mut self, frame: &Frame) -> Result<&mut Self> {
        if frame.shape() != self.shape {
            return Err(PhaseSteppingError::ShapeMismatch {
                expected: self.shape,
                found: frame.shape(),
            });
        }
        self.sum
            .iter_mut()
            .zip(frame.as_slice())
            .for_each(|(s, f)| *s += *f as f64);
        self.n_frame += 1;
        if self.n_frame == self.n_expected {
            let n = self.n_frame as f64;
            let (width, height) = self.shape;
            self.mean = Some(Frame::new(
                width,
                height,
                self.sum.iter().map(|s| (s / n) as f32).collect(),
            )?);
        }
        Ok(self)
    }
    #[inline]
    pub fn n_frame(&self) -> usize {
        self.n_frame
    }
    #[inline]
    pub fn n_expected(&self) -> usize {
        self.n_expected
    }
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.mean.is_some()
    }
    /// Returns the averaged dark frame once all the dark frames are in
    pub fn frame(&self) -> Option<&Frame> {
        self.mean.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_step() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut store = AccumulationStore::new(3, 2, 2);
        let dark = Frame::constant(2, 2, 1.);
        store.write_step(1, &Frame::new(2, 2, vec![2., 3., 4., 5.])?, &dark, false)?;
        assert_eq!(store.n_written(), 1);
        assert!(!store.is_complete());
        assert_eq!(store.stack().step(0), &[0f32; 4]);
        assert_eq!(store.stack().step(1), &[1., 2., 3., 4.]);
        Ok(())
    }

    #[test]
    fn rewritten_step_counts_once() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut store = AccumulationStore::new(2, 2, 2);
        let dark = Frame::zeros(2, 2);
        store.write_step(0, &Frame::constant(2, 2, 1.), &dark, false)?;
        store.write_step(0, &Frame::constant(2, 2, 2.), &dark, false)?;
        assert_eq!(store.n_written(), 1);
        assert!(store.is_written(0));
        assert!(!store.is_written(1));
        assert!(!store.is_complete());
        assert_eq!(store.stack().step(0), &[2f32; 4]);
        store.write_step(1, &Frame::constant(2, 2, 3.), &dark, false)?;
        assert!(store.is_complete());
        store.reset(2, 2, 2);
        assert_eq!(store.n_written(), 0);
        Ok(())
    }

    #[test]
    fn out_of_range() {
        let mut store = AccumulationStore::new(2, 2, 2);
        let frame = Frame::zeros(2, 2);
        assert!(matches!(
            store.write_step(2, &frame, &frame, true),
            Err(PhaseSteppingError::OutOfRange {
                index: 2,
                n_steps: 2
            })
        ));
        assert_eq!(store.n_written(), 0);
    }

    #[test]
    fn clamp_nonfinite() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let frame = Frame::new(2, 1, vec![f32::INFINITY, f32::NAN])?;
        let dark = Frame::zeros(2, 1);
        let mut store = AccumulationStore::new(1, 2, 1);
        store.write_step(0, &frame, &dark, true)?;
        assert_eq!(store.stack().step(0), &[0., 0.]);
        store.reset(1, 2, 1).write_step(0, &frame, &dark, false)?;
        assert!(store.stack().step(0).iter().all(|x| !x.is_finite()));
        Ok(())
    }

    #[test]
    fn dark_average() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut dark = DarkField::new(2, 2, 1);
        dark.add(&Frame::new(2, 1, vec![1., 2.])?)?;
        assert!(!dark.is_ready());
        dark.add(&Frame::new(2, 1, vec![3., 6.])?)?;
        assert_eq!(dark.frame().map(|f| f.as_slice()), Some(&[2f32, 4.][..]));
        Ok(())
    }
}
