//! Temporal Fourier analysis of phase-stepping curves
//!
//! The phase-stepping curve of a pixel, `I(s)` for `s` in `[0,n)`, is Fourier transformed along
//! the phase-step axis:
//!  * the magnitude of the DC term is the absorption (ASP),
//!  * the argument of the grating harmonic is the differential phase (DPC),
//!  * the magnitude of the grating harmonic is the dark-field or visibility (DFI).
//!
//! The grating harmonic is the [PeriodIndex] found once by the [PeriodDetector]
//! from the mean flat-field curve.

use std::{collections::HashMap, fmt, sync::Arc};

use rayon::prelude::*;
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::{ContrastImage, PhaseSteppingError, Result, TransposedStack};

/// Number of pixels transformed by a rayon task
const PIXEL_BATCH: usize = 1024;

/// Index of the grating harmonic in the phase-stepping spectrum
///
/// A period index `k` of a `n` steps scan satisfies `1 <= k <= n/2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodIndex(usize);

impl PeriodIndex {
    /// Creates a period index for a `n_steps` scan
    pub fn new(index: usize, n_steps: usize) -> Result<Self> {
        if index == 0 || index > (n_steps / 2).max(1) {
            return Err(PhaseSteppingError::InvalidPeriod { index, n_steps });
        }
        Ok(Self(index))
    }
    #[inline]
    pub fn get(&self) -> usize {
        self.0
    }
}

impl fmt::Display for PeriodIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Grating period detector
pub struct PeriodDetector;

impl PeriodDetector {
    /// Returns the harmonic with the largest magnitude among `1..=n/2` of the spectrum
    /// of the mean flat-field phase-stepping curve
    ///
    /// Harmonics with exactly the same magnitude are resolved in favor of the larger argument.
    /// Scans with less than 2 steps have no harmonic and the first one is returned.
    pub fn detect(mean_per_step: &[f32]) -> PeriodIndex {
        let n = mean_per_step.len();
        if n < 2 {
            return PeriodIndex(1);
        }
        let mut spectrum: Vec<_> = mean_per_step
            .iter()
            .map(|x| Complex32::new(*x, 0f32))
            .collect();
        FftPlanner::<f32>::new()
            .plan_fft_forward(n)
            .process(&mut spectrum);
        let (index, _, _) = spectrum
            .iter()
            .enumerate()
            .take(n / 2 + 1)
            .skip(1)
            .map(|(k, x)| (k, x.norm(), x.im.atan2(x.re)))
            .fold(
                (1usize, f32::NEG_INFINITY, f32::NEG_INFINITY),
                |(k0, m0, a0), (k, m, a)| {
                    if m > m0 || (m == m0 && a > a0) {
                        (k, m, a)
                    } else {
                        (k0, m0, a0)
                    }
                },
            );
        log::debug!("grating harmonic #{index} in {n} phase steps");
        PeriodIndex(index)
    }
}

/// Batched phase-stepping Fourier analysis
///
/// The Fourier transform plans are cached per number of phase steps
pub struct HarmonicAnalyzer {
    planner: FftPlanner<f32>,
    plans: HashMap<usize, Arc<dyn Fft<f32>>>,
}

impl Default for HarmonicAnalyzer {
    fn default() -> Self {
        Self {
            planner: FftPlanner::new(),
            plans: HashMap::new(),
        }
    }
}

impl fmt::Debug for HarmonicAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sizes: Vec<_> = self.plans.keys().collect();
        sizes.sort();
        f.debug_struct("HarmonicAnalyzer")
            .field("plans", &sizes)
            .finish()
    }
}

impl HarmonicAnalyzer {
    pub fn new() -> Self {
        Default::default()
    }
    /// Returns the forward transform plan of length `n_steps`, creating it on first use
    pub fn plan(&mut self, n_steps: usize) -> Arc<dyn Fft<f32>> {
        let planner = &mut self.planner;
        self.plans
            .entry(n_steps)
            .or_insert_with(|| planner.plan_fft_forward(n_steps))
            .clone()
    }
    /// Number of cached transform plans
    pub fn n_plan(&self) -> usize {
        self.plans.len()
    }
    /// Computes the DPC, ASP and DFI images of a pixel-major phase stack
    pub fn analyze(&mut self, stack: &TransposedStack, period: PeriodIndex) -> Result<ContrastImage> {
        let strides = stack.strides();
        let n_steps = strides.depth;
        let k = period.get();
        let mut contrast = ContrastImage::zeros(strides.width, strides.height);

        if n_steps == 1 {
            let (_, asp, _) = contrast.channels_mut();
            asp.copy_from_slice(stack.as_slice());
            return Ok(contrast);
        }
        if k >= n_steps {
            return Err(PhaseSteppingError::OutOfRange { index: k, n_steps });
        }

        let fft = self.plan(n_steps);
        let scratch_len = fft.get_inplace_scratch_len();
        let mut buffer: Vec<Complex32> = stack
            .as_slice()
            .par_iter()
            .map(|x| Complex32::new(*x, 0f32))
            .collect();
        buffer.par_chunks_mut(n_steps * PIXEL_BATCH).for_each_init(
            || vec![Complex32::default(); scratch_len],
            |scratch, chunk| fft.process_with_scratch(chunk, scratch),
        );

        let (dpc, asp, dfi) = contrast.channels_mut();
        dpc.par_iter_mut()
            .zip(asp.par_iter_mut())
            .zip(dfi.par_iter_mut())
            .zip(buffer.par_chunks(n_steps))
            .for_each(|(((dpc, asp), dfi), spectrum)| {
                let harmonic = spectrum[k];
                *asp = spectrum[0].norm();
                *dpc = harmonic.im.atan2(harmonic.re);
                *dfi = harmonic.norm();
            });
        Ok(contrast)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use crate::{Frame, PhaseStack};

    fn stepping_curve(n: usize, k: usize, a: f32, b: f32, phi: f32) -> Vec<f32> {
        (0..n)
            .map(|s| a + b * (2. * PI * (k * s) as f32 / n as f32 + phi).cos())
            .collect()
    }

    fn uniform_stack(curve: &[f32], width: usize, height: usize) -> PhaseStack {
        let frames: Vec<_> = curve
            .iter()
            .map(|v| Frame::constant(width, height, *v))
            .collect();
        PhaseStack::from_frames(&frames).unwrap()
    }

    #[test]
    fn harmonic_extraction() {
        let (n, k, a, b, phi) = (8, 2, 100f32, 30f32, 0.7f32);
        let stack = uniform_stack(&stepping_curve(n, k, a, b, phi), 5, 3);
        let mut analyzer = HarmonicAnalyzer::new();
        let contrast = analyzer
            .analyze(&stack.transpose(), PeriodIndex::new(k, n).unwrap())
            .unwrap();
        for p in 0..15 {
            assert!((contrast.asp()[p] - a * n as f32).abs() < 1e-2);
            assert!((contrast.dpc()[p] - phi).abs() < 1e-4);
            assert!((contrast.dfi()[p] - b * n as f32 / 2.).abs() < 1e-2);
        }
    }

    #[test]
    fn pixels_are_independent() {
        let (n, k) = (6, 1);
        let frames: Vec<_> = (0..n)
            .map(|s| {
                Frame::from_fn(4, 4, |x, y| {
                    let phi = 0.1 * (x + 4 * y) as f32;
                    10. + 2. * (2. * PI * (k * s) as f32 / n as f32 + phi).cos()
                })
            })
            .collect();
        let stack = PhaseStack::from_frames(&frames).unwrap();
        let contrast = HarmonicAnalyzer::new()
            .analyze(&stack.transpose(), PeriodIndex::new(k, n).unwrap())
            .unwrap();
        contrast
            .dpc()
            .iter()
            .enumerate()
            .for_each(|(p, dpc)| assert!((dpc - 0.1 * p as f32).abs() < 1e-4));
    }

    #[test]
    fn plan_cache() {
        let mut analyzer = HarmonicAnalyzer::new();
        let period = PeriodIndex::new(1, 4).unwrap();
        for n in [4, 4, 5, 4] {
            let stack = uniform_stack(&stepping_curve(n, 1, 1., 0.5, 0.), 2, 2);
            analyzer.analyze(&stack.transpose(), period).unwrap();
        }
        assert_eq!(analyzer.n_plan(), 2);
    }

    #[test]
    fn single_step() {
        let stack = PhaseStack::from_frames(&[Frame::constant(3, 3, 7.)]).unwrap();
        let contrast = HarmonicAnalyzer::new()
            .analyze(&stack.transpose(), PeriodIndex::new(1, 1).unwrap())
            .unwrap();
        assert!(contrast.asp().iter().all(|x| *x == 7.));
        assert!(contrast.dpc().iter().all(|x| *x == 0.));
        assert!(contrast.dfi().iter().all(|x| *x == 0.));
    }

    #[test]
    fn period_out_of_range() {
        let stack = uniform_stack(&[1., 2., 3.], 2, 2);
        let period = PeriodIndex::new(3, 6).unwrap();
        assert!(matches!(
            HarmonicAnalyzer::new().analyze(&stack.transpose(), period),
            Err(PhaseSteppingError::OutOfRange {
                index: 3,
                n_steps: 3
            })
        ));
    }

    #[test]
    fn period_index_bounds() {
        assert!(PeriodIndex::new(0, 8).is_err());
        let err = PeriodIndex::new(5, 8).unwrap_err();
        assert!(matches!(
            err,
            PhaseSteppingError::InvalidPeriod {
                index: 5,
                n_steps: 8
            }
        ));
        assert_eq!(
            err.to_string(),
            "grating harmonic #5 is not within [1,4] for 8 phase steps"
        );
        assert_eq!(PeriodIndex::new(4, 8).unwrap().get(), 4);
        assert_eq!(PeriodIndex::new(1, 1).unwrap().get(), 1);
    }

    #[test]
    fn detect_dominant_harmonic() {
        let n = 16;
        for k in 1..=n / 2 {
            let mut curve = stepping_curve(n, k, 50., 10., 0.3);
            // low-amplitude clutter on the other harmonics
            for j in (1..=n / 2).filter(|j| *j != k) {
                curve
                    .iter_mut()
                    .zip(stepping_curve(n, j, 0., 0.5, 0.1 * j as f32))
                    .for_each(|(c, x)| *c += x);
            }
            assert_eq!(PeriodDetector::detect(&curve).get(), k);
        }
    }

    #[test]
    fn detect_tie_breaks_on_argument() {
        // X1 = -i and X2 = -1: same magnitude, arg(X2) = pi > arg(X1) = -pi/2
        assert_eq!(PeriodDetector::detect(&[0., 1., 0., 0.]).get(), 2);
        // X1 = -1 and X2 = 1: same magnitude, arg(X1) = pi > arg(X2) = 0
        assert_eq!(PeriodDetector::detect(&[0., 0., 1., 0.]).get(), 1);
    }

    #[test]
    fn detect_never_dc() {
        assert_eq!(PeriodDetector::detect(&[5.]).get(), 1);
        assert_eq!(PeriodDetector::detect(&[10., 12., 10., 8.]).get(), 1);
    }
}
