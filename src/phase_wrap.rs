//! Differential phase wrapping
//!
//! The DPC image is offset by its median and wrapped into the `2pi` wide interval
//! `[median - pi, median + pi)`.
//! The median is the median of the row medians and not the median of the whole image.

use std::f32::consts::PI;

use rayon::prelude::*;

use crate::{Channel, ContrastImage};

/// In-place quicksort with the middle element as pivot
pub fn quicksort(data: &mut [f32]) {
    let n = data.len();
    if n < 2 {
        return;
    }
    let pivot = data[n / 2];
    let (mut i, mut j) = (0isize, n as isize - 1);
    while i <= j {
        while data[i as usize] < pivot {
            i += 1;
        }
        while data[j as usize] > pivot {
            j -= 1;
        }
        if i <= j {
            data.swap(i as usize, j as usize);
            i += 1;
            j -= 1;
        }
    }
    if j > 0 {
        quicksort(&mut data[..=j as usize]);
    }
    if (i as usize) < n {
        quicksort(&mut data[i as usize..]);
    }
}

/// Median of the row medians of a `width x height` row-major image
///
/// The median of `n` samples is the sample of rank `n/2`.
/// NaN and infinite samples are left out, rows without finite samples have no median
/// and the median of an image without finite samples is 0.
pub fn median_of_medians(data: &[f32], width: usize) -> f32 {
    if width == 0 || data.is_empty() {
        return 0f32;
    }
    let mut medians: Vec<f32> = data
        .par_chunks(width)
        .filter_map(|row| {
            let mut row: Vec<f32> = row.iter().copied().filter(|x| x.is_finite()).collect();
            if row.is_empty() {
                return None;
            }
            quicksort(&mut row);
            Some(row[row.len() / 2])
        })
        .collect();
    if medians.is_empty() {
        return 0f32;
    }
    quicksort(&mut medians);
    medians[medians.len() / 2]
}

/// DPC wrapping and non-finite samples filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseWrapFilter {
    sanitize_nonfinite: bool,
}

impl Default for PhaseWrapFilter {
    fn default() -> Self {
        Self {
            sanitize_nonfinite: true,
        }
    }
}

impl PhaseWrapFilter {
    /// Creates a new filter, non-finite samples are replaced by 0 if `sanitize_nonfinite` is set
    pub fn new(sanitize_nonfinite: bool) -> Self {
        Self { sanitize_nonfinite }
    }
    /// Wraps the DPC image around its median and sanitizes the contrast image
    ///
    /// Returns the DPC median
    pub fn filter(&self, contrast: &mut ContrastImage) -> f32 {
        let (width, _) = contrast.shape();
        let median = median_of_medians(contrast.dpc(), width);
        let two_pi = 2f32 * PI;
        contrast
            .channel_mut(Channel::Dpc)
            .par_iter_mut()
            .filter(|dpc| dpc.is_finite())
            .for_each(|dpc| {
                let residual = *dpc - median;
                *dpc -= two_pi * ((residual + PI) / two_pi).floor();
            });
        if self.sanitize_nonfinite {
            contrast.as_mut_slice().par_iter_mut().for_each(|x| {
                if !x.is_finite() {
                    *x = 0f32;
                }
            });
        } else if !contrast.is_finite() {
            log::warn!("non-finite contrast samples are passed through");
        }
        median
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn quicksort_matches_std() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in [0, 1, 2, 3, 10, 101, 1000] {
            let mut data: Vec<f32> = (0..n).map(|_| rng.gen_range(-10f32..10f32)).collect();
            let mut expected = data.clone();
            expected.sort_by(|a, b| a.total_cmp(b));
            quicksort(&mut data);
            assert_eq!(data, expected);
        }
        let mut data = vec![3f32, 1., 3., 3., 2., 1., 3.];
        quicksort(&mut data);
        assert_eq!(data, vec![1., 1., 2., 3., 3., 3., 3.]);
    }

    #[test]
    fn quicksort_with_nan_terminates() {
        let mut data = vec![2f32, f32::NAN, 1., 0., f32::NAN, 5.];
        quicksort(&mut data);
        assert_eq!(data.len(), 6);
    }

    #[test]
    fn median_is_median_of_row_medians() {
        // rows: [1,2,100] [3,4,5] [6,7,8] -> row medians 2,4,7 -> 4
        let data = [1f32, 100., 2., 5., 3., 4., 8., 6., 7.];
        assert_eq!(median_of_medians(&data, 3), 4.);
        // the whole image median differs from the median of the row medians
        let data = [0f32, 0., 1., 0., 0., 2., 9., 9., 9.];
        assert_eq!(median_of_medians(&data, 3), 0.);
        let mut all = data.to_vec();
        quicksort(&mut all);
        assert_eq!(all[all.len() / 2], 1.);
    }

    #[test]
    fn median_ignores_nonfinite() {
        let data = [f32::NAN, f32::NAN, 1., 2., f32::INFINITY, 3., f32::NAN, f32::NAN, f32::NAN];
        // row medians: 1, 3 and none
        assert_eq!(median_of_medians(&data, 3), 3.);
        assert_eq!(median_of_medians(&[f32::NAN; 4], 2), 0.);
    }

    #[test]
    fn dead_pixel_stays_local() {
        let (width, height) = (8, 8);
        let n = width * height;
        for dead in 0..n {
            let mut data = vec![0.1f32; 3 * n];
            data[dead] = f32::NAN;

            let mut contrast = ContrastImage::new(width, height, data.clone()).unwrap();
            let median = PhaseWrapFilter::new(false).filter(&mut contrast);
            assert!((median - 0.1).abs() < 1e-6, "median={median} with NaN @ {dead}");
            contrast.dpc().iter().enumerate().for_each(|(p, dpc)| {
                if p == dead {
                    assert!(dpc.is_nan());
                } else {
                    assert!((dpc - 0.1).abs() < 1e-6, "DPC @ {p} with NaN @ {dead}");
                }
            });

            let mut contrast = ContrastImage::new(width, height, data).unwrap();
            PhaseWrapFilter::new(true).filter(&mut contrast);
            contrast.dpc().iter().enumerate().for_each(|(p, dpc)| {
                let expected = if p == dead { 0. } else { 0.1 };
                assert!((dpc - expected).abs() < 1e-6, "DPC @ {p} with NaN @ {dead}");
            });
        }
    }

    #[test]
    fn wrap_range() {
        let (width, height) = (8, 8);
        let mut rng = StdRng::seed_from_u64(11);
        let n = width * height;
        let data: Vec<f32> = (0..n)
            .map(|_| rng.gen_range(-20f32..20f32))
            .chain((0..2 * n).map(|_| 1f32))
            .collect();
        let mut contrast = ContrastImage::new(width, height, data.clone()).unwrap();
        let median = PhaseWrapFilter::default().filter(&mut contrast);
        assert_eq!(median, median_of_medians(&data[..n], width));
        contrast.dpc().iter().zip(&data[..n]).for_each(|(w, d)| {
            assert!(*w >= median - PI - 1e-4 && *w < median + PI + 1e-4);
            let turns = (d - w) / (2. * PI);
            assert!((turns - turns.round()).abs() < 1e-3);
        });
    }

    #[test]
    fn sanitize() {
        let (width, height) = (2, 2);
        let mut data = vec![0f32; 3 * width * height];
        data[1] = f32::NAN;
        data[5] = f32::INFINITY;
        data[10] = f32::NEG_INFINITY;
        let mut contrast = ContrastImage::new(width, height, data.clone()).unwrap();
        PhaseWrapFilter::new(false).filter(&mut contrast);
        assert!(!contrast.is_finite());
        let mut contrast = ContrastImage::new(width, height, data).unwrap();
        PhaseWrapFilter::new(true).filter(&mut contrast);
        assert!(contrast.is_finite());
        assert!(contrast.as_slice().iter().all(|x| *x == 0.));
    }
}
