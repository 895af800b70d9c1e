//! Sinograms of a tomographic series of contrast images
//!
//! A sinogram gathers the same detector row of all the projection angles:
//! the row `a` of the sinogram of detector row `y` is the row `y` of the projection at angle `a`.

use rayon::prelude::*;

use crate::{Channel, ContrastImage, PhaseSteppingError, Result};

type Mat = nalgebra::DMatrix<f32>;

/// Tomographic sinogram generator
#[derive(Debug, Clone, Default)]
pub struct SinogramGenerator {
    n_projections: usize,
    projections: Vec<ContrastImage>,
}

impl SinogramGenerator {
    /// Creates a generator for `n_projections` projection angles
    pub fn new(n_projections: usize) -> Self {
        Self {
            n_projections,
            projections: Vec::with_capacity(n_projections),
        }
    }
    /// Adds the contrast image of the next projection angle
    pub fn push(&mut self, projection: ContrastImage) -> Result<&mut Self> {
        if self.is_complete() {
            return Err(PhaseSteppingError::SequenceExhausted(self.n_projections));
        }
        if let Some(first) = self.projections.first() {
            if first.shape() != projection.shape() {
                return Err(PhaseSteppingError::ShapeMismatch {
                    expected: first.shape(),
                    found: projection.shape(),
                });
            }
        }
        self.projections.push(projection);
        if self.is_complete() {
            log::info!("sinograms of {} projections ready", self.n_projections);
        }
        Ok(self)
    }
    #[inline]
    pub fn n_projections(&self) -> usize {
        self.n_projections
    }
    #[inline]
    pub fn n_received(&self) -> usize {
        self.projections.len()
    }
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.projections.len() == self.n_projections
    }
    /// Returns `(width, height)` of the projections
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.projections.first().map(|p| p.shape())
    }
    /// Returns the `n_projections x width` sinogram of the detector row `y`
    pub fn sinogram(&self, channel: Channel, y: usize) -> Option<Mat> {
        let (width, height) = self.shape()?;
        if !self.is_complete() || y >= height {
            return None;
        }
        let rows: Vec<_> = self
            .projections
            .iter()
            .map(|p| &p.as_slice()[p.strides().row_range(channel.index(), y)])
            .collect();
        Some(Mat::from_fn(self.n_projections, width, |a, x| rows[a][x]))
    }
    /// Returns the sinograms of all the detector rows once all the projections are in
    pub fn sinograms(&self, channel: Channel) -> Option<Vec<Mat>> {
        let (_, height) = self.shape()?;
        if !self.is_complete() {
            return None;
        }
        (0..height)
            .into_par_iter()
            .map(|y| self.sinogram(channel, y))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection(angle: usize) -> ContrastImage {
        let (width, height) = (3, 2);
        let data = (0..3)
            .flat_map(|c| {
                (0..width * height).map(move |p| (1000 * c + 100 * angle + p) as f32)
            })
            .collect();
        ContrastImage::new(width, height, data).unwrap()
    }

    #[test]
    fn sinograms() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut sino = SinogramGenerator::new(4);
        for a in 0..4 {
            assert!(sino.sinograms(Channel::Dpc).is_none());
            sino.push(projection(a))?;
        }
        let dfi = sino.sinograms(Channel::Dfi).ok_or("incomplete sinograms")?;
        assert_eq!(dfi.len(), 2);
        assert_eq!(dfi[1].shape(), (4, 3));
        // angle 3, detector row 1, column 2
        assert_eq!(dfi[1][(3, 2)], 2000. + 300. + 5.);
        assert_eq!(dfi[0][(2, 0)], 2000. + 200.);
        Ok(())
    }

    #[test]
    fn exhausted() {
        let mut sino = SinogramGenerator::new(1);
        sino.push(projection(0)).unwrap();
        assert!(matches!(
            sino.push(projection(1)),
            Err(PhaseSteppingError::SequenceExhausted(1))
        ));
    }

    #[test]
    fn shape_mismatch() {
        let mut sino = SinogramGenerator::new(2);
        sino.push(projection(0)).unwrap();
        assert!(matches!(
            sino.push(ContrastImage::zeros(2, 3)),
            Err(PhaseSteppingError::ShapeMismatch { .. })
        ));
        assert_eq!(sino.n_received(), 1);
    }
}
