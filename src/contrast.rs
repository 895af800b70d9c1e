use std::fmt::Display;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{FrameBuffer, PhaseSteppingError, Result, Strides};

type Mat = nalgebra::DMatrix<f32>;

/// Contrast image channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Differential phase contrast
    Dpc,
    /// Absorption
    Asp,
    /// Dark-field or visibility
    Dfi,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Dpc, Channel::Asp, Channel::Dfi];
    /// Index of the channel in a [ContrastImage]
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            Channel::Dpc => 0,
            Channel::Asp => 1,
            Channel::Dfi => 2,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Dpc => f.write_str("DPC"),
            Channel::Asp => f.write_str("ASP"),
            Channel::Dfi => f.write_str("DFI"),
        }
    }
}

/// DPC, ASP and DFI images
///
/// The 3 channels are stored one after the other in that order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContrastImage(FrameBuffer);

impl Display for ContrastImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (width, height) = self.shape();
        writeln!(f, "Contrast image {}x{}px:", width, height)?;
        for c in Channel::ALL {
            let data = self.channel(c);
            let (min, max) = data
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(a, b), x| {
                    (a.min(*x), b.max(*x))
                });
            let n_nonfinite = data.iter().filter(|x| !x.is_finite()).count();
            writeln!(
                f,
                " * {}: [{:+.3e},{:+.3e}], {} non-finite",
                c, min, max, n_nonfinite
            )?;
        }
        Ok(())
    }
}

impl ContrastImage {
    /// Creates a zeroed contrast image
    pub fn zeros(width: usize, height: usize) -> Self {
        Self(FrameBuffer::zeros(width, height, 3))
    }
    /// Creates a contrast image from the concatenated DPC, ASP and DFI images
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        let strides = Strides::new(width, height, 3);
        if data.len() != strides.len() {
            return Err(PhaseSteppingError::InvalidFrame {
                len: data.len(),
                width,
                height: 3 * height,
            });
        }
        Ok(Self(FrameBuffer::from_parts(strides, data)))
    }
    /// Returns `(width, height)`
    pub fn shape(&self) -> (usize, usize) {
        let (width, height, _) = self.0.shape();
        (width, height)
    }
    #[inline]
    pub fn strides(&self) -> Strides {
        self.0.strides()
    }
    pub fn channel(&self, channel: Channel) -> &[f32] {
        self.0.slice(channel.index())
    }
    pub fn channel_mut(&mut self, channel: Channel) -> &mut [f32] {
        self.0.slice_mut(channel.index())
    }
    /// Returns the mutable DPC, ASP and DFI images
    pub fn channels_mut(&mut self) -> (&mut [f32], &mut [f32], &mut [f32]) {
        let n = self.strides().n_pixel();
        let (dpc, rest) = self.0.as_mut_slice().split_at_mut(n);
        let (asp, dfi) = rest.split_at_mut(n);
        (dpc, asp, dfi)
    }
    pub fn dpc(&self) -> &[f32] {
        self.channel(Channel::Dpc)
    }
    pub fn asp(&self) -> &[f32] {
        self.channel(Channel::Asp)
    }
    pub fn dfi(&self) -> &[f32] {
        self.channel(Channel::Dfi)
    }
    /// Returns the value of `channel` at column `x` and row `y`
    pub fn get(&self, channel: Channel, x: usize, y: usize) -> Option<f32> {
        let strides = self.strides();
        if x >= strides.width || y >= strides.height {
            return None;
        }
        Some(self.channel(channel)[strides.pixel(x, y)])
    }
    pub fn as_slice(&self) -> &[f32] {
        self.0.as_slice()
    }
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.0.as_mut_slice()
    }
    /// Returns `channel` as a `height x width` matrix
    pub fn to_matrix(&self, channel: Channel) -> Mat {
        let (width, height) = self.shape();
        Mat::from_row_slice(height, width, self.channel(channel))
    }
    /// Checks that all the samples are finite
    pub fn is_finite(&self) -> bool {
        self.as_slice().iter().all(|x| x.is_finite())
    }
}

impl From<ContrastImage> for Vec<f32> {
    fn from(contrast: ContrastImage) -> Self {
        contrast.0.into_vec()
    }
}

/// Flat-field correction of the projection contrast images
pub struct ContrastCorrector;

impl ContrastCorrector {
    /// Normalizes the projection contrast image `proj` with the flat-field contrast image `flats`
    ///
    ///  * DPC: `proj - flats`
    ///  * ASP: `proj / flats`
    ///  * DFI: `(proj / flats) / ASP`
    ///
    /// Divisions by zero are carried through as NaN or infinite values
    pub fn correct(flats: &ContrastImage, proj: &ContrastImage) -> Result<ContrastImage> {
        if flats.shape() != proj.shape() {
            return Err(PhaseSteppingError::ShapeMismatch {
                expected: flats.shape(),
                found: proj.shape(),
            });
        }
        let (width, height) = proj.shape();
        let mut corrected = ContrastImage::zeros(width, height);
        let (dpc, asp, dfi) = corrected.channels_mut();
        dpc.par_iter_mut()
            .zip(asp.par_iter_mut())
            .zip(dfi.par_iter_mut())
            .enumerate()
            .for_each(|(p, ((dpc, asp), dfi))| {
                *dpc = proj.dpc()[p] - flats.dpc()[p];
                *asp = proj.asp()[p] / flats.asp()[p];
                *dfi = (proj.dfi()[p] / flats.dfi()[p]) / *asp;
            });
        Ok(corrected)
    }
}
