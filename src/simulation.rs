//! Talbot-Lau phase-stepping scan simulation
//!
//! The intensity of pixel `p` at phase step `s` of a `n` steps scan is
//!
//! `I(p,s) = dark + A T(p) (1 + V0 Vs(p) cos(2 pi k s / n + phi0 + dphi(p))) + noise`
//!
//! where `A` is the mean intensity, `V0` and `phi0` are the grating visibility and phase,
//! `k` is the number of fringe periods swept over the scan and
//! `T`, `Vs` and `dphi` are the sample transmission, visibility reduction and phase shift.
//! Without sample `T=Vs=1` and `dphi=0`.

use std::f32::consts::PI;

use indicatif::ProgressBar;
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

mod builder;
pub use builder::{ScanSimulatorBuilder, ScanSimulatorBuilderError};

use crate::{ContrastImage, Frame, FromBuilder, PhaseStepReductor, PhaseSteppingError, Result};

/// Circular sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Center column and row in pixels
    pub center: (f32, f32),
    /// Radius in pixels
    pub radius: f32,
    pub transmission: f32,
    /// Fringe phase shift in radians
    pub phase_shift: f32,
    /// Visibility reduction factor
    pub visibility: f32,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            center: (32., 32.),
            radius: 16.,
            transmission: 0.5,
            phase_shift: 0.5,
            visibility: 0.6,
        }
    }
}

impl Sample {
    /// Checks if the pixel at column `x` and row `y` is covered by the sample
    pub fn covers(&self, x: usize, y: usize) -> bool {
        let (cx, cy) = self.center;
        (x as f32 - cx).hypot(y as f32 - cy) <= self.radius
    }
}

/// Phase-stepping scan simulator
#[derive(Debug, Clone)]
pub struct ScanSimulator {
    builder: ScanSimulatorBuilder,
    rng: StdRng,
}

impl FromBuilder for ScanSimulator {
    type ComponentBuilder = ScanSimulatorBuilder;
}

impl ScanSimulator {
    #[inline]
    pub fn n_steps(&self) -> usize {
        self.builder.n_steps
    }
    /// Returns `(width, height)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.builder.width, self.builder.height)
    }
    pub fn sample(&self) -> Option<&Sample> {
        self.builder.sample.as_ref()
    }
    fn noise(&mut self) -> f32 {
        let noise = self.builder.noise;
        if noise > 0f32 {
            self.rng.gen_range(-noise..noise)
        } else {
            0f32
        }
    }
    fn frame(&mut self, step: usize, with_sample: bool) -> Frame {
        let ScanSimulatorBuilder {
            width,
            height,
            n_steps,
            harmonic,
            intensity,
            visibility,
            phase,
            dark,
            sample,
            ..
        } = self.builder.clone();
        let sample = sample.filter(|_| with_sample);
        let stepping = 2. * PI * (harmonic * step) as f32 / n_steps as f32 + phase;
        Frame::from_fn(width, height, |x, y| {
            let (t, vs, dphi) = match sample {
                Some(s) if s.covers(x, y) => (s.transmission, s.visibility, s.phase_shift),
                _ => (1f32, 1f32, 0f32),
            };
            dark + intensity * t * (1. + visibility * vs * (stepping + dphi).cos()) + self.noise()
        })
    }
    /// Returns a dark frame
    pub fn dark_frame(&mut self) -> Frame {
        let (width, height) = self.shape();
        let dark = self.builder.dark;
        Frame::from_fn(width, height, |_, _| dark + self.noise())
    }
    /// Returns the flat-field frame at phase step `step`
    pub fn flat_frame(&mut self, step: usize) -> Frame {
        self.frame(step, false)
    }
    /// Returns the projection frame at phase step `step`
    pub fn projection_frame(&mut self, step: usize) -> Frame {
        self.frame(step, true)
    }
}

/// Simulated acquisition run
///
/// Feeds a reductor with the dark, flat-field and projection frames of a simulated scan
#[derive(Debug)]
pub struct Acquisition {
    simulator: ScanSimulator,
    reductor: PhaseStepReductor,
}

impl Acquisition {
    /// Pairs a simulator and a reductor with the same number of phase steps
    pub fn new(simulator: ScanSimulator, reductor: PhaseStepReductor) -> Result<Self> {
        let n_steps = simulator.n_steps();
        if reductor.n_phase_steps() != n_steps || reductor.n_flat_steps() != n_steps {
            return Err(PhaseSteppingError::Config(format!(
                "the reductor expects {} flat-field and {} projection steps, the simulator makes {}",
                reductor.n_flat_steps(),
                reductor.n_phase_steps(),
                n_steps
            )));
        }
        Ok(Self {
            simulator,
            reductor,
        })
    }
    /// Number of frames of a complete run
    pub fn n_frame(&self) -> usize {
        self.reductor.n_dark_frames()
            + self.reductor.n_flat_steps()
            + self.reductor.n_phase_steps() * self.reductor.total_periods()
    }
    pub fn reductor(&self) -> &PhaseStepReductor {
        &self.reductor
    }
    pub fn simulator(&self) -> &ScanSimulator {
        &self.simulator
    }
    /// Runs the acquisition and returns the contrast images of all the projection periods
    pub fn run(&mut self, pb: Option<ProgressBar>) -> Result<Vec<ContrastImage>> {
        self.reductor.reset();
        let tick = |pb: &Option<ProgressBar>| {
            if let Some(pb) = pb {
                pb.inc(1)
            }
        };

        for _ in 0..self.reductor.n_dark_frames() {
            self.reductor.feed_dark(self.simulator.dark_frame())?;
            tick(&pb);
        }
        for step in 0..self.reductor.n_flat_steps() {
            self.reductor.feed_flat(self.simulator.flat_frame(step))?;
            tick(&pb);
        }

        let mut images = Vec::with_capacity(self.reductor.total_periods());
        while !self.reductor.is_done() {
            for step in 0..self.reductor.n_phase_steps() {
                self.reductor
                    .feed_projection(self.simulator.projection_frame(step))?;
                tick(&pb);
            }
            if let Some(image) = self.reductor.try_emit()? {
                images.push(image);
            }
        }
        if let Some(pb) = pb {
            pb.finish();
        }
        log::info!("acquisition of {} projections completed", images.len());
        Ok(images)
    }
}
