//! Phase-stepping reduction state machine
//!
//! The reductor goes through the states:
//!
//! `AwaitingFlats -> FlatsCharacterized -> AccumulatingProjection(step) -> PeriodReady`
//!
//! and then loops back to `AccumulatingProjection(0)` until the last period is emitted,
//! where it ends in `Done`.
//!
//! The dark frames are fed first, then the flat-field frames and finally the projection frames.
//! The flat-field contrast image is computed once, when the last flat-field frame is received,
//! and it is used to correct the contrast images of all the projection periods.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

mod builder;
pub use builder::{ReductorBuilder, ReductorBuilderError};

use crate::{
    accumulation::DarkField, AccumulationStore, ContrastCorrector, ContrastImage, Frame,
    FromBuilder, HarmonicAnalyzer, PeriodDetector, PeriodIndex, PhaseSteppingError,
    PhaseWrapFilter, Result,
};

/// Kind of input frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Dark,
    Flat,
    Projection,
}

impl Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Dark => f.write_str("dark"),
            FrameKind::Flat => f.write_str("flat-field"),
            FrameKind::Projection => f.write_str("projection"),
        }
    }
}

/// Reductor states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductorState {
    /// Dark and flat-field frames are accumulated
    AwaitingFlats { received: usize },
    /// The flat-field contrast image is available
    FlatsCharacterized,
    /// Projection frames are accumulated, `step` is the next phase step
    AccumulatingProjection { step: usize },
    /// A full projection period is waiting to be emitted
    PeriodReady,
    /// All the projection periods have been emitted
    Done,
}

impl Display for ReductorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReductorState::AwaitingFlats { received } => {
                write!(f, "awaiting flat fields ({received} received)")
            }
            ReductorState::FlatsCharacterized => f.write_str("flat fields characterized"),
            ReductorState::AccumulatingProjection { step } => {
                write!(f, "accumulating projection phase step #{step}")
            }
            ReductorState::PeriodReady => f.write_str("projection period ready"),
            ReductorState::Done => f.write_str("done"),
        }
    }
}

/// Grating interferometry phase-stepping reductor
#[derive(Debug)]
pub struct PhaseStepReductor {
    n_phase_steps: usize,
    n_flat_steps: usize,
    n_dark_frames: usize,
    sanitize_nonfinite: bool,
    total_periods: usize,
    state: ReductorState,
    shape: Option<(usize, usize)>,
    dark: Option<DarkField>,
    flats: AccumulationStore,
    projections: AccumulationStore,
    period: Option<PeriodIndex>,
    flats_contrast: Option<ContrastImage>,
    periods_emitted: usize,
    analyzer: HarmonicAnalyzer,
    wrap: PhaseWrapFilter,
}

impl FromBuilder for PhaseStepReductor {
    type ComponentBuilder = ReductorBuilder;
}

impl Display for PhaseStepReductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Phase-stepping reductor ({} dark, {} flat steps, {} phase steps x {} periods):",
            self.n_dark_frames, self.n_flat_steps, self.n_phase_steps, self.total_periods
        )?;
        match self.shape {
            Some((width, height)) => writeln!(f, " * frame: {}x{}px", width, height)?,
            None => writeln!(f, " * frame: -")?,
        }
        match self.period {
            Some(period) => writeln!(f, " * grating harmonic: {}", period)?,
            None => writeln!(f, " * grating harmonic: -")?,
        }
        writeln!(
            f,
            " * state: {}, {}/{} periods emitted",
            self.state, self.periods_emitted, self.total_periods
        )
    }
}

impl PhaseStepReductor {
    #[inline]
    pub fn state(&self) -> ReductorState {
        self.state
    }
    /// Returns the frame `(width, height)` once the first frame is received
    #[inline]
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }
    /// Returns the grating harmonic index once the flat fields are characterized
    #[inline]
    pub fn period_index(&self) -> Option<PeriodIndex> {
        self.period
    }
    /// Returns the flat-field contrast image once the flat fields are characterized
    pub fn flats_contrast(&self) -> Option<&ContrastImage> {
        self.flats_contrast.as_ref()
    }
    /// Returns the averaged dark field once all the dark frames are received
    pub fn dark_field(&self) -> Option<&Frame> {
        self.dark.as_ref().and_then(|dark| dark.frame())
    }
    #[inline]
    pub fn is_dark_field_ready(&self) -> bool {
        self.dark_field().is_some()
    }
    #[inline]
    pub fn periods_emitted(&self) -> usize {
        self.periods_emitted
    }
    #[inline]
    pub fn total_periods(&self) -> usize {
        self.total_periods
    }
    #[inline]
    pub fn n_phase_steps(&self) -> usize {
        self.n_phase_steps
    }
    #[inline]
    pub fn n_flat_steps(&self) -> usize {
        self.n_flat_steps
    }
    #[inline]
    pub fn n_dark_frames(&self) -> usize {
        self.n_dark_frames
    }
    /// Checks if a projection period is waiting to be emitted
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == ReductorState::PeriodReady
    }
    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == ReductorState::Done
    }
    /// Discards all the frames and cached images and goes back to the initial state
    pub fn reset(&mut self) -> &mut Self {
        self.state = ReductorState::AwaitingFlats { received: 0 };
        self.shape = None;
        self.dark = None;
        self.flats = AccumulationStore::default();
        self.projections = AccumulationStore::default();
        self.period = None;
        self.flats_contrast = None;
        self.periods_emitted = 0;
        self
    }

    fn unexpected(&self, kind: FrameKind) -> PhaseSteppingError {
        PhaseSteppingError::UnexpectedFrame {
            kind,
            state: self.state.to_string(),
        }
    }
    fn check(&self, kind: FrameKind, frame: &Frame) -> Result<()> {
        if self.state == ReductorState::Done {
            return Err(PhaseSteppingError::SequenceExhausted(self.total_periods));
        }
        if frame.is_empty() {
            return Err(PhaseSteppingError::InvalidFrame {
                len: 0,
                width: frame.width(),
                height: frame.height(),
            });
        }
        match self.shape {
            Some(expected) if expected != frame.shape() => {
                Err(PhaseSteppingError::ShapeMismatch {
                    expected,
                    found: frame.shape(),
                })
            }
            _ => {
                log::debug!("{} {}", kind, frame);
                Ok(())
            }
        }
    }
    /// Sets the run frame shape from the first accepted frame
    fn establish(&mut self, frame: &Frame) {
        if self.shape.is_none() {
            let (width, height) = frame.shape();
            self.shape = Some((width, height));
            self.dark = Some(DarkField::new(self.n_dark_frames, width, height));
            self.flats = AccumulationStore::new(self.n_flat_steps, width, height);
            self.projections = AccumulationStore::new(self.n_phase_steps, width, height);
        }
    }
    fn missing_dark_field(&self) -> PhaseSteppingError {
        PhaseSteppingError::MissingDarkField {
            expected: self.n_dark_frames,
            received: self.dark.as_ref().map_or(0, |dark| dark.n_frame()),
        }
    }

    /// Adds a dark frame to the dark field
    pub fn feed_dark(&mut self, frame: Frame) -> Result<&mut Self> {
        self.check(FrameKind::Dark, &frame)?;
        if self.state != (ReductorState::AwaitingFlats { received: 0 }) || self.is_dark_field_ready()
        {
            return Err(self.unexpected(FrameKind::Dark));
        }
        self.establish(&frame);
        if let Some(dark) = self.dark.as_mut() {
            dark.add(&frame)?;
            if dark.is_ready() {
                log::info!("dark field averaged over {} frames", dark.n_frame());
            }
        }
        Ok(self)
    }

    /// Adds a dark-subtracted flat-field frame
    ///
    /// The flat fields are characterized with the last flat-field frame
    pub fn feed_flat(&mut self, frame: Frame) -> Result<&mut Self> {
        self.check(FrameKind::Flat, &frame)?;
        let ReductorState::AwaitingFlats { received } = self.state else {
            return Err(self.unexpected(FrameKind::Flat));
        };
        let Some(dark) = self.dark.as_ref().and_then(|dark| dark.frame()) else {
            return Err(self.missing_dark_field());
        };
        self.flats
            .write_step(received, &frame, dark, self.sanitize_nonfinite)?;
        self.state = ReductorState::AwaitingFlats {
            received: received + 1,
        };
        if self.flats.is_complete() {
            self.characterize_flats()?;
        }
        Ok(self)
    }

    /// Computes the flat-field contrast image
    ///
    /// The grating harmonic is detected from the mean flat-field phase-stepping curve.
    /// The flat fields are characterized only once, subsequent calls return the cached image.
    pub fn characterize_flats(&mut self) -> Result<&ContrastImage> {
        if self.flats_contrast.is_none() {
            if !self.flats.is_complete() || self.shape.is_none() {
                return Err(PhaseSteppingError::IncompleteFlats {
                    expected: self.n_flat_steps,
                    received: self.flats.n_written(),
                });
            }
            let stack = self.flats.stack();
            let period = PeriodDetector::detect(&stack.mean_per_step());
            let contrast = self.analyzer.analyze(&stack.transpose(), period)?;
            log::info!(
                "flat fields characterized with grating harmonic {} of {} steps",
                period,
                self.n_flat_steps
            );
            self.period = Some(period);
            self.flats_contrast = Some(contrast);
            self.state = ReductorState::FlatsCharacterized;
        }
        self.flats_contrast
            .as_ref()
            .ok_or(PhaseSteppingError::IncompleteFlats {
                expected: self.n_flat_steps,
                received: self.flats.n_written(),
            })
    }

    /// Adds a dark-subtracted projection frame at the next phase step
    pub fn feed_projection(&mut self, frame: Frame) -> Result<&mut Self> {
        self.check(FrameKind::Projection, &frame)?;
        let step = match self.state {
            ReductorState::FlatsCharacterized => 0,
            ReductorState::AccumulatingProjection { step } => step,
            _ => return Err(self.unexpected(FrameKind::Projection)),
        };
        let Some(dark) = self.dark.as_ref().and_then(|dark| dark.frame()) else {
            return Err(self.missing_dark_field());
        };
        self.projections
            .write_step(step, &frame, dark, self.sanitize_nonfinite)?;
        self.state = if step + 1 == self.n_phase_steps {
            ReductorState::PeriodReady
        } else {
            ReductorState::AccumulatingProjection { step: step + 1 }
        };
        Ok(self)
    }

    /// Returns the corrected contrast image of the last projection period if it is complete
    pub fn try_emit(&mut self) -> Result<Option<ContrastImage>> {
        if self.state != ReductorState::PeriodReady {
            return Ok(None);
        }
        let (Some(flats), Some(period)) = (self.flats_contrast.as_ref(), self.period) else {
            return Err(PhaseSteppingError::IncompleteFlats {
                expected: self.n_flat_steps,
                received: self.flats.n_written(),
            });
        };
        let proj = self
            .analyzer
            .analyze(&self.projections.stack().transpose(), period)?;
        let mut contrast = ContrastCorrector::correct(flats, &proj)?;
        let median = self.wrap.filter(&mut contrast);

        self.periods_emitted += 1;
        log::info!(
            "projection period #{} emitted (DPC median: {:+.3}rd)",
            self.periods_emitted,
            median
        );
        let (width, height) = contrast.shape();
        self.projections.reset(self.n_phase_steps, width, height);
        self.state = if self.periods_emitted == self.total_periods {
            log::info!("all the {} projection periods are emitted", self.total_periods);
            ReductorState::Done
        } else {
            ReductorState::AccumulatingProjection { step: 0 }
        };
        Ok(Some(contrast))
    }
}
