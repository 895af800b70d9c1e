use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    AccumulationStore, Builder, HarmonicAnalyzer, PhaseStepReductor, PhaseSteppingError,
    PhaseWrapFilter,
};

use super::ReductorState;

/// [`PhaseStepReductor`] builder
///
/// Default properties:
///  * phase steps per projection period : 4
///  * flat-field phase steps            : 4
///  * dark frames                       : 1
///  * non-finite samples sanitization   : on
///  * projection periods                : 1
///
/// # Examples
///
/// ```
/// use phase_stepping::{Builder, FromBuilder, PhaseStepReductor};
/// let reductor = PhaseStepReductor::builder()
///     .n_phase_steps(8)
///     .n_flat_steps(8)
///     .total_periods(180)
///     .build()?;
/// # Ok::<(), phase_stepping::PhaseSteppingError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductorBuilder {
    pub n_phase_steps: usize,
    pub n_flat_steps: usize,
    pub n_dark_frames: usize,
    pub sanitize_nonfinite: bool,
    pub total_periods: usize,
}

impl Default for ReductorBuilder {
    fn default() -> Self {
        Self {
            n_phase_steps: 4,
            n_flat_steps: 4,
            n_dark_frames: 1,
            sanitize_nonfinite: true,
            total_periods: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReductorBuilderError {
    #[error("cannot open `::phase_stepping::ReductorBuilder` toml file: {1}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("cannot create `::phase_stepping::ReductorBuilder` toml file: {1}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("cannot read `::phase_stepping::ReductorBuilder` toml file: {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write `::phase_stepping::ReductorBuilder` toml file: {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("cannot deserialize `::phase_stepping::ReductorBuilder` from toml")]
    Load(#[from] toml::de::Error),
    #[error("cannot serialize `::phase_stepping::ReductorBuilder` into toml")]
    Save(#[from] toml::ser::Error),
}

impl ReductorBuilder {
    /// Loads the reductor builder from a toml file
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ReductorBuilderError> {
        let mut file = File::open(&path)
            .map_err(|e| ReductorBuilderError::Open(e, path.as_ref().to_path_buf()))?;
        let mut toml = String::new();
        file.read_to_string(&mut toml)
            .map_err(|e| ReductorBuilderError::Read(e, path.as_ref().to_path_buf()))?;
        let builder: ReductorBuilder = toml::from_str(&toml)?;
        Ok(builder)
    }
    /// Saves the reductor builder into a toml file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), ReductorBuilderError> {
        let toml = toml::to_string_pretty(self)?;
        let mut file = File::create(&path)
            .map_err(|e| ReductorBuilderError::Create(e, path.as_ref().to_path_buf()))?;
        write!(file, "# ::phase_stepping::ReductorBuilder\n\n{}", toml)
            .map_err(|e| ReductorBuilderError::Write(e, path.as_ref().to_path_buf()))?;
        Ok(())
    }
    /// Sets the number of phase steps of a projection period
    pub fn n_phase_steps(mut self, n_phase_steps: usize) -> Self {
        self.n_phase_steps = n_phase_steps;
        self
    }
    /// Sets the number of phase steps of the flat-field scan
    pub fn n_flat_steps(mut self, n_flat_steps: usize) -> Self {
        self.n_flat_steps = n_flat_steps;
        self
    }
    /// Sets the number of dark frames that are averaged into the dark field
    pub fn n_dark_frames(mut self, n_dark_frames: usize) -> Self {
        self.n_dark_frames = n_dark_frames;
        self
    }
    /// Replaces (or not) NaN and infinite samples with 0
    pub fn sanitize_nonfinite(mut self, sanitize_nonfinite: bool) -> Self {
        self.sanitize_nonfinite = sanitize_nonfinite;
        self
    }
    /// Sets the number of projection periods of the run
    pub fn total_periods(mut self, total_periods: usize) -> Self {
        self.total_periods = total_periods;
        self
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if self.n_phase_steps < 2 {
            return Err(format!(
                "at least 2 phase steps are required, found {}",
                self.n_phase_steps
            ));
        }
        if self.n_flat_steps < 1 {
            return Err("at least 1 flat-field phase step is required".into());
        }
        if self.n_dark_frames < 1 {
            return Err("at least 1 dark frame is required".into());
        }
        if self.total_periods < 1 {
            return Err("at least 1 projection period is required".into());
        }
        if self.n_flat_steps / 2 >= self.n_phase_steps {
            return Err(format!(
                "grating harmonics of {} flat-field steps may not fit within {} phase steps",
                self.n_flat_steps, self.n_phase_steps
            ));
        }
        Ok(())
    }
}

impl Builder for ReductorBuilder {
    type Component = PhaseStepReductor;

    fn build(self) -> crate::Result<Self::Component> {
        self.validate().map_err(PhaseSteppingError::Config)?;
        let Self {
            n_phase_steps,
            n_flat_steps,
            n_dark_frames,
            sanitize_nonfinite,
            total_periods,
        } = self;
        log::debug!(
            "phase-stepping reductor: {} flat steps, {} phase steps x {} periods",
            n_flat_steps,
            n_phase_steps,
            total_periods
        );
        Ok(PhaseStepReductor {
            n_phase_steps,
            n_flat_steps,
            n_dark_frames,
            sanitize_nonfinite,
            total_periods,
            state: ReductorState::AwaitingFlats { received: 0 },
            shape: None,
            dark: None,
            flats: AccumulationStore::default(),
            projections: AccumulationStore::default(),
            period: None,
            flats_contrast: None,
            periods_emitted: 0,
            analyzer: HarmonicAnalyzer::new(),
            wrap: PhaseWrapFilter::new(sanitize_nonfinite),
        })
    }
}

impl From<&PhaseStepReductor> for ReductorBuilder {
    fn from(reductor: &PhaseStepReductor) -> Self {
        Self {
            n_phase_steps: reductor.n_phase_steps,
            n_flat_steps: reductor.n_flat_steps,
            n_dark_frames: reductor.n_dark_frames,
            sanitize_nonfinite: reductor.sanitize_nonfinite,
            total_periods: reductor.total_periods,
        }
    }
}
