use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{Builder, PhaseSteppingError};

use super::{Sample, ScanSimulator};

/// [`ScanSimulator`] builder
///
/// Default properties:
///  * detector          : 64x64px
///  * phase steps       : 4
///  * grating harmonic  : 1
///  * mean intensity    : 1000
///  * grating visibility: 0.3
///  * grating phase     : 0rd
///  * dark level        : 100
///  * noise amplitude   : 0
///  * seed              : 0
///  * sample            : none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSimulatorBuilder {
    pub width: usize,
    pub height: usize,
    pub n_steps: usize,
    pub harmonic: usize,
    pub intensity: f32,
    pub visibility: f32,
    pub phase: f32,
    pub dark: f32,
    pub noise: f32,
    pub seed: u64,
    pub sample: Option<Sample>,
}

impl Default for ScanSimulatorBuilder {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            n_steps: 4,
            harmonic: 1,
            intensity: 1000.,
            visibility: 0.3,
            phase: 0.,
            dark: 100.,
            noise: 0.,
            seed: 0,
            sample: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanSimulatorBuilderError {
    #[error("cannot open `::phase_stepping::ScanSimulatorBuilder` toml file: {1}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("cannot create `::phase_stepping::ScanSimulatorBuilder` toml file: {1}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("cannot read `::phase_stepping::ScanSimulatorBuilder` toml file: {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write `::phase_stepping::ScanSimulatorBuilder` toml file: {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("cannot deserialize `::phase_stepping::ScanSimulatorBuilder` from toml")]
    Load(#[from] toml::de::Error),
    #[error("cannot serialize `::phase_stepping::ScanSimulatorBuilder` into toml")]
    Save(#[from] toml::ser::Error),
}

impl ScanSimulatorBuilder {
    /// Loads the simulator builder from a toml file
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ScanSimulatorBuilderError> {
        let mut file = File::open(&path)
            .map_err(|e| ScanSimulatorBuilderError::Open(e, path.as_ref().to_path_buf()))?;
        let mut toml = String::new();
        file.read_to_string(&mut toml)
            .map_err(|e| ScanSimulatorBuilderError::Read(e, path.as_ref().to_path_buf()))?;
        Ok(toml::from_str(&toml)?)
    }
    /// Saves the simulator builder into a toml file
    pub fn save<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> std::result::Result<(), ScanSimulatorBuilderError> {
        let toml = toml::to_string_pretty(self)?;
        let mut file = File::create(&path)
            .map_err(|e| ScanSimulatorBuilderError::Create(e, path.as_ref().to_path_buf()))?;
        write!(file, "# ::phase_stepping::ScanSimulatorBuilder\n\n{}", toml)
            .map_err(|e| ScanSimulatorBuilderError::Write(e, path.as_ref().to_path_buf()))?;
        Ok(())
    }
    /// Sets the detector size in pixels
    pub fn detector(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }
    /// Sets the number of phase steps per grating period scan
    pub fn n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }
    /// Sets the number of fringe periods swept over a scan
    pub fn harmonic(mut self, harmonic: usize) -> Self {
        self.harmonic = harmonic;
        self
    }
    pub fn intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }
    /// Sets the grating visibility within `[0,1]`
    pub fn visibility(mut self, visibility: f32) -> Self {
        self.visibility = visibility;
        self
    }
    /// Sets the grating phase offset in radians
    pub fn phase(mut self, phase: f32) -> Self {
        self.phase = phase;
        self
    }
    pub fn dark(mut self, dark: f32) -> Self {
        self.dark = dark;
        self
    }
    /// Sets the amplitude of the uniform detector noise
    pub fn noise(mut self, noise: f32, seed: u64) -> Self {
        self.noise = noise;
        self.seed = seed;
        self
    }
    pub fn sample(mut self, sample: Sample) -> Self {
        self.sample = Some(sample);
        self
    }
}

impl Builder for ScanSimulatorBuilder {
    type Component = ScanSimulator;

    fn build(self) -> crate::Result<Self::Component> {
        if self.width == 0 || self.height == 0 {
            return Err(PhaseSteppingError::Config(format!(
                "empty {}x{} detector",
                self.width, self.height
            )));
        }
        if self.n_steps == 0 {
            return Err(PhaseSteppingError::Config(
                "at least 1 phase step is required".into(),
            ));
        }
        if self.harmonic == 0 || self.harmonic > self.n_steps / 2 {
            return Err(PhaseSteppingError::Config(format!(
                "harmonic {} cannot be sampled with {} phase steps",
                self.harmonic, self.n_steps
            )));
        }
        if !(0f32..=1f32).contains(&self.visibility) {
            return Err(PhaseSteppingError::Config(format!(
                "grating visibility {} is not within [0,1]",
                self.visibility
            )));
        }
        if self.noise < 0f32 {
            return Err(PhaseSteppingError::Config(format!(
                "negative noise amplitude {}",
                self.noise
            )));
        }
        let rng = StdRng::seed_from_u64(self.seed);
        Ok(ScanSimulator { builder: self, rng })
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn validation() {
        assert!(ScanSimulatorBuilder::default().build().is_ok());
        for builder in [
            ScanSimulatorBuilder::default().detector(0, 8),
            ScanSimulatorBuilder::default().n_steps(0),
            ScanSimulatorBuilder::default().harmonic(3),
            ScanSimulatorBuilder::default().visibility(1.5),
            ScanSimulatorBuilder::default().noise(-1., 0),
        ] {
            assert!(matches!(builder.build(), Err(PhaseSteppingError::Config(_))));
        }
    }

    #[test]
    fn toml() -> Result<(), Box<dyn Error>> {
        let builder = ScanSimulatorBuilder::default()
            .detector(16, 8)
            .n_steps(8)
            .harmonic(2)
            .noise(5., 123)
            .sample(Sample::default());
        let path = std::env::temp_dir().join(format!("simulator-{}.toml", std::process::id()));
        builder.save(&path)?;
        let loaded = ScanSimulatorBuilder::load(&path)?;
        std::fs::remove_file(&path)?;
        assert_eq!(builder, loaded);
        Ok(())
    }
}
