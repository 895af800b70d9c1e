use crate::{FrameKind, ReductorBuilderError, ScanSimulatorBuilderError};

#[derive(Debug, thiserror::Error)]
pub enum PhaseSteppingError {
    #[error("frame shape {found:?} does not match the run frame shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("step index {index} is out of range [0,{n_steps})")]
    OutOfRange { index: usize, n_steps: usize },
    #[error(
        "grating harmonic #{index} is not within [1,{}] for {n_steps} phase steps",
        (.n_steps / 2).max(1)
    )]
    InvalidPeriod { index: usize, n_steps: usize },
    #[error("all the {0} phase-stepping periods have already been emitted")]
    SequenceExhausted(usize),
    #[error("cannot accept a {kind} frame while {state}")]
    UnexpectedFrame { kind: FrameKind, state: String },
    #[error("the dark field is not ready: {received}/{expected} dark frames received")]
    MissingDarkField { expected: usize, received: usize },
    #[error("cannot characterize the flat fields: {received}/{expected} flat frames received")]
    IncompleteFlats { expected: usize, received: usize },
    #[error("{len} samples cannot make a {width}x{height} frame")]
    InvalidFrame {
        len: usize,
        width: usize,
        height: usize,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("cannot build `::phase_stepping::PhaseStepReductor`")]
    Builder(#[from] ReductorBuilderError),
    #[error("cannot build `::phase_stepping::ScanSimulator`")]
    SimulatorBuilder(#[from] ScanSimulatorBuilderError),
}
