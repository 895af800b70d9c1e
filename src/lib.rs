//!
//! # Talbot-Lau phase-stepping reduction
//!
//! The crate turns the raw detector frames of a grating interferometry phase-stepping scan
//! into the three contrast images of a projection:
//!  * the differential phase contrast (DPC),
//!  * the absorption (ASP),
//!  * the dark-field or visibility (DFI).
//!
//! A [`PhaseStepReductor`] is created with its builder and then fed, in that order,
//! the dark frames, the flat-field frames and the projection frames.
//! Every time a full phase-stepping period of projection frames has been received,
//! a corrected [`ContrastImage`] can be pulled out of the reductor.
//!
//! ```
//! use phase_stepping::{Builder, FromBuilder, Frame, PhaseStepReductor};
//!
//! let mut reductor = PhaseStepReductor::builder()
//!     .n_phase_steps(4)
//!     .n_flat_steps(4)
//!     .build()?;
//! reductor.feed_dark(Frame::zeros(8, 8))?;
//! for value in [10f32, 12., 10., 8.] {
//!     reductor.feed_flat(Frame::constant(8, 8, value))?;
//! }
//! for value in [10f32, 12., 10., 8.] {
//!     reductor.feed_projection(Frame::constant(8, 8, value))?;
//! }
//! let contrast = reductor.try_emit()?.unwrap();
//! assert!(contrast.asp().iter().all(|x| (x - 1.).abs() < 1e-5));
//! # Ok::<(), phase_stepping::PhaseSteppingError>(())
//! ```

pub mod accumulation;
pub mod contrast;
pub mod error;
pub mod frame;
pub mod harmonic;
pub mod phase_wrap;
pub mod reductor;
pub mod simulation;
pub mod sinogram;
pub mod strides;

#[doc(inline)]
pub use self::accumulation::AccumulationStore;
#[doc(inline)]
pub use self::contrast::{Channel, ContrastCorrector, ContrastImage};
#[doc(inline)]
pub use self::error::PhaseSteppingError;
#[doc(inline)]
pub use self::frame::{Frame, FrameBuffer, PhaseStack, TransposedStack};
#[doc(inline)]
pub use self::harmonic::{HarmonicAnalyzer, PeriodDetector, PeriodIndex};
#[doc(inline)]
pub use self::phase_wrap::PhaseWrapFilter;
#[doc(inline)]
pub use self::reductor::{
    FrameKind, PhaseStepReductor, ReductorBuilder, ReductorBuilderError, ReductorState,
};
#[doc(inline)]
pub use self::simulation::{
    Acquisition, Sample, ScanSimulator, ScanSimulatorBuilder, ScanSimulatorBuilderError,
};
#[doc(inline)]
pub use self::sinogram::SinogramGenerator;
#[doc(inline)]
pub use self::strides::Strides;

pub type Result<T> = std::result::Result<T, PhaseSteppingError>;

/// Component builder trait
pub trait Builder: Default {
    type Component;
    fn new() -> Self {
        Default::default()
    }
    fn build(self) -> Result<Self::Component>;
}

/// Gives access to the builder of a component
pub trait FromBuilder: Sized {
    type ComponentBuilder: Builder<Component = Self>;
    fn builder() -> Self::ComponentBuilder {
        Self::ComponentBuilder::new()
    }
}
