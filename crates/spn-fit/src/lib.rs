#![deny(missing_docs)]
#![doc = "Correlated chi-square fits over a plateau window: fit forms with an explicit parameter mapping, windowed bootstrap covariance, a bounded global optimiser and the central/per-draw fitting modes."]

/// Correlated chi-square problem and its two fitting modes.
pub mod chisquare;
/// Windowed data vectors and covariance inversion.
pub mod covariance;
/// Fit forms, parameter boxes and the channel to parameter mapping.
pub mod model;
/// Bounded differential evolution with a Nelder-Mead polish.
pub mod optimizer;
/// Plateau window validation.
pub mod window;

pub use chisquare::{
    minimize_chisquare, ChiSquareProblem, DrawAccounting, DrawFailure, DrawOutcome, Estimate,
    FitMode, FitOpts, FitResult,
};
pub use covariance::{InversionMethod, WindowedData};
pub use model::{ChannelModel, FitForm, FitSpec, ParameterSpec};
pub use optimizer::{minimize, Intensity, OptimOutcome, OptimizerSettings};
pub use window::PlateauWindow;
