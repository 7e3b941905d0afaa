#![deny(missing_docs)]
#![doc = "Correlator preparation and bootstrap statistics: configuration thinning, time-reversal folding, bootstrap resampling shared across channels, the effective-mass transform applied per draw, and gradient-flow scales."]

/// Bootstrap resampling across jointly analysed channels.
pub mod bootstrap;
/// Per-configuration correlator sets, thinning and symmetrisation.
pub mod correlator;
/// Effective-mass root finding and its bootstrap reduction.
pub mod effmass;
/// Gradient-flow scales `w0` and `sqrt(8 t0)`.
pub mod flow;
/// Mean and spread reductions over resampled draws.
pub mod stats;

pub use bootstrap::{bootstrap_correlators, resample, BootstrapEnsemble, ChannelDraws};
pub use correlator::{symmetrize, ConfigurationSelection, RawCorrelatorSet, Symmetry};
pub use effmass::{bootstrap_eff_masses, effective_mass, effective_mass_at, EffectiveMass};
pub use flow::{
    bootstrap_flow_scales, flow_scale, FlowHistory, FlowReferences, FlowScale, FlowScaleEstimate,
};
pub use stats::ResampledStatistic;
