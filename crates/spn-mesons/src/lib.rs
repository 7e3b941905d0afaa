#![deny(missing_docs)]
#![doc = "Meson channel analysis on top of the bootstrap and fitting crates: channel descriptors and presets, YAML analysis configuration, the two-phase `process_correlator` workflow, plot payloads handed to a sink, and the delimited result records."]

/// Channel descriptors and built-in presets.
pub mod channel;
/// YAML analysis configuration.
pub mod config;
/// Multi-channel driver loop.
pub mod driver;
/// Output filename convention.
pub mod output;
/// Plot payloads and the sink they are handed to.
pub mod plot;
/// The two-phase per-channel workflow.
pub mod process;
/// Delimited result records and report hashing.
pub mod results;

pub use channel::{ChannelSpec, CorrelatorSpec};
pub use config::{AnalysisConfig, ChannelSettings};
pub use driver::{analyse_channels, ChannelRun};
pub use output::output_filename;
pub use plot::{
    CorrelatorPlot, EffectiveMassPlot, FittedCurve, JsonFileSink, MassBand, PlotPayload,
    PlotSink, RecordingSink,
};
pub use process::{process_correlator, MesonOutcome, MesonReport, ProcessOptions};
pub use results::{report_hash, write_results, write_results_to};
