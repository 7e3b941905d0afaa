use log::{error, info, warn};
use spn_boot::RawCorrelatorSet;
use spn_core::errors::SpnError;

use crate::config::AnalysisConfig;
use crate::plot::PlotSink;
use crate::process::{process_correlator, MesonOutcome};

/// Outcome of one channel in [`analyse_channels`].
#[derive(Debug)]
pub struct ChannelRun {
    /// Channel name.
    pub channel: String,
    /// Completed, waiting for a plateau, or failed.
    pub outcome: Result<MesonOutcome, SpnError>,
}

/// Processes every channel of `config` in name order.
///
/// A channel waiting for its plateau is logged as `INCOMPLETE` and does not
/// stop the loop; neither does a failing channel, whose error is kept in its
/// [`ChannelRun`].
pub fn analyse_channels(
    config: &AnalysisConfig,
    correlators: &[RawCorrelatorSet],
    sink: &mut dyn PlotSink,
) -> Vec<ChannelRun> {
    let mut runs = Vec::with_capacity(config.channels.len());
    for channel in config.channels.keys() {
        if config.verbosity.progress() {
            info!("mesons, {channel}");
        }
        let options = config.process_options(channel);
        let outcome = config
            .channel_spec(channel)
            .and_then(|spec| process_correlator(&spec, correlators, &options, &mut *sink));
        match &outcome {
            Ok(MesonOutcome::NeedsPlateau { message }) => warn!("INCOMPLETE: {message}"),
            Ok(MesonOutcome::Complete(_)) => {}
            Err(err) => error!("{channel}: {err}"),
        }
        runs.push(ChannelRun {
            channel: channel.clone(),
            outcome,
        });
    }
    runs
}
