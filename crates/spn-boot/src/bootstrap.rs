//! Bootstrap resampling of per-configuration correlators.
//!
//! Channels measured on the same gauge configurations are correlated with one
//! another. To keep that correlation in the resampled data every draw picks a
//! single list of configuration indices and applies it to all channels, so the
//! covariance estimated downstream sees cross-channel terms.

use log::debug;
use rand::Rng;
use serde::Serialize;
use spn_core::errors::{ErrorInfo, SpnError};
use spn_core::rng::RngHandle;

use crate::correlator::RawCorrelatorSet;
use crate::stats::ResampledStatistic;

/// Resampled draws of one channel and their reduction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDraws {
    /// Channel name copied from the input set.
    pub name: String,
    /// `B x NT` array: the configuration average of each draw.
    pub draws: Vec<Vec<f64>>,
    /// Mean and standard deviation over the draws per slice.
    pub statistic: ResampledStatistic,
}

impl ChannelDraws {
    /// Time extent of the channel.
    pub fn nt(&self) -> usize {
        self.statistic.len()
    }

    /// Bootstrap mean per slice.
    pub fn means(&self) -> &[f64] {
        &self.statistic.mean
    }

    /// Bootstrap standard error per slice.
    pub fn errors(&self) -> &[f64] {
        &self.statistic.error
    }
}

/// Bootstrap draws shared across a set of jointly analysed channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapEnsemble {
    /// Number of configurations N each draw picks.
    pub config_count: usize,
    /// Configuration indices picked by every draw (`B x N`).
    pub selections: Vec<Vec<usize>>,
    /// Per-channel draws, in input order.
    pub channels: Vec<ChannelDraws>,
}

impl BootstrapEnsemble {
    /// Number of draws B.
    pub fn draw_count(&self) -> usize {
        self.selections.len()
    }

    /// Looks a channel up by name.
    pub fn channel(&self, name: &str) -> Option<&ChannelDraws> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    /// Per-channel bootstrap means.
    pub fn means(&self) -> Vec<&[f64]> {
        self.channels.iter().map(ChannelDraws::means).collect()
    }

    /// Per-channel bootstrap errors.
    pub fn errors(&self) -> Vec<&[f64]> {
        self.channels.iter().map(ChannelDraws::errors).collect()
    }
}

/// Draws `samples` bootstrap replicas of every channel.
///
/// All sets must describe the same configurations, so they must agree on the
/// configuration count. Each draw takes N indices uniformly with replacement
/// and averages every channel over them.
pub fn resample<R: Rng + ?Sized>(
    sets: &[RawCorrelatorSet],
    samples: usize,
    rng: &mut R,
) -> Result<BootstrapEnsemble, SpnError> {
    let Some(first) = sets.first() else {
        return Err(SpnError::Data(ErrorInfo::new(
            "no-channels",
            "at least one correlator set is required for resampling",
        )));
    };
    if samples == 0 {
        return Err(SpnError::Data(ErrorInfo::new(
            "no-samples",
            "bootstrap sample count must be positive",
        )));
    }
    let config_count = first.config_count();
    if let Some(other) = sets.iter().find(|set| set.config_count() != config_count) {
        return Err(SpnError::Data(
            ErrorInfo::new(
                "config-count-mismatch",
                "channels resampled together must share their configurations",
            )
            .with_context("channel", first.name())
            .with_context("configurations", config_count)
            .with_context("other_channel", other.name())
            .with_context("other_configurations", other.config_count()),
        ));
    }

    let selections: Vec<Vec<usize>> = (0..samples)
        .map(|_| {
            (0..config_count)
                .map(|_| rng.gen_range(0..config_count))
                .collect()
        })
        .collect();

    let channels = sets
        .iter()
        .map(|set| {
            let draws: Vec<Vec<f64>> = selections
                .iter()
                .map(|picks| draw_average(set, picks))
                .collect();
            let statistic = ResampledStatistic::from_draws(&draws);
            ChannelDraws {
                name: set.name().to_string(),
                draws,
                statistic,
            }
        })
        .collect();

    debug!(
        "resampled {} channel(s): {} draws of {} configurations",
        sets.len(),
        samples,
        config_count
    );

    Ok(BootstrapEnsemble {
        config_count,
        selections,
        channels,
    })
}

/// Seeded convenience wrapper around [`resample`].
pub fn bootstrap_correlators(
    sets: &[RawCorrelatorSet],
    samples: usize,
    seed: u64,
) -> Result<BootstrapEnsemble, SpnError> {
    let mut rng = RngHandle::from_seed(seed);
    resample(sets, samples, &mut rng)
}

fn draw_average(set: &RawCorrelatorSet, picks: &[usize]) -> Vec<f64> {
    let configurations = set.configurations();
    let mut out = vec![0.0; set.nt()];
    for &pick in picks {
        for (acc, value) in out.iter_mut().zip(&configurations[pick]) {
            *acc += value;
        }
    }
    let count = picks.len() as f64;
    out.iter_mut().for_each(|value| *value /= count);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, rows: usize, nt: usize) -> RawCorrelatorSet {
        let configurations = (0..rows)
            .map(|row| (0..nt).map(|t| (row * nt + t) as f64).collect())
            .collect();
        RawCorrelatorSet::new(name, configurations).unwrap()
    }

    #[test]
    fn draws_match_selected_configurations() {
        let sets = [set("a", 5, 4), set("b", 5, 4)];
        let ensemble = bootstrap_correlators(&sets, 7, 11).unwrap();
        assert_eq!(ensemble.draw_count(), 7);
        for (b, picks) in ensemble.selections.iter().enumerate() {
            assert_eq!(picks.len(), 5);
            for channel in &ensemble.channels {
                let source = sets.iter().find(|s| s.name() == channel.name).unwrap();
                let expected = draw_average(source, picks);
                assert_eq!(channel.draws[b], expected);
            }
        }
    }

    #[test]
    fn mismatched_counts_fail() {
        let sets = [set("a", 5, 4), set("b", 6, 4)];
        let err = bootstrap_correlators(&sets, 3, 0).unwrap_err();
        assert_eq!(err.code(), "config-count-mismatch");
        assert_eq!(err.info().context["other_channel"], "b");
    }

    #[test]
    fn zero_samples_fail() {
        let err = bootstrap_correlators(&[set("a", 2, 2)], 0, 0).unwrap_err();
        assert_eq!(err.code(), "no-samples");
    }
}
