//! Gradient-flow reference scales.
//!
//! Each configuration carries the action density `E(t)` measured along the
//! Wilson flow, usually once per discretisation (plaquette and clover). Two
//! scales are read off the flowed data:
//!
//! * `t0` solves `t^2 <E(t)> = E0` and is reported as `sqrt(8 t0)`;
//! * `w0` solves `W(t) = t d/dt (t^2 <E(t)>) = W0` at `t = w0^2`.
//!
//! Crossings are located on the sampled flow times by linear interpolation.
//! `W` is a finite difference, so it lives on the midpoints of neighbouring
//! flow times. Every discretisation shares the bootstrap selections, as the
//! correlator channels do.

use log::debug;
use serde::{Deserialize, Serialize};
use spn_core::errors::{ErrorInfo, SpnError};

use crate::bootstrap::bootstrap_correlators;
use crate::correlator::{ConfigurationSelection, RawCorrelatorSet};
use crate::stats::mean_and_error;

/// Default reference value for both `E0` and `W0`.
pub const DEFAULT_FLOW_REFERENCE: f64 = 0.35;

/// Which flow scale to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowScale {
    /// `sqrt(8 t0)` from `t^2 E(t) = E0`.
    T0,
    /// `w0` from `t d/dt (t^2 E(t)) = W0`.
    W0,
}

impl FlowScale {
    /// Label used in result headers.
    pub fn label(&self) -> &'static str {
        match self {
            FlowScale::T0 => "sqrt_8t0",
            FlowScale::W0 => "w0",
        }
    }
}

/// Reference values the flowed observables are matched to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowReferences {
    /// Target of `t^2 E(t)`.
    pub e0: f64,
    /// Target of `t d/dt (t^2 E(t))`.
    pub w0: f64,
}

impl Default for FlowReferences {
    fn default() -> Self {
        Self {
            e0: DEFAULT_FLOW_REFERENCE,
            w0: DEFAULT_FLOW_REFERENCE,
        }
    }
}

impl FlowReferences {
    fn for_scale(&self, scale: FlowScale) -> f64 {
        match scale {
            FlowScale::T0 => self.e0,
            FlowScale::W0 => self.w0,
        }
    }
}

/// Flow times and the per-configuration `E(t)` of every discretisation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowHistory {
    times: Vec<f64>,
    energies: Vec<RawCorrelatorSet>,
}

impl FlowHistory {
    /// Checks that flow times are finite, non-negative and strictly
    /// increasing, and that every energy set is sampled on those times.
    pub fn new(times: Vec<f64>, energies: Vec<RawCorrelatorSet>) -> Result<Self, SpnError> {
        if times.len() < 2 {
            return Err(SpnError::Data(
                ErrorInfo::new("short-flow", "flow histories need at least two flow times")
                    .with_context("times", times.len()),
            ));
        }
        if let Some(index) = times
            .iter()
            .position(|t| !t.is_finite() || *t < 0.0)
            .or_else(|| times.windows(2).position(|pair| pair[1] <= pair[0]).map(|i| i + 1))
        {
            return Err(SpnError::Data(
                ErrorInfo::new(
                    "bad-flow-times",
                    "flow times must be finite, non-negative and strictly increasing",
                )
                .with_context("index", index)
                .with_context("time", times[index]),
            ));
        }
        if energies.is_empty() {
            return Err(SpnError::Data(ErrorInfo::new(
                "empty-flow",
                "flow history has no energy observables",
            )));
        }
        for set in &energies {
            if set.nt() != times.len() {
                return Err(SpnError::Data(
                    ErrorInfo::new(
                        "flow-length-mismatch",
                        "energy rows must have one entry per flow time",
                    )
                    .with_context("observable", set.name())
                    .with_context("expected", times.len())
                    .with_context("found", set.nt()),
                ));
            }
        }
        Ok(Self { times, energies })
    }

    /// Flow times.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Energy observables in input order.
    pub fn energies(&self) -> &[RawCorrelatorSet] {
        &self.energies
    }

    /// Keeps only the configurations picked by `selection` in every observable.
    pub fn thinned(&self, selection: &ConfigurationSelection) -> Result<Self, SpnError> {
        let energies = self
            .energies
            .iter()
            .map(|set| set.thinned(selection))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            times: self.times.clone(),
            energies,
        })
    }
}

/// Bootstrap estimate of one scale from one energy observable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowScaleEstimate {
    /// Energy observable the scale was read from.
    pub observable: String,
    /// Scale kind.
    pub scale: FlowScale,
    /// Reference value the crossing was matched to.
    pub reference: f64,
    /// Scale from the bootstrap mean of `E(t)`.
    pub value: f64,
    /// Standard deviation of the scale over draws where it is defined.
    pub error: f64,
    /// Draws whose flow range reaches the reference.
    pub defined_draws: usize,
    /// Total number of draws.
    pub draw_count: usize,
}

/// First flow time where `values` rises through `reference`; NaN if it never
/// does on the sampled range.
fn first_crossing(times: &[f64], values: &[f64], reference: f64) -> f64 {
    for (t, f) in times.windows(2).zip(values.windows(2)) {
        if !(f[0].is_finite() && f[1].is_finite()) {
            continue;
        }
        if f[0] == reference {
            return t[0];
        }
        if f[0] < reference && reference <= f[1] {
            return t[0] + (reference - f[0]) * (t[1] - t[0]) / (f[1] - f[0]);
        }
    }
    f64::NAN
}

/// Scale from one mean `E(t)` series.
pub fn flow_scale(times: &[f64], energy: &[f64], scale: FlowScale, reference: f64) -> f64 {
    let flowed: Vec<f64> = times
        .iter()
        .zip(energy)
        .map(|(t, e)| t * t * e)
        .collect();
    match scale {
        FlowScale::T0 => (8.0 * first_crossing(times, &flowed, reference)).sqrt(),
        FlowScale::W0 => {
            let midpoints: Vec<f64> = times.windows(2).map(|t| 0.5 * (t[0] + t[1])).collect();
            let derivative: Vec<f64> = times
                .windows(2)
                .zip(flowed.windows(2))
                .zip(&midpoints)
                .map(|((t, f), mid)| mid * (f[1] - f[0]) / (t[1] - t[0]))
                .collect();
            first_crossing(&midpoints, &derivative, reference).sqrt()
        }
    }
}

/// Resamples the history once and reads both scales from every observable.
///
/// The central value comes from the bootstrap mean of `E(t)`; the error is the
/// spread over draws. A scale the mean never reaches is an error, since the
/// flow range is too short for the chosen reference.
pub fn bootstrap_flow_scales(
    history: &FlowHistory,
    references: FlowReferences,
    samples: usize,
    seed: u64,
) -> Result<Vec<FlowScaleEstimate>, SpnError> {
    let ensemble = bootstrap_correlators(&history.energies, samples, seed)?;
    let times = history.times();
    let mut estimates = Vec::with_capacity(2 * ensemble.channels.len());
    for channel in &ensemble.channels {
        for scale in [FlowScale::W0, FlowScale::T0] {
            let reference = references.for_scale(scale);
            let value = flow_scale(times, channel.means(), scale, reference);
            if !value.is_finite() {
                return Err(SpnError::Data(
                    ErrorInfo::new(
                        "flow-scale-not-reached",
                        "flowed energy never reaches the reference value",
                    )
                    .with_context("observable", &channel.name)
                    .with_context("scale", scale.label())
                    .with_context("reference", reference)
                    .with_hint("extend the flow time range or lower the reference"),
                ));
            }
            let per_draw: Vec<f64> = channel
                .draws
                .iter()
                .map(|draw| flow_scale(times, draw, scale, reference))
                .filter(|v| v.is_finite())
                .collect();
            let (_, error) = mean_and_error(&per_draw);
            debug!(
                "{} {} = {} +/- {} ({} of {} draws)",
                channel.name,
                scale.label(),
                value,
                error,
                per_draw.len(),
                ensemble.draw_count()
            );
            estimates.push(FlowScaleEstimate {
                observable: channel.name.clone(),
                scale,
                reference,
                value,
                error,
                defined_draws: per_draw.len(),
                draw_count: ensemble.draw_count(),
            });
        }
    }
    Ok(estimates)
}
