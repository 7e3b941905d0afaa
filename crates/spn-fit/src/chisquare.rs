//! Correlated chi-square fits of one or more channels sharing parameters.
//!
//! The cost is `(D - M(p))^T S^-1 (D - M(p))` with `D` the windowed data,
//! `M(p)` the fit forms evaluated over the same points and `S` the bootstrap
//! covariance. A [`FitMode::Central`] fit minimises it once against the
//! bootstrap means and gives the values used for display. A
//! [`FitMode::Resampled`] fit minimises it independently for every draw (same
//! `S`, same window) on a worker pool and reports the spread over draws as
//! the error.

use log::{debug, info, warn};
use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use spn_boot::stats::mean_and_error;
use spn_boot::{BootstrapEnsemble, ChannelDraws};
use spn_core::errors::{ErrorInfo, SpnError};
use spn_core::provenance::Verbosity;
use spn_core::rng::RngHandle;

use crate::covariance::{InversionMethod, WindowedData};
use crate::model::FitSpec;
use crate::optimizer::{minimize, Intensity};
use crate::window::PlateauWindow;

fn default_max_failed_fraction() -> f64 {
    0.1
}

/// Which data vector the cost is minimised against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// One fit against the bootstrap means.
    Central,
    /// One fit per bootstrap draw.
    Resampled,
}

impl FitMode {
    /// Maps the `fit_means` switch onto a mode.
    pub fn from_fit_means(fit_means: bool) -> Self {
        if fit_means {
            FitMode::Central
        } else {
            FitMode::Resampled
        }
    }
}

/// Options shared by both fit modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOpts {
    /// Optimiser effort.
    #[serde(default)]
    pub intensity: Intensity,
    /// Master seed; the central fit uses substream 0 and draw `b` uses
    /// substream `b + 1`.
    #[serde(default)]
    pub seed: u64,
    /// Worker threads for per-draw fits; `None` uses every core.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Largest tolerated share of draws that fail to converge.
    #[serde(default = "default_max_failed_fraction")]
    pub max_failed_fraction: f64,
    /// Progress reporting level.
    #[serde(default)]
    pub verbosity: Verbosity,
}

impl Default for FitOpts {
    fn default() -> Self {
        Self {
            intensity: Intensity::Default,
            seed: 0,
            threads: None,
            max_failed_fraction: default_max_failed_fraction(),
            verbosity: Verbosity::Normal,
        }
    }
}

/// A value and, when known, its bootstrap error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    /// Point value.
    pub value: f64,
    /// Standard deviation over draws; `None` for central fits.
    pub error: Option<f64>,
}

/// Why a single draw was left out of the reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawFailure {
    /// The best cost or a parameter was not finite.
    NonFinite,
    /// The optimiser exhausted its budget without meeting its tolerance.
    NotConverged,
}

/// Result of the fit to one draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DrawOutcome {
    /// The draw converged.
    Converged {
        /// Best parameters for this draw.
        parameters: Vec<f64>,
        /// Chi-square per degree of freedom at `parameters`.
        chisquare: f64,
    },
    /// The draw was skipped.
    Failed(DrawFailure),
}

/// Book-keeping of a per-draw fit, so no draw disappears silently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawAccounting {
    /// Draws fitted.
    pub requested: usize,
    /// Draws entering the reduction.
    pub converged: usize,
    /// Draws skipped.
    pub failed: usize,
    /// Index and reason of every skipped draw, in draw order.
    pub failed_draws: Vec<(usize, DrawFailure)>,
}

/// Outcome of a correlated fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    /// Mode the fit ran in.
    pub mode: FitMode,
    /// Parameter names in vector order.
    pub parameter_names: Vec<String>,
    /// One estimate per parameter.
    pub parameters: Vec<Estimate>,
    /// Chi-square per degree of freedom.
    pub chisquare: Estimate,
    /// Points minus parameters.
    pub degrees_of_freedom: usize,
    /// Number of windowed data points.
    pub points: usize,
    /// How the covariance was inverted.
    pub inversion: InversionMethod,
    /// Whether the optimiser met its tolerance (central) or enough draws
    /// converged (resampled).
    pub converged: bool,
    /// Per-draw accounting; present for resampled fits.
    pub draws: Option<DrawAccounting>,
}

impl FitResult {
    /// Looks a parameter up by name.
    pub fn parameter(&self, name: &str) -> Option<&Estimate> {
        self.parameter_names
            .iter()
            .position(|candidate| candidate == name)
            .map(|index| &self.parameters[index])
    }
}

/// A fit specification bound to the windowed data it is evaluated on.
#[derive(Debug, Clone)]
pub struct ChiSquareProblem<'a> {
    spec: &'a FitSpec,
    data: WindowedData,
    nt: usize,
}

impl<'a> ChiSquareProblem<'a> {
    /// Binds `spec` to `channels`, which must be given in the order of
    /// `spec.channels()`.
    pub fn new(
        spec: &'a FitSpec,
        channels: &[&ChannelDraws],
        window: PlateauWindow,
        nt: usize,
    ) -> Result<Self, SpnError> {
        if channels.len() != spec.channels().len() {
            return Err(SpnError::Fit(
                ErrorInfo::new("channel-count-mismatch", "one set of draws per fitted channel")
                    .with_context("expected", spec.channels().len())
                    .with_context("found", channels.len()),
            ));
        }
        if let Some(other) = channels.iter().find(|channel| channel.nt() != nt) {
            return Err(SpnError::Fit(
                ErrorInfo::new("extent-mismatch", "channel extent differs from NT")
                    .with_context("channel", &other.name)
                    .with_context("nt", nt)
                    .with_context("found", other.nt()),
            ));
        }
        let points = window.len() * channels.len();
        if points <= spec.dimension() {
            return Err(SpnError::Fit(
                ErrorInfo::new(
                    "underdetermined-fit",
                    "the window must hold more points than there are parameters",
                )
                .with_context("points", points)
                .with_context("parameters", spec.dimension())
                .with_hint("widen the plateau window"),
            ));
        }
        let data = WindowedData::new(channels, window)?;
        Ok(Self { spec, data, nt })
    }

    /// Windowed data and covariance.
    pub fn data(&self) -> &WindowedData {
        &self.data
    }

    /// Points minus parameters.
    pub fn degrees_of_freedom(&self) -> usize {
        self.data.len() - self.spec.dimension()
    }

    /// Raw (not per degree of freedom) chi-square of `params` against `target`.
    pub fn chisquare(&self, params: &[f64], target: &DVector<f64>) -> f64 {
        let model = DVector::from_iterator(
            self.data.len(),
            self.data
                .points()
                .iter()
                .map(|&(channel, t)| self.spec.evaluate(channel, t, params, self.nt)),
        );
        let residual = target - model;
        residual.dot(&(self.data.inverse() * &residual))
    }

    /// Runs the fit in `mode`.
    pub fn fit(&self, mode: FitMode, opts: &FitOpts) -> Result<FitResult, SpnError> {
        match mode {
            FitMode::Central => Ok(self.fit_central(opts)),
            FitMode::Resampled => self.fit_resampled(opts),
        }
    }

    fn fit_draw(&self, target: &DVector<f64>, opts: &FitOpts, draw: usize) -> DrawOutcome {
        let settings = opts.intensity.settings();
        let bounds = self.spec.bounds();
        let mut rng = RngHandle::draw_fit(opts.seed, draw);
        let outcome = minimize(
            |params: &[f64]| self.chisquare(params, target),
            &bounds,
            &settings,
            &mut rng,
        );
        if !outcome.cost.is_finite() || outcome.parameters.iter().any(|p| !p.is_finite()) {
            return DrawOutcome::Failed(DrawFailure::NonFinite);
        }
        if !outcome.converged {
            return DrawOutcome::Failed(DrawFailure::NotConverged);
        }
        DrawOutcome::Converged {
            parameters: outcome.parameters,
            chisquare: outcome.cost / self.degrees_of_freedom() as f64,
        }
    }

    fn fit_central(&self, opts: &FitOpts) -> FitResult {
        let settings = opts.intensity.settings();
        let mut rng = RngHandle::central_fit(opts.seed);
        let central = self.data.central();
        let outcome = minimize(
            |params: &[f64]| self.chisquare(params, central),
            &self.spec.bounds(),
            &settings,
            &mut rng,
        );
        if !outcome.converged {
            warn!(
                "central fit did not converge after {} generations",
                outcome.generations
            );
        } else if opts.verbosity.diagnostics() {
            debug!(
                "central fit converged: {} generations, {} evaluations",
                outcome.generations, outcome.evaluations
            );
        }
        FitResult {
            mode: FitMode::Central,
            parameter_names: self.spec.names(),
            parameters: outcome
                .parameters
                .iter()
                .map(|&value| Estimate { value, error: None })
                .collect(),
            chisquare: Estimate {
                value: outcome.cost / self.degrees_of_freedom() as f64,
                error: None,
            },
            degrees_of_freedom: self.degrees_of_freedom(),
            points: self.data.len(),
            inversion: self.data.method(),
            converged: outcome.converged,
            draws: None,
        }
    }

    fn fit_resampled(&self, opts: &FitOpts) -> Result<FitResult, SpnError> {
        let draws = self.data.draws();
        let requested = draws.len();
        if opts.verbosity.progress() {
            info!(
                "fitting {} draws over {} points ({:?} intensity)",
                requested,
                self.data.len(),
                opts.intensity
            );
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opts.threads.unwrap_or(0))
            .build()
            .map_err(|err| {
                SpnError::Fit(
                    ErrorInfo::new("thread-pool", "failed to build the fit worker pool")
                        .with_context("reason", err),
                )
            })?;
        let mut ordered: Vec<(usize, DrawOutcome)> = pool.install(|| {
            draws
                .par_iter()
                .enumerate()
                .map(|(index, target)| (index, self.fit_draw(target, opts, index)))
                .collect()
        });
        ordered.sort_by_key(|(index, _)| *index);

        let reduced = reduce_draws(ordered, self.spec.dimension(), opts)?;
        Ok(FitResult {
            mode: FitMode::Resampled,
            parameter_names: self.spec.names(),
            parameters: reduced.parameters,
            chisquare: reduced.chisquare,
            degrees_of_freedom: self.degrees_of_freedom(),
            points: self.data.len(),
            inversion: self.data.method(),
            converged: true,
            draws: Some(reduced.accounting),
        })
    }
}

struct Reduced {
    parameters: Vec<Estimate>,
    chisquare: Estimate,
    accounting: DrawAccounting,
}

/// Mean and spread over the converged draws, after checking that enough of
/// them converged.
fn reduce_draws(
    ordered: Vec<(usize, DrawOutcome)>,
    dimension: usize,
    opts: &FitOpts,
) -> Result<Reduced, SpnError> {
    let requested = ordered.len();
    let mut converged_params = Vec::with_capacity(requested);
    let mut chisquares = Vec::with_capacity(requested);
    let mut failed_draws = Vec::new();
    for (index, outcome) in ordered {
        match outcome {
            DrawOutcome::Converged {
                parameters,
                chisquare,
            } => {
                converged_params.push(parameters);
                chisquares.push(chisquare);
            }
            DrawOutcome::Failed(reason) => {
                if opts.verbosity.diagnostics() {
                    debug!("draw {index} skipped: {reason:?}");
                }
                failed_draws.push((index, reason));
            }
        }
    }

    let accounting = DrawAccounting {
        requested,
        converged: converged_params.len(),
        failed: failed_draws.len(),
        failed_draws,
    };
    let allowed = (opts.max_failed_fraction * requested as f64).floor() as usize;
    if accounting.failed > allowed || accounting.converged < 2 {
        return Err(SpnError::Fit(
            ErrorInfo::new(
                "too-many-failed-draws",
                "too many bootstrap draws failed to converge",
            )
            .with_context("requested", requested)
            .with_context("failed", accounting.failed)
            .with_context("max_failed_fraction", opts.max_failed_fraction)
            .with_hint("try the intense optimiser or a different plateau window"),
        ));
    }
    if accounting.failed > 0 {
        warn!(
            "{} of {} draws failed to converge and were skipped",
            accounting.failed, requested
        );
    }

    let parameters = (0..dimension)
        .map(|k| {
            let column: Vec<f64> = converged_params.iter().map(|p| p[k]).collect();
            let (value, error) = mean_and_error(&column);
            Estimate {
                value,
                error: Some(error),
            }
        })
        .collect();
    let (value, error) = mean_and_error(&chisquares);
    Ok(Reduced {
        parameters,
        chisquare: Estimate {
            value,
            error: Some(error),
        },
        accounting,
    })
}

/// Fits `spec` to the channels of `ensemble` it names.
pub fn minimize_chisquare(
    ensemble: &BootstrapEnsemble,
    spec: &FitSpec,
    window: PlateauWindow,
    nt: usize,
    mode: FitMode,
    opts: &FitOpts,
) -> Result<FitResult, SpnError> {
    let channels = spec
        .channels()
        .iter()
        .map(|model| {
            ensemble.channel(&model.correlator).ok_or_else(|| {
                SpnError::Fit(
                    ErrorInfo::new("missing-channel", "fit names a channel with no draws")
                        .with_context("channel", &model.correlator),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let problem = ChiSquareProblem::new(spec, &channels, window, nt)?;
    problem.fit(mode, opts)
}
