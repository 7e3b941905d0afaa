//! The per-channel workflow.
//!
//! A channel is analysed in two passes by a person at a terminal. The first
//! pass resamples the correlators and emits the effective-mass and correlator
//! plots, from which a plateau is read off. The second pass, with the plateau
//! supplied, additionally runs the central fit (for the overlay curves) and
//! the per-draw fit (for the reported values and errors).

use log::{debug, info};
use serde::Serialize;
use spn_boot::{
    bootstrap_correlators, bootstrap_eff_masses, ConfigurationSelection, EffectiveMass,
    RawCorrelatorSet,
};
use spn_core::errors::{ErrorInfo, SpnError};
use spn_core::provenance::{RunProvenance, Verbosity};
use spn_fit::{
    minimize_chisquare, Estimate, FitMode, FitOpts, FitResult, Intensity, PlateauWindow,
};

use crate::channel::ChannelSpec;
use crate::output::output_filename;
use crate::plot::{
    CorrelatorPlot, EffectiveMassPlot, FittedCurve, MassBand, PlotPayload, PlotSink,
};
use crate::results::report_hash;

const NEEDS_PLATEAU_MESSAGE: &str = "Effective mass plot has been generated. \
     Now specify the start and end of the plateau to perform the fit.";

/// Settings for one run of [`process_correlator`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOptions {
    /// Temporal extent every correlator must have.
    pub nt: usize,
    /// Number of bootstrap draws.
    pub bootstrap_sample_count: usize,
    /// Master seed.
    pub seed: u64,
    /// Configuration thinning.
    pub selection: ConfigurationSelection,
    /// First plateau slice, once chosen.
    pub plateau_start: Option<usize>,
    /// Last plateau slice, once chosen.
    pub plateau_end: Option<usize>,
    /// Optimiser effort for both fits.
    pub optimizer_intensity: Intensity,
    /// Effective-mass plot lower limit.
    pub eff_mass_plot_ymin: Option<f64>,
    /// Effective-mass plot upper limit.
    pub eff_mass_plot_ymax: Option<f64>,
    /// Fitted correlator plot lower bound.
    pub correlator_lowerbound: Option<f64>,
    /// Fitted correlator plot upper bound.
    pub correlator_upperbound: Option<f64>,
    /// Prefix of every output filename.
    pub output_prefix: String,
    /// Worker threads for per-draw fits.
    pub threads: Option<usize>,
    /// Largest tolerated share of non-converging draws.
    pub max_failed_fraction: f64,
    /// Progress reporting level.
    pub verbosity: Verbosity,
}

impl ProcessOptions {
    fn fit_opts(&self) -> FitOpts {
        FitOpts {
            intensity: self.optimizer_intensity,
            seed: self.seed,
            threads: self.threads,
            max_failed_fraction: self.max_failed_fraction,
            verbosity: self.verbosity,
        }
    }
}

/// Finished analysis of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MesonReport {
    /// Channel name.
    pub channel: String,
    /// Plateau the fits ran on.
    pub window: PlateauWindow,
    /// Fit against the bootstrap means.
    pub central: FitResult,
    /// Per-draw fit; its values and errors are the reported result.
    pub fit: FitResult,
    /// Effective mass of the leading correlator.
    pub effective_mass: EffectiveMass,
    /// Result column names without the channel prefix.
    pub headers: Vec<String>,
    /// Seeds and sizes the run used.
    pub provenance: RunProvenance,
    /// SHA-256 of the canonical JSON of everything above.
    pub hash: String,
}

impl MesonReport {
    /// Reported mass: the first fit parameter, which every correlator of a
    /// validated channel reads as its mass slot.
    pub fn mass(&self) -> Estimate {
        self.fit.parameters[0]
    }

    /// `(value, error)` pairs in header order: parameters, then chi-square.
    pub fn record_values(&self) -> Vec<(f64, f64)> {
        self.fit
            .parameters
            .iter()
            .chain(std::iter::once(&self.fit.chisquare))
            .map(|estimate| (estimate.value, estimate.error.unwrap_or(f64::NAN)))
            .collect()
    }
}

/// Result of [`process_correlator`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MesonOutcome {
    /// Both fits ran.
    Complete(Box<MesonReport>),
    /// Plots were emitted but no plateau is known yet.
    NeedsPlateau {
        /// What the user should do next.
        message: String,
    },
}

#[derive(Serialize)]
struct HashedReport<'a> {
    channel: &'a str,
    window: &'a PlateauWindow,
    central: &'a FitResult,
    fit: &'a FitResult,
    effective_mass: &'a EffectiveMass,
    provenance: &'a RunProvenance,
}

/// Runs the two-phase analysis of `channel` on `correlators`.
///
/// A supplied window is validated before anything else, so a bad window
/// produces no plots. Without a complete window the plots are emitted and
/// [`MesonOutcome::NeedsPlateau`] is returned without fitting.
pub fn process_correlator(
    channel: &ChannelSpec,
    correlators: &[RawCorrelatorSet],
    options: &ProcessOptions,
    sink: &mut dyn PlotSink,
) -> Result<MesonOutcome, SpnError> {
    let window = match (options.plateau_start, options.plateau_end) {
        (Some(start), Some(end)) => Some(PlateauWindow::new(start, end, options.nt)?),
        _ => None,
    };

    let prepared = channel
        .correlators()
        .iter()
        .map(|spec| {
            let raw = correlators
                .iter()
                .find(|set| set.name() == spec.name)
                .ok_or_else(|| {
                    SpnError::Data(
                        ErrorInfo::new(
                            "missing-correlator",
                            "input has no correlator of this name",
                        )
                        .with_context("channel", channel.name())
                        .with_context("correlator", &spec.name),
                    )
                })?;
            if raw.nt() != options.nt {
                return Err(SpnError::Data(
                    ErrorInfo::new("extent-mismatch", "correlator extent differs from NT")
                        .with_context("correlator", &spec.name)
                        .with_context("nt", options.nt)
                        .with_context("found", raw.nt()),
                ));
            }
            Ok(raw.thinned(&options.selection)?.symmetrized(spec.symmetry))
        })
        .collect::<Result<Vec<_>, SpnError>>()?;
    let configurations = prepared[0].config_count();

    if options.verbosity.progress() {
        info!(
            "{}: {} configuration(s), {} bootstrap samples",
            channel.name(),
            configurations,
            options.bootstrap_sample_count
        );
    }
    let ensemble =
        bootstrap_correlators(&prepared, options.bootstrap_sample_count, options.seed)?;

    let leading = &channel.correlators()[0];
    let effective_mass = bootstrap_eff_masses(&ensemble.channels[0].draws, leading.symmetry);
    if options.verbosity.diagnostics() {
        let undefined = effective_mass
            .statistic
            .mean
            .iter()
            .filter(|value| value.is_nan())
            .count();
        debug!(
            "{}: effective mass undefined on {undefined} slice(s)",
            channel.name()
        );
    }

    sink.emit(PlotPayload::EffectiveMass(EffectiveMassPlot {
        filename: output_filename(
            &options.output_prefix,
            "effmass",
            Some(channel.name()),
            None,
            None,
            "pdf",
        ),
        mean: effective_mass.statistic.mean.clone(),
        error: effective_mass.statistic.error.clone(),
        ymin: options.eff_mass_plot_ymin,
        ymax: options.eff_mass_plot_ymax,
        fit: None,
    }))?;
    for (spec, draws) in channel.correlators().iter().zip(&ensemble.channels) {
        sink.emit(PlotPayload::Correlator(CorrelatorPlot {
            filename: output_filename(
                &options.output_prefix,
                "correlator",
                Some(&spec.name),
                None,
                None,
                "pdf",
            ),
            correlator: spec.name.clone(),
            latex: spec.latex.clone(),
            mean: draws.means().to_vec(),
            error: draws.errors().to_vec(),
            fit: None,
            corr_lowerbound: None,
            corr_upperbound: None,
        }))?;
    }

    let Some(window) = window else {
        return Ok(MesonOutcome::NeedsPlateau {
            message: NEEDS_PLATEAU_MESSAGE.to_string(),
        });
    };

    let fit_opts = options.fit_opts();
    let central = minimize_chisquare(
        &ensemble,
        channel.fit(),
        window,
        options.nt,
        FitMode::Central,
        &fit_opts,
    )?;
    let central_values: Vec<f64> = central.parameters.iter().map(|p| p.value).collect();
    for (spec, draws) in channel.correlators().iter().zip(&ensemble.channels) {
        let slots = spec.parameters.iter().map(|&index| central_values[index]).collect();
        sink.emit(PlotPayload::Correlator(CorrelatorPlot {
            filename: output_filename(
                &options.output_prefix,
                "centrally_fitted_correlator",
                Some(&spec.name),
                Some(window.start()),
                Some(window.end()),
                "pdf",
            ),
            correlator: spec.name.clone(),
            latex: spec.latex.clone(),
            mean: draws.means().to_vec(),
            error: draws.errors().to_vec(),
            fit: Some(FittedCurve::new(
                spec.form,
                slots,
                options.nt,
                "Fit of central values",
                window.start() as f64 - 3.5,
                window.end() as f64 - 0.5,
            )),
            corr_lowerbound: options.correlator_lowerbound,
            corr_upperbound: options.correlator_upperbound,
        }))?;
    }

    let fit = minimize_chisquare(
        &ensemble,
        channel.fit(),
        window,
        options.nt,
        FitMode::Resampled,
        &fit_opts,
    )?;
    let mass = fit.parameters[0];
    sink.emit(PlotPayload::EffectiveMass(EffectiveMassPlot {
        filename: output_filename(
            &options.output_prefix,
            "effmass_withfit",
            Some(channel.name()),
            Some(window.start()),
            Some(window.end()),
            "pdf",
        ),
        mean: effective_mass.statistic.mean.clone(),
        error: effective_mass.statistic.error.clone(),
        ymin: options.eff_mass_plot_ymin,
        ymax: options.eff_mass_plot_ymax,
        fit: Some(MassBand {
            mass: mass.value,
            error: mass.error.unwrap_or(f64::NAN),
            tmin: window.start() as f64 - 0.5,
            tmax: window.end() as f64 - 0.5,
        }),
    }))?;

    let mut provenance =
        RunProvenance::new(options.seed, options.bootstrap_sample_count, configurations);
    provenance
        .tool_versions
        .insert("spn-mesons".into(), env!("CARGO_PKG_VERSION").into());
    let hash = report_hash(&HashedReport {
        channel: channel.name(),
        window: &window,
        central: &central,
        fit: &fit,
        effective_mass: &effective_mass,
        provenance: &provenance,
    })?;
    if options.verbosity.progress() {
        info!(
            "{}: mass {} +/- {} (chi2/dof {})",
            channel.name(),
            mass.value,
            mass.error.unwrap_or(f64::NAN),
            fit.chisquare.value
        );
    }

    Ok(MesonOutcome::Complete(Box::new(MesonReport {
        channel: channel.name().to_string(),
        window,
        central,
        fit,
        effective_mass,
        headers: channel.headers().to_vec(),
        provenance,
        hash,
    })))
}
