//! Plot payloads.
//!
//! Rendering happens outside this crate. The workflow describes every figure
//! as a serialisable payload and hands it to a [`PlotSink`], which may draw
//! it, write it to disk or just record it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use spn_core::errors::{ErrorInfo, SpnError};
use spn_fit::FitForm;

/// Sampling step of fitted curves, in time slices.
const CURVE_STEP: f64 = 0.1;

/// Fitted mass drawn as a band over the plateau.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MassBand {
    /// Mass value.
    pub mass: f64,
    /// Mass error.
    pub error: f64,
    /// Left edge of the band.
    pub tmin: f64,
    /// Right edge of the band.
    pub tmax: f64,
}

/// Effective mass against time slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveMassPlot {
    /// Target filename.
    pub filename: String,
    /// Mean per slice; NaN where undefined.
    pub mean: Vec<f64>,
    /// Error per slice; NaN where undefined.
    pub error: Vec<f64>,
    /// Optional lower y limit.
    pub ymin: Option<f64>,
    /// Optional upper y limit.
    pub ymax: Option<f64>,
    /// Fit result overlay.
    pub fit: Option<MassBand>,
}

/// A fit curve overlaid on a correlator plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedCurve {
    /// Fitted shape.
    pub form: FitForm,
    /// Slot values of `form` at the central fit.
    pub parameters: Vec<f64>,
    /// Temporal extent the form is evaluated with.
    pub nt: usize,
    /// Legend entry.
    pub legend: String,
    /// Left end of the drawn curve.
    pub t_lowerbound: f64,
    /// Right end of the drawn curve.
    pub t_upperbound: f64,
    /// `(t, value)` samples of the curve between the two ends.
    pub samples: Vec<(f64, f64)>,
}

impl FittedCurve {
    /// Samples `form` between `t_lowerbound` and `t_upperbound`.
    pub fn new(
        form: FitForm,
        parameters: Vec<f64>,
        nt: usize,
        legend: impl Into<String>,
        t_lowerbound: f64,
        t_upperbound: f64,
    ) -> Self {
        let steps = ((t_upperbound - t_lowerbound) / CURVE_STEP).round().max(0.0) as usize;
        let samples = (0..=steps)
            .map(|i| {
                let t = t_lowerbound + i as f64 * CURVE_STEP;
                (t, form.evaluate(t, &parameters, nt))
            })
            .collect();
        Self {
            form,
            parameters,
            nt,
            legend: legend.into(),
            t_lowerbound,
            t_upperbound,
            samples,
        }
    }
}

/// Correlator mean and error against time slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelatorPlot {
    /// Target filename.
    pub filename: String,
    /// Correlator name.
    pub correlator: String,
    /// Axis label.
    pub latex: String,
    /// Bootstrap mean per slice.
    pub mean: Vec<f64>,
    /// Bootstrap error per slice.
    pub error: Vec<f64>,
    /// Fit overlay.
    pub fit: Option<FittedCurve>,
    /// Optional lower y bound.
    pub corr_lowerbound: Option<f64>,
    /// Optional upper y bound.
    pub corr_upperbound: Option<f64>,
}

/// Any figure produced by the workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotPayload {
    /// Effective-mass figure.
    EffectiveMass(EffectiveMassPlot),
    /// Correlator figure.
    Correlator(CorrelatorPlot),
}

impl PlotPayload {
    /// Target filename of the figure.
    pub fn filename(&self) -> &str {
        match self {
            PlotPayload::EffectiveMass(plot) => &plot.filename,
            PlotPayload::Correlator(plot) => &plot.filename,
        }
    }
}

/// Receiver of plot payloads.
pub trait PlotSink {
    /// Accepts one figure.
    fn emit(&mut self, plot: PlotPayload) -> Result<(), SpnError>;
}

/// Sink that keeps every payload in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Payloads in emission order.
    pub plots: Vec<PlotPayload>,
}

impl RecordingSink {
    /// Filenames in emission order.
    pub fn filenames(&self) -> Vec<&str> {
        self.plots.iter().map(PlotPayload::filename).collect()
    }
}

impl PlotSink for RecordingSink {
    fn emit(&mut self, plot: PlotPayload) -> Result<(), SpnError> {
        self.plots.push(plot);
        Ok(())
    }
}

/// Sink that writes every payload as a JSON file under a directory.
///
/// The payload filename keeps its stem and gets a `.json` extension, so a
/// renderer can pick the files up later.
#[derive(Debug)]
pub struct JsonFileSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl JsonFileSink {
    /// Sink writing under `dir`, which is created on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl PlotSink for JsonFileSink {
    fn emit(&mut self, plot: PlotPayload) -> Result<(), SpnError> {
        let path = self.dir.join(Path::new(plot.filename()).with_extension("json"));
        let io_error = |err: std::io::Error| {
            SpnError::Serde(
                ErrorInfo::new("plot-write", err.to_string()).with_context("path", path.display()),
            )
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let bytes = serde_json::to_vec_pretty(&plot)
            .map_err(|err| SpnError::Serde(ErrorInfo::new("json-serialize", err.to_string())))?;
        fs::write(&path, bytes).map_err(io_error)?;
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_covers_both_ends() {
        let curve = FittedCurve::new(FitForm::AmplitudeCosh, vec![0.5, 1.0], 24, "fit", 6.5, 13.5);
        assert_eq!(curve.samples.len(), 71);
        let (first, _) = curve.samples[0];
        let (last, value) = *curve.samples.last().unwrap();
        assert_eq!(first, 6.5);
        assert!((last - 13.5).abs() < 1e-9);
        assert!((value - FitForm::AmplitudeCosh.evaluate(last, &[0.5, 1.0], 24)).abs() < 1e-15);
    }

    #[test]
    fn payloads_serialise_with_kind_tag() {
        let plot = PlotPayload::EffectiveMass(EffectiveMassPlot {
            filename: "effmass_g5.pdf".into(),
            mean: vec![0.5, f64::NAN],
            error: vec![0.01, f64::NAN],
            ymin: None,
            ymax: Some(1.0),
            fit: None,
        });
        let json = serde_json::to_value(&plot).unwrap();
        assert_eq!(json["kind"], "effective_mass");
        assert!(json["mean"][1].is_null());
    }
}
