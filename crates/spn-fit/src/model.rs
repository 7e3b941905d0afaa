use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use spn_core::errors::{ErrorInfo, SpnError};

fn config_error(code: &str, message: impl Into<String>) -> SpnError {
    SpnError::Config(ErrorInfo::new(code, message.into()))
}

/// Parametric correlator shapes on a periodic lattice of extent `NT`.
///
/// All forms are built from the forward and backward propagating pieces
/// `e^{-m t}` and `e^{-m (NT - t)}`; the first slot is always the mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitForm {
    /// `f^2 m / 2 (e^{-mt} + e^{-m(NT-t)})`; slots `(mass, decay_const)`.
    DecayConstCosh,
    /// `f A / 2 (e^{-mt} - e^{-m(NT-t)})`; slots `(mass, decay_const, amplitude)`.
    DecayConstAmplitudeSinh,
    /// `A (e^{-mt} + e^{-m(NT-t)})`; slots `(mass, amplitude)`.
    AmplitudeCosh,
    /// `A (e^{-mt} - e^{-m(NT-t)})`; slots `(mass, amplitude)`.
    AmplitudeSinh,
}

impl FitForm {
    /// Names of the slots the form consumes, in order.
    pub fn slots(&self) -> &'static [&'static str] {
        match self {
            FitForm::DecayConstCosh => &["mass", "decay_const"],
            FitForm::DecayConstAmplitudeSinh => &["mass", "decay_const", "amplitude"],
            FitForm::AmplitudeCosh | FitForm::AmplitudeSinh => &["mass", "amplitude"],
        }
    }

    /// Number of slots.
    pub fn arity(&self) -> usize {
        self.slots().len()
    }

    /// Evaluates the form at slice `t` for slot values `p`.
    pub fn evaluate(&self, t: f64, p: &[f64], nt: usize) -> f64 {
        let mass = p[0];
        let forward = (-mass * t).exp();
        let backward = (-mass * (nt as f64 - t)).exp();
        match self {
            FitForm::DecayConstCosh => p[1] * p[1] * mass / 2.0 * (forward + backward),
            FitForm::DecayConstAmplitudeSinh => p[1] * p[2] / 2.0 * (forward - backward),
            FitForm::AmplitudeCosh => p[1] * (forward + backward),
            FitForm::AmplitudeSinh => p[1] * (forward - backward),
        }
    }
}

/// A named fit parameter and its box constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Name used in reports and result headers.
    pub name: String,
    /// Inclusive lower bound.
    pub lower: f64,
    /// Inclusive upper bound.
    pub upper: f64,
}

impl ParameterSpec {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
        }
    }
}

/// One correlator entering the fit and how its form reads the parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelModel {
    /// Correlator name; matches the name of its bootstrap draws.
    pub correlator: String,
    /// Shape fitted to the correlator.
    pub form: FitForm,
    /// Index into the shared parameter vector for every slot of `form`.
    pub parameters: Vec<usize>,
}

/// Validated description of a joint fit.
///
/// Built once, so every fit call can rely on the slot mapping being complete
/// and in range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitSpec {
    parameters: Vec<ParameterSpec>,
    channels: Vec<ChannelModel>,
}

impl FitSpec {
    /// Validates the parameter boxes and the channel mapping.
    pub fn new(
        parameters: Vec<ParameterSpec>,
        channels: Vec<ChannelModel>,
    ) -> Result<Self, SpnError> {
        if parameters.is_empty() {
            return Err(config_error("no-parameters", "a fit needs at least one parameter"));
        }
        if channels.is_empty() {
            return Err(config_error("no-channels", "a fit needs at least one channel"));
        }
        let mut names = BTreeSet::new();
        for spec in &parameters {
            if !names.insert(spec.name.as_str()) {
                return Err(SpnError::Config(
                    ErrorInfo::new("duplicate-parameter", "parameter names must be unique")
                        .with_context("parameter", &spec.name),
                ));
            }
            if !(spec.lower.is_finite() && spec.upper.is_finite() && spec.lower < spec.upper) {
                return Err(SpnError::Config(
                    ErrorInfo::new("bad-parameter-range", "parameter range must be finite with lower < upper")
                        .with_context("parameter", &spec.name)
                        .with_context("lower", spec.lower)
                        .with_context("upper", spec.upper),
                ));
            }
        }

        let mut used = vec![false; parameters.len()];
        for channel in &channels {
            if channel.parameters.len() != channel.form.arity() {
                return Err(SpnError::Config(
                    ErrorInfo::new(
                        "mapping-arity",
                        "channel mapping must provide one parameter per form slot",
                    )
                    .with_context("correlator", &channel.correlator)
                    .with_context("expected", channel.form.arity())
                    .with_context("found", channel.parameters.len()),
                ));
            }
            for &index in &channel.parameters {
                let Some(slot) = used.get_mut(index) else {
                    return Err(SpnError::Config(
                        ErrorInfo::new("mapping-out-of-range", "channel maps to a missing parameter")
                            .with_context("correlator", &channel.correlator)
                            .with_context("index", index),
                    ));
                };
                *slot = true;
            }
        }
        if let Some(unused) = used.iter().position(|used| !used) {
            return Err(SpnError::Config(
                ErrorInfo::new("unused-parameter", "every parameter must be read by some channel")
                    .with_context("parameter", &parameters[unused].name),
            ));
        }

        Ok(Self {
            parameters,
            channels,
        })
    }

    /// Parameter boxes in vector order.
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Channels in data-vector order.
    pub fn channels(&self) -> &[ChannelModel] {
        &self.channels
    }

    /// Length of the shared parameter vector.
    pub fn dimension(&self) -> usize {
        self.parameters.len()
    }

    /// `(lower, upper)` per parameter.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters
            .iter()
            .map(|spec| (spec.lower, spec.upper))
            .collect()
    }

    /// Parameter names in vector order.
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|spec| spec.name.clone()).collect()
    }

    /// Evaluates channel `index` at slice `t` for the full parameter vector.
    pub fn evaluate(&self, index: usize, t: usize, params: &[f64], nt: usize) -> f64 {
        let channel = &self.channels[index];
        let mut slots = [0.0; 3];
        for (slot, &param) in slots.iter_mut().zip(&channel.parameters) {
            *slot = params[param];
        }
        channel
            .form
            .evaluate(t as f64, &slots[..channel.parameters.len()], nt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudoscalar() -> FitSpec {
        FitSpec::new(
            vec![
                ParameterSpec::new("mass", 0.01, 5.0),
                ParameterSpec::new("decay_const", 0.0, 5.0),
                ParameterSpec::new("amplitude", 0.0, 5.0),
            ],
            vec![
                ChannelModel {
                    correlator: "g5".into(),
                    form: FitForm::DecayConstCosh,
                    parameters: vec![0, 1],
                },
                ChannelModel {
                    correlator: "g5_g0g5_re".into(),
                    form: FitForm::DecayConstAmplitudeSinh,
                    parameters: vec![0, 1, 2],
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn forms_match_closed_expressions() {
        let nt = 24;
        let (m, f, a): (f64, f64, f64) = (0.4, 0.8, 1.3);
        let t: f64 = 5.0;
        let fwd = (-m * t).exp();
        let bwd = (-m * (nt as f64 - t)).exp();
        let diag = FitForm::DecayConstCosh.evaluate(t, &[m, f], nt);
        assert!((diag - f * f * m / 2.0 * (fwd + bwd)).abs() < 1e-15);
        let axial = FitForm::DecayConstAmplitudeSinh.evaluate(t, &[m, f, a], nt);
        assert!((axial - f * a / 2.0 * (fwd - bwd)).abs() < 1e-15);
        let midpoint = FitForm::AmplitudeSinh.evaluate(12.0, &[m, a], nt);
        assert!(midpoint.abs() < 1e-15);
    }

    #[test]
    fn mapping_routes_shared_parameters() {
        let spec = pseudoscalar();
        let params = [0.5, 0.2, 3.0];
        let direct = FitForm::DecayConstAmplitudeSinh.evaluate(7.0, &[0.5, 0.2, 3.0], 32);
        assert_eq!(spec.evaluate(1, 7, &params, 32), direct);
        let diag = FitForm::DecayConstCosh.evaluate(7.0, &[0.5, 0.2], 32);
        assert_eq!(spec.evaluate(0, 7, &params, 32), diag);
        assert_eq!(spec.names(), vec!["mass", "decay_const", "amplitude"]);
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let err = FitSpec::new(
            vec![ParameterSpec::new("mass", 0.0, 1.0)],
            vec![ChannelModel {
                correlator: "g5".into(),
                form: FitForm::AmplitudeCosh,
                parameters: vec![0],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code(), "mapping-arity");
    }

    #[test]
    fn unused_parameter_is_rejected() {
        let err = FitSpec::new(
            vec![
                ParameterSpec::new("mass", 0.0, 1.0),
                ParameterSpec::new("amplitude", 0.0, 1.0),
                ParameterSpec::new("spare", 0.0, 1.0),
            ],
            vec![ChannelModel {
                correlator: "id".into(),
                form: FitForm::AmplitudeCosh,
                parameters: vec![0, 1],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code(), "unused-parameter");
        assert_eq!(err.info().context["parameter"], "spare");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = FitSpec::new(
            vec![
                ParameterSpec::new("mass", 2.0, 1.0),
                ParameterSpec::new("amplitude", 0.0, 1.0),
            ],
            vec![ChannelModel {
                correlator: "id".into(),
                form: FitForm::AmplitudeCosh,
                parameters: vec![0, 1],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad-parameter-range");
    }
}
