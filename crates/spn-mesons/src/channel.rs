use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use spn_boot::Symmetry;
use spn_core::errors::{ErrorInfo, SpnError};
use spn_fit::{ChannelModel, FitForm, FitSpec, ParameterSpec};

/// Names of the built-in channel presets.
pub const PRESET_NAMES: [&str; 4] = ["g5", "gk", "id", "g5gk"];

/// One correlator of a channel: how it is folded and fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorSpec {
    /// Key of the correlator in the input data.
    pub name: String,
    /// Label handed to plots.
    #[serde(default)]
    pub latex: String,
    /// Time-reversal sign used when folding.
    pub symmetry: Symmetry,
    /// Shape fitted on the plateau.
    pub form: FitForm,
    /// Index into the channel parameters for every slot of `form`.
    pub parameters: Vec<usize>,
}

/// Serialised shape of a channel descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// Channel name, used as the prefix of result headers.
    pub name: String,
    /// Correlators fitted jointly; the first one drives the effective mass.
    pub correlators: Vec<CorrelatorSpec>,
    /// Fit parameters and their boxes. The first one is the mass, and every
    /// correlator must map its mass slot to it.
    pub parameters: Vec<ParameterSpec>,
}

/// A validated meson channel.
///
/// Construction checks the descriptor once; afterwards the fit specification
/// and the result headers are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChannelDescriptor", into = "ChannelDescriptor")]
pub struct ChannelSpec {
    name: String,
    correlators: Vec<CorrelatorSpec>,
    fit: FitSpec,
    headers: Vec<String>,
}

impl ChannelSpec {
    /// Validates a descriptor.
    pub fn new(
        name: impl Into<String>,
        correlators: Vec<CorrelatorSpec>,
        parameters: Vec<ParameterSpec>,
    ) -> Result<Self, SpnError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SpnError::Config(ErrorInfo::new(
                "empty-channel-name",
                "channel name must not be empty",
            )));
        }
        if correlators.is_empty() {
            return Err(SpnError::Config(
                ErrorInfo::new("no-correlators", "a channel needs at least one correlator")
                    .with_context("channel", &name),
            ));
        }
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = correlators
            .iter()
            .find(|correlator| !seen.insert(correlator.name.as_str()))
        {
            return Err(SpnError::Config(
                ErrorInfo::new("duplicate-correlator", "correlator names must be unique")
                    .with_context("channel", &name)
                    .with_context("correlator", &duplicate.name),
            ));
        }

        let models = correlators
            .iter()
            .map(|correlator| ChannelModel {
                correlator: correlator.name.clone(),
                form: correlator.form,
                parameters: correlator.parameters.clone(),
            })
            .collect();
        let fit = FitSpec::new(parameters, models).map_err(|err| {
            let mut info = err.info().clone();
            info.context.insert("channel".into(), name.clone());
            SpnError::Config(info)
        })?;
        if let Some(correlator) = correlators
            .iter()
            .find(|correlator| correlator.parameters.first() != Some(&0))
        {
            return Err(SpnError::Config(
                ErrorInfo::new(
                    "mass-not-first",
                    "every correlator must read its mass slot from the first parameter",
                )
                .with_context("channel", &name)
                .with_context("correlator", &correlator.name)
                .with_hint("list the mass first under `parameters` and map slot 0 to index 0"),
            ));
        }

        let mut headers: Vec<String> = fit
            .parameters()
            .iter()
            .flat_map(|parameter| [parameter.name.clone(), format!("{}_error", parameter.name)])
            .collect();
        headers.push("chisquare".into());
        headers.push("chisquare_error".into());

        Ok(Self {
            name,
            correlators,
            fit,
            headers,
        })
    }

    /// Built-in channel by name.
    pub fn preset(name: &str) -> Result<Self, SpnError> {
        let mass = || ParameterSpec::new("mass", 0.01, 5.0);
        let decay_const = || ParameterSpec::new("decay_const", 0.0, 5.0);
        let amplitude = || ParameterSpec::new("amplitude", 0.0, 5.0);
        let single = |name: &str, latex: &str, form: FitForm| CorrelatorSpec {
            name: name.into(),
            latex: latex.into(),
            symmetry: Symmetry::Symmetric,
            form,
            parameters: vec![0, 1],
        };

        match name {
            "g5" => Self::new(
                "g5",
                vec![
                    single("g5", r"\gamma_5,\gamma_5", FitForm::DecayConstCosh),
                    CorrelatorSpec {
                        name: "g5_g0g5_re".into(),
                        latex: r"\gamma_0\gamma_5,\gamma_5".into(),
                        symmetry: Symmetry::Antisymmetric,
                        form: FitForm::DecayConstAmplitudeSinh,
                        parameters: vec![0, 1, 2],
                    },
                ],
                vec![mass(), decay_const(), amplitude()],
            ),
            "gk" => Self::new(
                "gk",
                vec![single("gk", r"\gamma_k,\gamma_k", FitForm::DecayConstCosh)],
                vec![mass(), decay_const()],
            ),
            "id" => Self::new(
                "id",
                vec![single("id", "1,1", FitForm::AmplitudeCosh)],
                vec![mass(), amplitude()],
            ),
            "g5gk" => Self::new(
                "g5gk",
                vec![single(
                    "g5gk",
                    r"\gamma_5\gamma_k,\gamma_5\gamma_k",
                    FitForm::AmplitudeCosh,
                )],
                vec![mass(), amplitude()],
            ),
            other => Err(SpnError::Config(
                ErrorInfo::new("unknown-channel", "no preset with this name")
                    .with_context("channel", other)
                    .with_hint(format!("known presets: {}", PRESET_NAMES.join(", "))),
            )),
        }
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Correlators in fit order.
    pub fn correlators(&self) -> &[CorrelatorSpec] {
        &self.correlators
    }

    /// Fit specification built from the correlators.
    pub fn fit(&self) -> &FitSpec {
        &self.fit
    }

    /// Result column names without the channel prefix.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl TryFrom<ChannelDescriptor> for ChannelSpec {
    type Error = SpnError;

    fn try_from(value: ChannelDescriptor) -> Result<Self, Self::Error> {
        ChannelSpec::new(value.name, value.correlators, value.parameters)
    }
}

impl From<ChannelSpec> for ChannelDescriptor {
    fn from(value: ChannelSpec) -> Self {
        let parameters = value.fit.parameters().to_vec();
        ChannelDescriptor {
            name: value.name,
            correlators: value.correlators,
            parameters,
        }
    }
}
