use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use spn_boot::ConfigurationSelection;
use spn_core::errors::{ErrorInfo, SpnError};
use spn_core::provenance::Verbosity;
use spn_fit::Intensity;

use crate::channel::ChannelSpec;
use crate::process::ProcessOptions;

fn default_bootstrap_sample_count() -> usize {
    200
}

fn default_max_failed_fraction() -> f64 {
    0.1
}

fn default_correlator_lowerbound() -> Option<f64> {
    Some(0.0)
}

fn config_error(code: &str, message: impl Into<String>) -> SpnError {
    SpnError::Config(ErrorInfo::new(code, message.into()))
}

/// Per-channel settings of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Custom descriptor; the preset of the same name is used when absent.
    #[serde(default)]
    pub descriptor: Option<ChannelSpec>,
    /// First slice of the plateau, once chosen.
    #[serde(default)]
    pub plateau_start: Option<usize>,
    /// Last slice of the plateau, once chosen.
    #[serde(default)]
    pub plateau_end: Option<usize>,
    /// Optimiser effort for this channel.
    #[serde(default)]
    pub optimizer_intensity: Intensity,
    /// Lower y limit of the effective-mass plot.
    #[serde(default)]
    pub eff_mass_plot_ymin: Option<f64>,
    /// Upper y limit of the effective-mass plot.
    #[serde(default)]
    pub eff_mass_plot_ymax: Option<f64>,
    /// Lower y bound of the fitted correlator plot.
    #[serde(default = "default_correlator_lowerbound")]
    pub correlator_lowerbound: Option<f64>,
    /// Upper y bound of the fitted correlator plot.
    #[serde(default)]
    pub correlator_upperbound: Option<f64>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            descriptor: None,
            plateau_start: None,
            plateau_end: None,
            optimizer_intensity: Intensity::Default,
            eff_mass_plot_ymin: None,
            eff_mass_plot_ymax: None,
            correlator_lowerbound: default_correlator_lowerbound(),
            correlator_upperbound: None,
        }
    }
}

/// Analysis of one ensemble: shared settings plus the channels to process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Temporal extent of the lattice.
    pub nt: usize,
    /// Number of bootstrap draws.
    #[serde(default = "default_bootstrap_sample_count")]
    pub bootstrap_sample_count: usize,
    /// Master seed for bootstrap draws and optimiser streams.
    #[serde(default)]
    pub seed: u64,
    /// Which configurations of the stream enter the analysis.
    #[serde(default)]
    pub selection: ConfigurationSelection,
    /// Progress reporting level.
    #[serde(default)]
    pub verbosity: Verbosity,
    /// Worker threads for per-draw fits; all cores when absent.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Largest tolerated share of non-converging draws.
    #[serde(default = "default_max_failed_fraction")]
    pub max_failed_fraction: f64,
    /// Prefix of every output filename.
    #[serde(default)]
    pub output_prefix: String,
    /// Channels to analyse, in name order.
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelSettings>,
}

impl AnalysisConfig {
    /// Minimal configuration for `nt` with every default applied.
    pub fn new(nt: usize) -> Self {
        Self {
            nt,
            bootstrap_sample_count: default_bootstrap_sample_count(),
            seed: 0,
            selection: ConfigurationSelection::default(),
            verbosity: Verbosity::Normal,
            threads: None,
            max_failed_fraction: default_max_failed_fraction(),
            output_prefix: String::new(),
            channels: BTreeMap::new(),
        }
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(source: &str) -> Result<Self, SpnError> {
        let config: Self = serde_yaml::from_str(source).map_err(|err| {
            SpnError::Config(ErrorInfo::new("yaml-deserialize", err.to_string()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn load(path: &Path) -> Result<Self, SpnError> {
        let source = fs::read_to_string(path).map_err(|err| {
            SpnError::Serde(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        Self::from_yaml_str(&source)
    }

    /// Checks the shared settings.
    pub fn validate(&self) -> Result<(), SpnError> {
        if self.nt < 2 {
            return Err(SpnError::Config(
                ErrorInfo::new("bad-extent", "NT must be at least 2").with_context("nt", self.nt),
            ));
        }
        if self.bootstrap_sample_count < 2 {
            return Err(config_error(
                "bad-sample-count",
                "at least two bootstrap samples are needed for a covariance",
            ));
        }
        if !(0.0..=1.0).contains(&self.max_failed_fraction) {
            return Err(SpnError::Config(
                ErrorInfo::new("bad-failure-fraction", "max_failed_fraction must lie in [0, 1]")
                    .with_context("max_failed_fraction", self.max_failed_fraction),
            ));
        }
        if self.threads == Some(0) {
            return Err(config_error("bad-threads", "threads must be positive when set"));
        }
        self.selection
            .validate()
            .map_err(|err| SpnError::Config(err.info().clone()))
    }

    /// Descriptor of `channel`: the custom one when given, else the preset.
    pub fn channel_spec(&self, channel: &str) -> Result<ChannelSpec, SpnError> {
        match self
            .channels
            .get(channel)
            .and_then(|settings| settings.descriptor.clone())
        {
            Some(spec) => Ok(spec),
            None => ChannelSpec::preset(channel),
        }
    }

    /// Options for processing `channel`; unknown channels get default settings.
    pub fn process_options(&self, channel: &str) -> ProcessOptions {
        let settings = self.channels.get(channel).cloned().unwrap_or_default();
        ProcessOptions {
            nt: self.nt,
            bootstrap_sample_count: self.bootstrap_sample_count,
            seed: self.seed,
            selection: self.selection.clone(),
            plateau_start: settings.plateau_start,
            plateau_end: settings.plateau_end,
            optimizer_intensity: settings.optimizer_intensity,
            eff_mass_plot_ymin: settings.eff_mass_plot_ymin,
            eff_mass_plot_ymax: settings.eff_mass_plot_ymax,
            correlator_lowerbound: settings.correlator_lowerbound,
            correlator_upperbound: settings.correlator_upperbound,
            output_prefix: self.output_prefix.clone(),
            threads: self.threads,
            max_failed_fraction: self.max_failed_fraction,
            verbosity: self.verbosity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_a_minimal_document() {
        let config = AnalysisConfig::from_yaml_str("nt: 48\nchannels:\n  g5: {}\n").unwrap();
        assert_eq!(config.bootstrap_sample_count, 200);
        assert_eq!(config.selection, ConfigurationSelection::default());
        assert_eq!(config.verbosity, Verbosity::Normal);
        let options = config.process_options("g5");
        assert_eq!(options.plateau_start, None);
        assert_eq!(options.correlator_lowerbound, Some(0.0));
        assert_eq!(options.optimizer_intensity, Intensity::Default);
    }

    #[test]
    fn channel_settings_are_read() {
        let yaml = r#"
nt: 48
seed: 42
verbosity: debug
selection:
  initial_configuration: 100
  configuration_separation: 2
channels:
  g5:
    plateau_start: 12
    plateau_end: 20
    optimizer_intensity: intense
    eff_mass_plot_ymin: 0.3
"#;
        let config = AnalysisConfig::from_yaml_str(yaml).unwrap();
        let options = config.process_options("g5");
        assert_eq!(options.plateau_start, Some(12));
        assert_eq!(options.plateau_end, Some(20));
        assert_eq!(options.optimizer_intensity, Intensity::Intense);
        assert_eq!(options.seed, 42);
        assert_eq!(options.selection.initial_configuration, 100);
        assert_eq!(options.verbosity, Verbosity::Debug);
    }

    #[test]
    fn bad_selection_is_a_config_error() {
        let yaml = "nt: 48\nselection:\n  configuration_separation: 2\n  ensemble_selection: 2\n";
        let err = AnalysisConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, SpnError::Config(_)));
        assert_eq!(err.code(), "bad-ensemble-selection");
    }

    #[test]
    fn unknown_channel_without_descriptor_fails() {
        let config = AnalysisConfig::from_yaml_str("nt: 48\nchannels:\n  g7: {}\n").unwrap();
        assert_eq!(config.channel_spec("g7").unwrap_err().code(), "unknown-channel");
        assert_eq!(config.channel_spec("id").unwrap().name(), "id");
    }
}
