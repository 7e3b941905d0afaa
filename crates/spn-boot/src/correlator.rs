use std::fmt;

use serde::{Deserialize, Serialize};
use spn_core::errors::{ErrorInfo, SpnError};

fn data_error(code: &str, message: impl Into<String>) -> SpnError {
    SpnError::Data(ErrorInfo::new(code, message.into()))
}

fn default_separation() -> usize {
    1
}

/// Time-reversal behaviour of a channel under t -> NT - t.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Symmetry {
    /// C(NT - t) = C(t).
    Symmetric,
    /// C(NT - t) = -C(t).
    Antisymmetric,
}

impl Symmetry {
    /// Sign applied to the partner slice when folding.
    pub fn sign(&self) -> f64 {
        match self {
            Symmetry::Symmetric => 1.0,
            Symmetry::Antisymmetric => -1.0,
        }
    }
}

impl TryFrom<i8> for Symmetry {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Symmetry::Symmetric),
            -1 => Ok(Symmetry::Antisymmetric),
            other => Err(format!("symmetry sign must be +1 or -1, got {other}")),
        }
    }
}

impl From<Symmetry> for i8 {
    fn from(value: Symmetry) -> Self {
        match value {
            Symmetry::Symmetric => 1,
            Symmetry::Antisymmetric => -1,
        }
    }
}

impl fmt::Display for Symmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symmetry::Symmetric => write!(f, "+1"),
            Symmetry::Antisymmetric => write!(f, "-1"),
        }
    }
}

/// Folds a single correlator onto itself under time reversal.
///
/// Slice `t` is averaged with `(NT - t) mod NT` after multiplying the partner
/// by the symmetry sign. Slices that are their own partner (`t = 0`, and
/// `t = NT/2` for even `NT`) are copied unchanged. The output keeps length
/// `NT`, so folding already folded data is a no-op.
pub fn symmetrize(values: &[f64], symmetry: Symmetry) -> Vec<f64> {
    let nt = values.len();
    let sign = symmetry.sign();
    (0..nt)
        .map(|t| {
            let partner = (nt - t) % nt;
            if partner == t {
                values[t]
            } else {
                0.5 * (values[t] + sign * values[partner])
            }
        })
        .collect()
}

/// Which configurations of a stream enter the analysis.
///
/// Configuration `i` is kept when
/// `i >= initial_configuration + ensemble_selection` and
/// `(i - initial_configuration - ensemble_selection) % configuration_separation == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSelection {
    /// Number of leading configurations discarded as thermalisation.
    #[serde(default)]
    pub initial_configuration: usize,
    /// Stride between retained configurations.
    #[serde(default = "default_separation")]
    pub configuration_separation: usize,
    /// Residue class picked out of each stride; ranges over `0..separation`.
    #[serde(default)]
    pub ensemble_selection: usize,
}

impl Default for ConfigurationSelection {
    fn default() -> Self {
        Self {
            initial_configuration: 0,
            configuration_separation: default_separation(),
            ensemble_selection: 0,
        }
    }
}

impl ConfigurationSelection {
    /// Checks that the stride is positive and the residue lies inside it.
    pub fn validate(&self) -> Result<(), SpnError> {
        if self.configuration_separation == 0 {
            return Err(data_error(
                "bad-separation",
                "configuration separation must be at least 1",
            ));
        }
        if self.ensemble_selection >= self.configuration_separation {
            return Err(SpnError::Data(
                ErrorInfo::new(
                    "bad-ensemble-selection",
                    "ensemble selection must be smaller than the configuration separation",
                )
                .with_context("ensemble_selection", self.ensemble_selection)
                .with_context("configuration_separation", self.configuration_separation),
            ));
        }
        Ok(())
    }

    /// Indices retained out of a stream of `count` configurations.
    pub fn indices(&self, count: usize) -> impl Iterator<Item = usize> {
        let start = self.initial_configuration + self.ensemble_selection;
        (start..count).step_by(self.configuration_separation.max(1))
    }
}

/// Per-configuration correlator vectors for one channel.
///
/// Every configuration has the same time extent `NT`; the set is immutable
/// once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawCorrelatorSet {
    name: String,
    nt: usize,
    configurations: Vec<Vec<f64>>,
}

impl RawCorrelatorSet {
    /// Builds a set after checking it is non-empty and rectangular.
    pub fn new(name: impl Into<String>, configurations: Vec<Vec<f64>>) -> Result<Self, SpnError> {
        let name = name.into();
        let Some(first) = configurations.first() else {
            return Err(SpnError::Data(
                ErrorInfo::new("empty-correlator", "correlator set has no configurations")
                    .with_context("channel", &name),
            ));
        };
        let nt = first.len();
        if nt < 2 {
            return Err(SpnError::Data(
                ErrorInfo::new("short-correlator", "correlators need at least two time slices")
                    .with_context("channel", &name)
                    .with_context("nt", nt),
            ));
        }
        if let Some((index, row)) = configurations
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != nt)
        {
            return Err(SpnError::Data(
                ErrorInfo::new(
                    "ragged-correlator",
                    "all configurations must share the same time extent",
                )
                .with_context("channel", &name)
                .with_context("configuration", index)
                .with_context("expected", nt)
                .with_context("found", row.len()),
            ));
        }
        Ok(Self {
            name,
            nt,
            configurations,
        })
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time extent of every configuration.
    pub fn nt(&self) -> usize {
        self.nt
    }

    /// Number of configurations.
    pub fn config_count(&self) -> usize {
        self.configurations.len()
    }

    /// Borrow the per-configuration vectors.
    pub fn configurations(&self) -> &[Vec<f64>] {
        &self.configurations
    }

    /// Direct (non-resampled) mean over configurations per time slice.
    pub fn sample_mean(&self) -> Vec<f64> {
        let count = self.configurations.len() as f64;
        let mut mean = vec![0.0; self.nt];
        for row in &self.configurations {
            for (acc, value) in mean.iter_mut().zip(row) {
                *acc += value;
            }
        }
        mean.iter_mut().for_each(|value| *value /= count);
        mean
    }

    /// Folds every configuration with the channel's symmetry sign.
    pub fn symmetrized(&self, symmetry: Symmetry) -> Self {
        Self {
            name: self.name.clone(),
            nt: self.nt,
            configurations: self
                .configurations
                .iter()
                .map(|row| symmetrize(row, symmetry))
                .collect(),
        }
    }

    /// Keeps only the configurations picked by `selection`.
    pub fn thinned(&self, selection: &ConfigurationSelection) -> Result<Self, SpnError> {
        selection.validate()?;
        let configurations: Vec<Vec<f64>> = selection
            .indices(self.configurations.len())
            .map(|idx| self.configurations[idx].clone())
            .collect();
        if configurations.is_empty() {
            return Err(SpnError::Data(
                ErrorInfo::new(
                    "empty-selection",
                    "configuration selection leaves no configurations",
                )
                .with_context("channel", &self.name)
                .with_context("available", self.configurations.len())
                .with_context("initial_configuration", selection.initial_configuration),
            ));
        }
        Ok(Self {
            name: self.name.clone(),
            nt: self.nt,
            configurations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn antisymmetric_fold_negates_partner() {
        let values = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let folded = symmetrize(&values, Symmetry::Antisymmetric);
        assert_eq!(folded, vec![0.0, -2.0, -1.0, 3.0, 1.0, 2.0]);
    }

    #[test]
    fn symmetric_fold_keeps_self_partners() {
        let values = [9.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let folded = symmetrize(&values, Symmetry::Symmetric);
        assert_eq!(folded, vec![9.0, 3.0, 3.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn odd_extent_has_single_self_partner() {
        let values = [1.0, 2.0, 4.0, 6.0, 8.0];
        let folded = symmetrize(&values, Symmetry::Symmetric);
        assert_eq!(folded, vec![1.0, 5.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn symmetry_parses_from_sign() {
        assert_eq!(Symmetry::try_from(1).unwrap(), Symmetry::Symmetric);
        assert_eq!(Symmetry::try_from(-1).unwrap(), Symmetry::Antisymmetric);
        assert!(Symmetry::try_from(0).is_err());
        let parsed: Symmetry = serde_json::from_str("-1").unwrap();
        assert_eq!(parsed, Symmetry::Antisymmetric);
    }

    #[test]
    fn selection_picks_residue_class() {
        let selection = ConfigurationSelection {
            initial_configuration: 2,
            configuration_separation: 3,
            ensemble_selection: 1,
        };
        let picked: Vec<usize> = selection.indices(12).collect();
        assert_eq!(picked, vec![3, 6, 9]);
    }

    #[test]
    fn selection_rejects_residue_outside_stride() {
        let selection = ConfigurationSelection {
            initial_configuration: 0,
            configuration_separation: 2,
            ensemble_selection: 2,
        };
        let err = selection.validate().unwrap_err();
        assert_eq!(err.code(), "bad-ensemble-selection");
    }

    #[test]
    fn ragged_sets_are_rejected() {
        let err = RawCorrelatorSet::new("g5", vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert_eq!(err.code(), "ragged-correlator");
        assert_eq!(err.info().context["configuration"], "1");
    }

    #[test]
    fn thinning_everything_away_is_an_error() {
        let set = RawCorrelatorSet::new("g5", vec![vec![1.0, 2.0]; 3]).unwrap();
        let selection = ConfigurationSelection {
            initial_configuration: 5,
            ..ConfigurationSelection::default()
        };
        assert_eq!(set.thinned(&selection).unwrap_err().code(), "empty-selection");
    }
}
