//! Provenance and verbosity descriptors shared across spn reports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provenance information attached to every finished analysis report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Master deterministic seed used for bootstrap draws and optimiser streams.
    pub seed: u64,
    /// Number of bootstrap draws requested.
    pub bootstrap_samples: usize,
    /// Number of configurations surviving thinning.
    pub configurations: usize,
    /// Version map for the crates involved in the run.
    pub tool_versions: BTreeMap<String, String>,
}

impl RunProvenance {
    /// Creates a provenance record stamped with this crate's version.
    pub fn new(seed: u64, bootstrap_samples: usize, configurations: usize) -> Self {
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert(
            "spn-core".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        Self {
            seed,
            bootstrap_samples,
            configurations,
            tool_versions,
        }
    }
}

/// Verbosity of progress messages emitted by the analysis pipeline.
///
/// Threaded explicitly through the analysis options; callers decide per
/// message whether it is emitted, so no module keeps a global debug switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Only warnings are reported.
    Quiet,
    /// Stage-level progress is reported.
    #[default]
    Normal,
    /// Per-stage diagnostics (draw counts, conditioning, optimiser effort).
    Debug,
}

impl Verbosity {
    /// Returns true when stage-level progress should be reported.
    pub fn progress(&self) -> bool {
        *self >= Verbosity::Normal
    }

    /// Returns true when detailed diagnostics should be reported.
    pub fn diagnostics(&self) -> bool {
        *self >= Verbosity::Debug
    }
}
