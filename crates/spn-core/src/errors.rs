//! Error families of the meson analysis.
//!
//! Every failure carries a stable kebab-case code (`bad-window`,
//! `too-many-failed-draws`, `unknown-channel`, ...) plus the channel,
//! correlator or size it concerns, so the driver can log a failing channel and
//! move on to the next one.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code, message and context of an [`SpnError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Kebab-case code that tests and callers match on.
    pub code: String,
    /// What went wrong, in words.
    pub message: String,
    /// Channel, correlator, window bound or count the failure refers to,
    /// rendered as strings and keyed by name.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Suggested remedy, e.g. widening the plateau or raising the intensity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Payload with no context yet.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Records `key = value`; any displayable value is accepted.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Attaches a suggested remedy.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the spn analysis crates.
///
/// Every variant is a hard failure. The "plateau window not chosen yet"
/// condition is not an error and is modelled as an outcome by the driver
/// crate instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SpnError {
    /// Malformed correlator input (shape mismatches, empty sets, bad thinning).
    #[error("data error: {0}")]
    Data(ErrorInfo),
    /// Plateau window outside the time extent or with start >= end.
    #[error("window error: {0}")]
    Window(ErrorInfo),
    /// Fit setup problems or too many non-converging draws.
    #[error("fit error: {0}")]
    Fit(ErrorInfo),
    /// Invalid channel descriptors or analysis configuration.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Serialisation and I/O errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl SpnError {
    /// Payload regardless of family.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SpnError::Data(info)
            | SpnError::Window(info)
            | SpnError::Fit(info)
            | SpnError::Config(info)
            | SpnError::Serde(info) => info,
        }
    }

    /// Shorthand for `info().code`.
    pub fn code(&self) -> &str {
        &self.info().code
    }
}
