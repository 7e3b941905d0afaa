use serde::Serialize;
use spn_core::errors::{ErrorInfo, SpnError};

/// Closed interval of time slices `[start, end]` used as the fit domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlateauWindow {
    start: usize,
    end: usize,
}

impl PlateauWindow {
    /// Validates `start < end <= NT - 1`.
    ///
    /// The window is picked by a person reading an effective-mass plot, so a
    /// bad window is a usage error reported before any work is done.
    pub fn new(start: usize, end: usize, nt: usize) -> Result<Self, SpnError> {
        if start >= end || end >= nt {
            return Err(SpnError::Window(
                ErrorInfo::new(
                    "bad-window",
                    "plateau window must satisfy start < end <= NT - 1",
                )
                .with_context("start", start)
                .with_context("end", end)
                .with_context("nt", nt)
                .with_hint("pick the window from the effective-mass plot"),
            ));
        }
        Ok(Self { start, end })
    }

    /// First slice of the window.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Last slice of the window (inclusive).
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of slices covered.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false; a valid window covers at least two slices.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterator over the covered slices.
    pub fn slices(&self) -> impl Iterator<Item = usize> {
        self.start..=self.end
    }
}
