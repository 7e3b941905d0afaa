#![deny(missing_docs)]
#![doc = "Shared error taxonomy, deterministic seeding and provenance records for the spn meson analysis crates."]

pub mod errors;
pub mod provenance;
pub mod rng;

pub use errors::{ErrorInfo, SpnError};
pub use provenance::{RunProvenance, Verbosity};
pub use rng::{derive_substream_seed, RngHandle};
