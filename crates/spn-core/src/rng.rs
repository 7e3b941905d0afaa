//! Seeded random streams for resampling and fitting.
//!
//! One master seed drives a whole analysis. The bootstrap draws from the
//! master stream itself; every fit gets its own substream, numbered so that the
//! central fit is stream 0 and per-draw fit `b` is stream `b + 1`.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// `StdRng` behind a seeding policy.
///
/// Substream seeds hash `(master_seed, substream)` with SipHash-1-3 under zero
/// keys, so a per-draw fit sees the same stream whichever worker thread runs
/// it.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Stream seeded directly with `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Numbered substream of `master_seed`.
    pub fn substream(master_seed: u64, substream: u64) -> Self {
        Self::from_seed(derive_substream_seed(master_seed, substream))
    }

    /// Optimiser stream of the fit against the bootstrap means.
    pub fn central_fit(master_seed: u64) -> Self {
        Self::substream(master_seed, 0)
    }

    /// Optimiser stream of the fit against bootstrap draw `draw`.
    pub fn draw_fit(master_seed: u64, draw: usize) -> Self {
        Self::substream(master_seed, draw as u64 + 1)
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Seed of substream `substream` of `master_seed`.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}
