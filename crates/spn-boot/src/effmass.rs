//! Effective masses from the hyperbolic ratio of neighbouring time slices.
//!
//! On a periodic lattice of extent `NT` a single state contributes
//! `A cosh(m (t - NT/2))` to a symmetric correlator (`sinh` for an
//! antisymmetric one). The effective mass at `t` is the `m` for which the ratio
//! of that shape at `t` and `t + 1` reproduces the measured `C(t) / C(t + 1)`.
//! There is no closed form, so the ratio equation is solved by bracketing and
//! bisection on `ln h(m p) - ln h(m q)`, which is monotone in `m`.
//!
//! A measured ratio the shape cannot produce (non-positive, on the wrong side
//! of one, or below the sinh limit `p / q`) yields NaN for that slice only.

use std::f64::consts::LN_2;

use serde::Serialize;

use crate::correlator::Symmetry;
use crate::stats::{mean_and_error, ResampledStatistic};

const MAX_BRACKET_DOUBLINGS: usize = 64;
const MAX_BISECTIONS: usize = 200;

/// Effective-mass series reduced over bootstrap draws.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveMass {
    /// Mean and standard deviation per slice over the draws where the mass is
    /// defined. Slices defined on fewer than half of the draws are NaN.
    pub statistic: ResampledStatistic,
    /// Number of draws contributing to each slice.
    pub defined_draws: Vec<usize>,
    /// Total number of draws.
    pub draw_count: usize,
}

/// Effective mass at slice `t` given the ratio `C(t) / C(t + 1)`.
pub fn effective_mass_at(ratio: f64, t: usize, nt: usize, symmetry: Symmetry) -> f64 {
    if !ratio.is_finite() || ratio <= 0.0 || t + 1 >= nt {
        return f64::NAN;
    }
    let half = nt as f64 / 2.0;
    let a = t as f64 - half;
    let b = a + 1.0;
    if symmetry == Symmetry::Antisymmetric && (a == 0.0 || b == 0.0 || a.signum() != b.signum())
    {
        return f64::NAN;
    }
    let (p, q, target) = if a.abs() > b.abs() {
        (a.abs(), b.abs(), ratio.ln())
    } else if a.abs() < b.abs() {
        (b.abs(), a.abs(), -ratio.ln())
    } else {
        return f64::NAN;
    };

    let floor = match symmetry {
        Symmetry::Symmetric => 0.0,
        Symmetry::Antisymmetric => (p / q).ln(),
    };
    if target <= floor {
        return f64::NAN;
    }

    let log_ratio = |m: f64| match symmetry {
        Symmetry::Symmetric => ln_cosh(m * p) - ln_cosh(m * q),
        Symmetry::Antisymmetric => ln_sinh(m * p) - ln_sinh(m * q),
    };

    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut doublings = 0;
    while log_ratio(hi) < target {
        lo = hi;
        hi *= 2.0;
        doublings += 1;
        if doublings > MAX_BRACKET_DOUBLINGS {
            return f64::NAN;
        }
    }
    for _ in 0..MAX_BISECTIONS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if log_ratio(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Effective-mass series of a single correlator; length `NT - 1`.
pub fn effective_mass(correlator: &[f64], symmetry: Symmetry) -> Vec<f64> {
    let nt = correlator.len();
    correlator
        .windows(2)
        .enumerate()
        .map(|(t, pair)| effective_mass_at(pair[0] / pair[1], t, nt, symmetry))
        .collect()
}

/// Applies [`effective_mass`] to every draw, then reduces per slice.
///
/// The nonlinear transform acts on each draw before any averaging, so the
/// spread of the result is the resampled spread of the mass itself.
pub fn bootstrap_eff_masses(draws: &[Vec<f64>], symmetry: Symmetry) -> EffectiveMass {
    let per_draw: Vec<Vec<f64>> = draws
        .iter()
        .map(|draw| effective_mass(draw, symmetry))
        .collect();
    let width = per_draw.first().map(Vec::len).unwrap_or(0);
    let draw_count = per_draw.len();

    let mut mean = Vec::with_capacity(width);
    let mut error = Vec::with_capacity(width);
    let mut defined_draws = Vec::with_capacity(width);
    let mut column = Vec::with_capacity(draw_count);
    for t in 0..width {
        column.clear();
        column.extend(per_draw.iter().map(|row| row[t]).filter(|v| v.is_finite()));
        defined_draws.push(column.len());
        if column.is_empty() || 2 * column.len() < draw_count {
            mean.push(f64::NAN);
            error.push(f64::NAN);
        } else {
            let (m, e) = mean_and_error(&column);
            mean.push(m);
            error.push(e);
        }
    }

    EffectiveMass {
        statistic: ResampledStatistic { mean, error },
        defined_draws,
        draw_count,
    }
}

fn ln_cosh(x: f64) -> f64 {
    let x = x.abs();
    x + (-2.0 * x).exp().ln_1p() - LN_2
}

fn ln_sinh(x: f64) -> f64 {
    if x < 1.0 {
        x.sinh().ln()
    } else {
        x + (-(-2.0 * x).exp()).ln_1p() - LN_2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosh_correlator(nt: usize, mass: f64, amplitude: f64) -> Vec<f64> {
        let half = nt as f64 / 2.0;
        (0..nt)
            .map(|t| amplitude * (mass * (t as f64 - half)).cosh())
            .collect()
    }

    fn sinh_correlator(nt: usize, mass: f64, amplitude: f64) -> Vec<f64> {
        let half = nt as f64 / 2.0;
        (0..nt)
            .map(|t| amplitude * (mass * (t as f64 - half)).sinh())
            .collect()
    }

    #[test]
    fn recovers_mass_from_exact_cosh() {
        let nt = 48;
        let mass = 0.37;
        let series = effective_mass(&cosh_correlator(nt, mass, 2.5), Symmetry::Symmetric);
        assert_eq!(series.len(), nt - 1);
        for (t, value) in series.iter().enumerate() {
            assert!(
                (value - mass).abs() < 1e-9,
                "slice {t}: expected {mass}, got {value}"
            );
        }
    }

    #[test]
    fn recovers_mass_from_exact_sinh_away_from_midpoint() {
        let nt = 32;
        let mass = 0.6;
        let series = effective_mass(&sinh_correlator(nt, mass, 1.5), Symmetry::Antisymmetric);
        for (t, value) in series.iter().enumerate() {
            if t + 1 == nt / 2 || t == nt / 2 {
                assert!(value.is_nan(), "slice {t} touches the zero of sinh");
            } else {
                assert!((value - mass).abs() < 1e-9, "slice {t}: got {value}");
            }
        }
    }

    #[test]
    fn out_of_range_ratios_are_undefined() {
        // Rising correlator in the first half cannot come from a cosh.
        assert!(effective_mass_at(0.8, 3, 48, Symmetry::Symmetric).is_nan());
        // Sign change between slices.
        assert!(effective_mass_at(-2.0, 3, 48, Symmetry::Symmetric).is_nan());
        // Exactly flat.
        assert!(effective_mass_at(1.0, 3, 48, Symmetry::Symmetric).is_nan());
        // Last slice has no partner.
        assert!(effective_mass_at(1.5, 47, 48, Symmetry::Symmetric).is_nan());
    }

    #[test]
    fn odd_extent_midpoint_is_undefined() {
        // a = -0.5, b = 0.5: the cosh ratio is identically one.
        assert!(effective_mass_at(1.2, 2, 5, Symmetry::Symmetric).is_nan());
    }

    #[test]
    fn bootstrap_reduction_skips_undefined_draws() {
        let nt = 16;
        let mut draws = vec![
            cosh_correlator(nt, 0.5, 1.0),
            cosh_correlator(nt, 0.5, 1.0),
            cosh_correlator(nt, 0.5, 1.0),
        ];
        draws[2][4] = -1.0;
        let reduced = bootstrap_eff_masses(&draws, Symmetry::Symmetric);
        assert_eq!(reduced.draw_count, 3);
        assert_eq!(reduced.defined_draws[3], 2);
        assert_eq!(reduced.defined_draws[0], 3);
        assert!((reduced.statistic.mean[3] - 0.5).abs() < 1e-9);
        assert!(reduced.statistic.error[0] < 1e-12);
    }

    #[test]
    fn mostly_undefined_slices_are_nan() {
        let nt = 8;
        let mut draws = vec![cosh_correlator(nt, 0.5, 1.0); 4];
        for draw in draws.iter_mut().take(3) {
            draw[1] = 0.0;
        }
        let reduced = bootstrap_eff_masses(&draws, Symmetry::Symmetric);
        assert_eq!(reduced.defined_draws[0], 1);
        assert!(reduced.statistic.mean[0].is_nan());
    }
}
