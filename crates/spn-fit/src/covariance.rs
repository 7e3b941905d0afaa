//! Windowed data vectors and the bootstrap covariance between them.
//!
//! The fit domain is every `(channel, t)` pair with `t` inside the plateau
//! window, concatenated channel by channel. The covariance is estimated from
//! the bootstrap draws over that whole domain, so correlations across time
//! slices and across channels enter the chi-square.

use log::debug;
use nalgebra::{Cholesky, DMatrix, DVector};
use serde::Serialize;
use spn_boot::ChannelDraws;
use spn_core::errors::{ErrorInfo, SpnError};

use crate::window::PlateauWindow;

/// Relative cutoff below which a pivot or singular value of the correlation
/// matrix counts as zero.
const RCOND: f64 = 1e-12;

/// How the inverse covariance was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InversionMethod {
    /// Cholesky factorisation of the correlation matrix succeeded.
    Cholesky,
    /// The correlation matrix was singular or nearly so; an SVD
    /// pseudo-inverse was used instead.
    PseudoInverse,
}

/// Data restricted to the plateau window, ready for chi-square evaluation.
#[derive(Debug, Clone)]
pub struct WindowedData {
    points: Vec<(usize, usize)>,
    central: DVector<f64>,
    draws: Vec<DVector<f64>>,
    covariance: DMatrix<f64>,
    inverse: DMatrix<f64>,
    method: InversionMethod,
}

impl WindowedData {
    /// Gathers the windowed means and draws of `channels` and inverts their
    /// covariance.
    pub fn new(channels: &[&ChannelDraws], window: PlateauWindow) -> Result<Self, SpnError> {
        let Some(first) = channels.first() else {
            return Err(fit_error("no-channels", "a fit needs at least one channel"));
        };
        let draw_count = first.draws.len();
        if draw_count < 2 {
            return Err(SpnError::Fit(
                ErrorInfo::new(
                    "too-few-draws",
                    "covariance estimation needs at least two bootstrap draws",
                )
                .with_context("draws", draw_count),
            ));
        }
        for channel in channels {
            if channel.draws.len() != draw_count {
                return Err(SpnError::Fit(
                    ErrorInfo::new("draw-count-mismatch", "channels must share their draws")
                        .with_context("channel", &channel.name)
                        .with_context("expected", draw_count)
                        .with_context("found", channel.draws.len()),
                ));
            }
            if window.end() >= channel.nt() {
                return Err(SpnError::Window(
                    ErrorInfo::new("bad-window", "plateau window exceeds the channel extent")
                        .with_context("channel", &channel.name)
                        .with_context("end", window.end())
                        .with_context("nt", channel.nt()),
                ));
            }
        }

        let points: Vec<(usize, usize)> = (0..channels.len())
            .flat_map(|index| window.slices().map(move |t| (index, t)))
            .collect();
        let central = DVector::from_iterator(
            points.len(),
            points.iter().map(|&(c, t)| channels[c].means()[t]),
        );
        let draws: Vec<DVector<f64>> = (0..draw_count)
            .map(|b| {
                DVector::from_iterator(
                    points.len(),
                    points.iter().map(|&(c, t)| channels[c].draws[b][t]),
                )
            })
            .collect();

        let covariance = sample_covariance(&draws);
        let (inverse, method) = invert_covariance(&covariance)?;
        debug!(
            "windowed covariance over {} points from {} draws, inverted by {:?}",
            points.len(),
            draw_count,
            method
        );

        Ok(Self {
            points,
            central,
            draws,
            covariance,
            inverse,
            method,
        })
    }

    /// `(channel index, time slice)` of every entry of the data vector.
    pub fn points(&self) -> &[(usize, usize)] {
        &self.points
    }

    /// Number of data points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true when the data vector is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Windowed bootstrap means.
    pub fn central(&self) -> &DVector<f64> {
        &self.central
    }

    /// Windowed data vector of every draw.
    pub fn draws(&self) -> &[DVector<f64>] {
        &self.draws
    }

    /// Covariance over draws (unbiased, divides by `B - 1`).
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Inverse covariance used as the chi-square metric.
    pub fn inverse(&self) -> &DMatrix<f64> {
        &self.inverse
    }

    /// How the inverse was obtained.
    pub fn method(&self) -> InversionMethod {
        self.method
    }
}

fn fit_error(code: &str, message: &str) -> SpnError {
    SpnError::Fit(ErrorInfo::new(code, message))
}

fn sample_covariance(draws: &[DVector<f64>]) -> DMatrix<f64> {
    let dim = draws[0].len();
    let count = draws.len() as f64;
    let mut mean = DVector::zeros(dim);
    for draw in draws {
        mean += draw;
    }
    mean /= count;
    let mut m2 = DMatrix::zeros(dim, dim);
    for draw in draws {
        let delta = draw - &mean;
        m2 += &delta * delta.transpose();
    }
    m2 / (count - 1.0)
}

/// Inverts through the correlation matrix `R = D^-1 S D^-1` with
/// `D = diag(sigma)`, so the conditioning test does not depend on the very
/// different magnitudes of correlator values along `t`.
fn invert_covariance(
    covariance: &DMatrix<f64>,
) -> Result<(DMatrix<f64>, InversionMethod), SpnError> {
    let dim = covariance.nrows();
    let mut sigma = DVector::zeros(dim);
    for i in 0..dim {
        let var = covariance[(i, i)];
        if !(var.is_finite() && var > 0.0) {
            return Err(SpnError::Fit(
                ErrorInfo::new(
                    "degenerate-covariance",
                    "a windowed point has zero or undefined spread over the draws",
                )
                .with_context("point", i)
                .with_context("variance", var)
                .with_hint("check that the correlator varies between configurations"),
            ));
        }
        sigma[i] = var.sqrt();
    }

    let mut correlation = covariance.clone();
    for i in 0..dim {
        for j in 0..dim {
            correlation[(i, j)] /= sigma[i] * sigma[j];
        }
    }

    let factor = Cholesky::new(correlation.clone()).filter(|factor| {
        factor
            .l_dirty()
            .diagonal()
            .iter()
            .all(|pivot| pivot * pivot > RCOND)
    });
    let (mut inverse, method) = match factor {
        Some(factor) => (factor.inverse(), InversionMethod::Cholesky),
        None => {
            let svd = correlation.svd(true, true);
            let largest = svd.singular_values.max();
            if !(largest.is_finite() && largest > 0.0) {
                return Err(fit_error(
                    "degenerate-covariance",
                    "correlation matrix has no positive singular value",
                ));
            }
            let pinv = svd
                .pseudo_inverse(largest * RCOND)
                .map_err(|msg| fit_error("degenerate-covariance", msg))?;
            (pinv, InversionMethod::PseudoInverse)
        }
    };

    for i in 0..dim {
        for j in 0..dim {
            inverse[(i, j)] /= sigma[i] * sigma[j];
        }
    }
    Ok((inverse, method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spn_boot::ResampledStatistic;

    fn channel(name: &str, draws: Vec<Vec<f64>>) -> ChannelDraws {
        let statistic = ResampledStatistic::from_draws(&draws);
        ChannelDraws {
            name: name.into(),
            draws,
            statistic,
        }
    }

    #[test]
    fn covariance_matches_hand_computation() {
        let a = channel("a", vec![vec![0.0, 1.0, 2.0], vec![0.0, 3.0, 2.0], vec![0.0, 2.0, 5.0]]);
        let window = PlateauWindow::new(1, 2, 3).unwrap();
        let data = WindowedData::new(&[&a], window).unwrap();
        assert_eq!(data.points(), &[(0, 1), (0, 2)]);
        let cov = data.covariance();
        assert!((cov[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((cov[(1, 1)] - 3.0).abs() < 1e-12);
        assert!((cov[(0, 1)] - 0.0).abs() < 1e-12);
        let product = cov * data.inverse();
        assert!((product - DMatrix::identity(2, 2)).abs().max() < 1e-10);
        assert_eq!(data.method(), InversionMethod::Cholesky);
    }

    #[test]
    fn cross_channel_terms_are_kept() {
        let a = channel("a", vec![vec![1.0, 1.0], vec![2.0, 3.0], vec![3.0, 2.0]]);
        let b = channel("b", vec![vec![2.0, 0.0], vec![4.0, 1.0], vec![6.0, 5.0]]);
        let window = PlateauWindow::new(0, 1, 2).unwrap();
        let data = WindowedData::new(&[&a, &b], window).unwrap();
        assert_eq!(data.len(), 4);
        // a(t=0) and b(t=0) move together.
        assert!(data.covariance()[(0, 2)] > 0.0);
    }

    #[test]
    fn rank_deficient_covariance_falls_back_to_pseudo_inverse() {
        // Two draws give a rank-one covariance over two points.
        let a = channel("a", vec![vec![1.0, 2.0], vec![2.0, 4.0]]);
        let window = PlateauWindow::new(0, 1, 2).unwrap();
        let data = WindowedData::new(&[&a], window).unwrap();
        assert_eq!(data.method(), InversionMethod::PseudoInverse);
        assert!(data.inverse().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn constant_point_is_degenerate() {
        let a = channel("a", vec![vec![1.0, 2.0], vec![1.0, 4.0], vec![1.0, 3.0]]);
        let window = PlateauWindow::new(0, 1, 2).unwrap();
        let err = WindowedData::new(&[&a], window).unwrap_err();
        assert_eq!(err.code(), "degenerate-covariance");
    }

    #[test]
    fn single_draw_is_rejected() {
        let a = channel("a", vec![vec![1.0, 2.0]]);
        let window = PlateauWindow::new(0, 1, 2).unwrap();
        assert_eq!(
            WindowedData::new(&[&a], window).unwrap_err().code(),
            "too-few-draws"
        );
    }
}
