use serde::{Deserialize, Serialize};

/// Per time-slice mean and bootstrap error of a resampled quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledStatistic {
    /// Mean over draws for every slice.
    pub mean: Vec<f64>,
    /// Standard deviation over draws for every slice.
    pub error: Vec<f64>,
}

impl ResampledStatistic {
    /// Reduces a `draws x slices` array column by column.
    ///
    /// Every draw must have the same length; an empty array yields an empty
    /// statistic.
    pub fn from_draws(draws: &[Vec<f64>]) -> Self {
        let width = draws.first().map(Vec::len).unwrap_or(0);
        let mut column = Vec::with_capacity(draws.len());
        let mut mean = Vec::with_capacity(width);
        let mut error = Vec::with_capacity(width);
        for t in 0..width {
            column.clear();
            column.extend(draws.iter().map(|draw| draw[t]));
            let (m, e) = mean_and_error(&column);
            mean.push(m);
            error.push(e);
        }
        Self { mean, error }
    }

    /// Number of slices.
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    /// Returns true when no slices are present.
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }
}

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by the number of draws).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let centre = mean(values);
    let var = values
        .iter()
        .map(|value| (value - centre) * (value - centre))
        .sum::<f64>()
        / values.len() as f64;
    var.sqrt()
}

/// Mean and population standard deviation in one call.
pub fn mean_and_error(values: &[f64]) -> (f64, f64) {
    (mean(values), std_dev(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_columns_independently() {
        let draws = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let stat = ResampledStatistic::from_draws(&draws);
        assert_eq!(stat.mean, vec![2.0, 10.0]);
        assert_eq!(stat.error, vec![1.0, 0.0]);
    }

    #[test]
    fn empty_inputs_are_nan() {
        assert!(mean(&[]).is_nan());
        assert!(std_dev(&[]).is_nan());
        assert!(ResampledStatistic::from_draws(&[]).is_empty());
    }
}
