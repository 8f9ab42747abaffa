//! Goodness-of-fit scores between observed and simulated values.
//!
//! Every score is `Option<f64>`; `None` marks a score that is undefined for
//! the input (too few points or zero variance) instead of NaN or infinity.

use crate::align::CompletePairs;
use serde::Serialize;

/// Decimal places kept by [`score`].
pub const DEFAULT_DECIMALS: u32 = 3;

/// Scores of one station.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricsResult {
    #[serde(rename = "KGE")]
    pub kge: Option<f64>,
    /// Pearson correlation
    pub r: Option<f64>,
    /// std(sim) / std(obs)
    pub alpha: Option<f64>,
    /// mean(sim) / mean(obs)
    pub beta: Option<f64>,
    #[serde(rename = "NSE")]
    pub nse: Option<f64>,
    #[serde(rename = "R2")]
    pub r2: Option<f64>,
    #[serde(rename = "MSE")]
    pub mse: Option<f64>,
    #[serde(rename = "RMSE")]
    pub rmse: Option<f64>,
    /// RMSE divided by the sample standard deviation of the observations
    #[serde(rename = "RRMSE_std")]
    pub rrmse_std: Option<f64>,
    /// Number of pairs scored
    pub points: usize,
}

impl MetricsResult {
    /// Name and value of every score in output order.
    pub fn fields(&self) -> [(&'static str, Option<f64>); 9] {
        [
            ("KGE", self.kge),
            ("r", self.r),
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("NSE", self.nse),
            ("R2", self.r2),
            ("MSE", self.mse),
            ("RMSE", self.rmse),
            ("RRMSE_std", self.rrmse_std),
        ]
    }

    pub fn rounded(&self, decimals: u32) -> Self {
        let round = |v: Option<f64>| v.map(|x| round_to(x, decimals));
        Self {
            kge: round(self.kge),
            r: round(self.r),
            alpha: round(self.alpha),
            beta: round(self.beta),
            nse: round(self.nse),
            r2: round(self.r2),
            mse: round(self.mse),
            rmse: round(self.rmse),
            rrmse_std: round(self.rrmse_std),
            points: self.points,
        }
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sum_sq_dev(values: &[f64], m: f64) -> f64 {
    values.iter().map(|v| (v - m).powi(2)).sum()
}

/// Population standard deviation.
fn std_pop(values: &[f64]) -> f64 {
    (sum_sq_dev(values, mean(values)) / values.len() as f64).sqrt()
}

/// Sample standard deviation (n - 1 denominator).
fn std_sample(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    finite((sum_sq_dev(values, mean(values)) / (values.len() - 1) as f64).sqrt())
}

/// Mean squared error.
pub fn mse(observed: &[f64], simulated: &[f64]) -> Option<f64> {
    if observed.is_empty() {
        return None;
    }
    let sum: f64 = observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - s).powi(2))
        .sum();
    finite(sum / observed.len() as f64)
}

/// Pearson correlation, undefined when either series is constant.
pub fn correlation(observed: &[f64], simulated: &[f64]) -> Option<f64> {
    if observed.len() < 2 {
        return None;
    }
    let mean_o = mean(observed);
    let mean_s = mean(simulated);
    let var_o = sum_sq_dev(observed, mean_o);
    let var_s = sum_sq_dev(simulated, mean_s);
    if var_o == 0.0 || var_s == 0.0 {
        return None;
    }
    let cov: f64 = observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - mean_o) * (s - mean_s))
        .sum();
    finite(cov / (var_o * var_s).sqrt())
}

/// Nash-Sutcliffe Efficiency. Range: (-inf, 1], 1 = perfect.
pub fn nse(observed: &[f64], simulated: &[f64]) -> Option<f64> {
    if observed.len() < 2 {
        return None;
    }
    let denominator = sum_sq_dev(observed, mean(observed));
    if denominator == 0.0 {
        return None;
    }
    let numerator: f64 = observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - s).powi(2))
        .sum();
    finite(1.0 - numerator / denominator)
}

/// Kling-Gupta Efficiency with its components `(kge, r, alpha, beta)`.
pub fn kge(
    observed: &[f64],
    simulated: &[f64],
) -> (Option<f64>, Option<f64>, Option<f64>, Option<f64>) {
    if observed.len() < 2 {
        return (None, None, None, None);
    }
    let r = correlation(observed, simulated);

    let std_o = std_pop(observed);
    let mean_o = mean(observed);
    let (alpha, beta) = if std_o == 0.0 {
        (None, None)
    } else {
        let alpha = finite(std_pop(simulated) / std_o);
        let beta = if mean_o == 0.0 {
            None
        } else {
            finite(mean(simulated) / mean_o)
        };
        (alpha, beta)
    };

    let kge = match (r, alpha, beta) {
        (Some(r), Some(a), Some(b)) => {
            finite(1.0 - ((r - 1.0).powi(2) + (a - 1.0).powi(2) + (b - 1.0).powi(2)).sqrt())
        }
        _ => None,
    };
    (kge, r, alpha, beta)
}

/// Compute all scores, rounded to [`DEFAULT_DECIMALS`] places.
pub fn score(pairs: &CompletePairs) -> MetricsResult {
    score_with_decimals(pairs, DEFAULT_DECIMALS)
}

/// Compute all scores, rounded to `decimals` places.
pub fn score_with_decimals(pairs: &CompletePairs, decimals: u32) -> MetricsResult {
    let observed = pairs.observed();
    let simulated = pairs.simulated();

    let (kge, r, alpha, beta) = kge(observed, simulated);
    let mse = mse(observed, simulated);
    let rmse = mse.map(f64::sqrt);
    let rrmse_std = match (rmse, std_sample(observed)) {
        (Some(rmse), Some(std)) if std > 0.0 => finite(rmse / std),
        _ => None,
    };

    MetricsResult {
        kge,
        r,
        alpha,
        beta,
        nse: nse(observed, simulated),
        r2: r.map(|r| r * r),
        mse,
        rmse,
        rrmse_std,
        points: pairs.len(),
    }
    .rounded(decimals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pairs(obs: &[f64], sim: &[f64]) -> CompletePairs {
        CompletePairs::from_values(obs, sim).unwrap()
    }

    #[test]
    fn identical_series_score_perfectly() {
        let obs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let result = score(&pairs(&obs, &obs));
        assert_eq!(result.nse, Some(1.0));
        assert_eq!(result.r2, Some(1.0));
        assert_eq!(result.kge, Some(1.0));
        assert_eq!(result.mse, Some(0.0));
        assert_eq!(result.rmse, Some(0.0));
        assert_eq!(result.rrmse_std, Some(0.0));
        assert_eq!(result.points, 5);
    }

    #[test]
    fn one_point_off_known_values() {
        // mean_obs = 3, mean_sim = 3.2, var_obs = 2, var_sim = 2.96, cov = 2.4
        let obs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let sim = [1.0, 2.0, 3.0, 4.0, 6.0];
        let result = score(&pairs(&obs, &sim));
        assert_eq!(result.mse, Some(0.2));
        assert_eq!(result.rmse, Some(0.447));
        assert_eq!(result.nse, Some(0.9));
        assert_eq!(result.r, Some(0.986));
        assert_eq!(result.r2, Some(0.973));
        assert_eq!(result.alpha, Some(1.217));
        assert_eq!(result.beta, Some(1.067));
        assert_eq!(result.kge, Some(0.773));
        assert_eq!(result.rrmse_std, Some(0.283));
    }

    #[test]
    fn constant_observations_leave_ratios_undefined() {
        let obs = [5.0; 5];
        let sim = [1.0, 2.0, 3.0, 4.0, 5.0];
        let result = score(&pairs(&obs, &sim));
        assert_eq!(result.rrmse_std, None);
        assert_eq!(result.beta, None);
        assert_eq!(result.alpha, None);
        assert_eq!(result.r, None);
        assert_eq!(result.nse, None);
        assert_eq!(result.kge, None);
        assert_eq!(result.mse, Some(6.0));
    }

    #[test]
    fn zero_mean_observations_leave_beta_undefined() {
        let obs = [-1.0, 1.0, -1.0, 1.0];
        let sim = [-1.0, 1.0, -1.0, 1.5];
        let (kge, r, alpha, beta) = kge(&obs, &sim);
        assert!(r.is_some());
        assert!(alpha.is_some());
        assert_eq!(beta, None);
        assert_eq!(kge, None);
    }

    #[test]
    fn single_point_only_errors_defined() {
        let result = score(&pairs(&[2.0], &[3.0]));
        assert_eq!(result.mse, Some(1.0));
        assert_eq!(result.rmse, Some(1.0));
        assert_eq!(result.kge, None);
        assert_eq!(result.nse, None);
        assert_eq!(result.r2, None);
        assert_eq!(result.rrmse_std, None);
    }

    #[test]
    fn empty_input_is_all_undefined() {
        let result = score(&CompletePairs::default());
        assert_eq!(result, MetricsResult::default());
    }

    #[test]
    fn nse_mean_simulation_gives_zero() {
        let obs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let sim = [3.0; 5];
        assert_relative_eq!(nse(&obs, &sim).unwrap(), 0.0, epsilon = 1e-10);
        // constant simulation has no correlation
        assert_eq!(correlation(&obs, &sim), None);
    }

    #[test]
    fn kge_bias_only() {
        let obs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let sim = [2.0, 3.0, 4.0, 5.0, 6.0];
        let (kge, r, alpha, beta) = kge(&obs, &sim);
        assert_relative_eq!(r.unwrap(), 1.0, epsilon = 1e-10);
        assert_relative_eq!(alpha.unwrap(), 1.0, epsilon = 1e-10);
        assert_relative_eq!(beta.unwrap(), 4.0 / 3.0, epsilon = 1e-10);
        assert_relative_eq!(kge.unwrap(), 2.0 / 3.0, epsilon = 1e-10);
    }

    #[test]
    fn rounding_is_applied_at_the_boundary() {
        assert_eq!(round_to(0.4472135954999579, 3), 0.447);
        assert_eq!(round_to(1.2165525060596438, 2), 1.22);
        let obs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let sim = [1.0, 2.0, 3.0, 4.0, 6.0];
        let result = score_with_decimals(&pairs(&obs, &sim), 1);
        assert_eq!(result.rmse, Some(0.4));
    }

    #[test]
    fn serializes_undefined_as_null() {
        let result = score(&pairs(&[5.0, 5.0], &[4.0, 6.0]));
        let json = serde_json::to_value(result).unwrap();
        assert!(json["RRMSE_std"].is_null());
        assert_eq!(json["MSE"], 1.0);
    }
}
