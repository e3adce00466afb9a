use serde::{Deserialize, Serialize};
use thiserror::Error;
/// Aggregator trait which reduces a series of portfolio returns to a single f64.
/// Volatility and the Sharpe ratio are built as returns + aggregators.
pub trait Aggregator: Sync + Send + std::fmt::Debug {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError>;
}

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("Number of periods is invalid for aggregator: `{0}`")]
    InvalidNumberOfPeriods(String),
    #[error("Weights and returns disagree on the number of assets ({weights} vs {assets})")]
    DimensionMismatch { weights: usize, assets: usize },
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct ArithmeticMean;
impl Aggregator for ArithmeticMean {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError> {
        if series.is_empty() {
            return Err(AggregatorError::InvalidNumberOfPeriods(
                "Mean cannot be computed for an empty series.".into(),
            ));
        }
        Ok(series.iter().sum::<f64>() / (series.len() as f64))
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct StandardDeviation;
impl Aggregator for StandardDeviation {
    fn value(&self, series: &[f64]) -> Result<f64, AggregatorError> {
        if series.len() <= 1 {
            return Err(AggregatorError::InvalidNumberOfPeriods(
                "Standard deviation cannot be computed for series with less than 2 elements."
                    .into(),
            ));
        }
        let number_of_periods = series.len() as f64;
        let mean = series.iter().sum::<f64>() / number_of_periods;
        let variance =
            series.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (number_of_periods - 1.);
        Ok(variance.sqrt())
    }
}
