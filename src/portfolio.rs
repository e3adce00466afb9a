use crate::evolution::aggregator::AggregatorError;
use crate::evolution::objective::portfolio_returns;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Got {weights} weights but {tickers} tickers")]
    TickerMismatch { weights: usize, tickers: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub weight: f64,
}

/// Assets actually held by a weight vector, largest position first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub holdings: Vec<Holding>,
}

impl Portfolio {
    /// Zero weights are dropped. Equal weights keep the ticker order.
    pub fn from_weights(weights: &[f64], tickers: &[String]) -> Result<Self, PortfolioError> {
        if weights.len() != tickers.len() {
            return Err(PortfolioError::TickerMismatch {
                weights: weights.len(),
                tickers: tickers.len(),
            });
        }
        let mut holdings = weights
            .iter()
            .zip(tickers)
            .filter(|(&weight, _)| weight > 0.)
            .map(|(&weight, ticker)| Holding {
                ticker: ticker.clone(),
                weight,
            })
            .collect::<Vec<_>>();
        holdings.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        Ok(Portfolio { holdings })
    }

    pub fn number_of_assets(&self) -> usize {
        self.holdings.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.holdings.iter().map(|h| h.weight).sum()
    }
}

impl fmt::Display for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "A portfolio of {} assets:", self.number_of_assets())?;
        for holding in &self.holdings {
            writeln!(f, "{:<10} {:>7.2}%", holding.ticker, holding.weight * 100.)?;
        }
        Ok(())
    }
}

/// Placeholder tickers for synthetic universes: `ASSET_000`, `ASSET_001`, ...
pub fn synthetic_tickers(assets: usize) -> Vec<String> {
    (0..assets).map(|i| format!("ASSET_{:03}", i)).collect()
}

/// Value of `initial_amount` after each period, starting with the amount
/// itself, for weights held constant and compounded every period.
pub fn value_over_time(
    weights: &[f64],
    returns: &[Vec<f64>],
    initial_amount: f64,
) -> Result<Vec<f64>, AggregatorError> {
    let period_returns = portfolio_returns(weights, returns)?;
    let mut path = Vec::with_capacity(period_returns.len() + 1);
    path.push(initial_amount);
    let mut value = initial_amount;
    for r in period_returns {
        value *= 1. + r;
        path.push(value);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FLOAT_COMPARISON_EPSILON;
    use crate::evolution::objective::{CumulativeValue, PortfolioObjective};

    #[test]
    fn test_from_weights_sorts_held_assets() {
        let tickers = synthetic_tickers(5);
        let portfolio = Portfolio::from_weights(&[0.2, 0., 0.5, 0., 0.3], &tickers).unwrap();

        let held = portfolio
            .holdings
            .iter()
            .map(|h| h.ticker.as_str())
            .collect::<Vec<_>>();
        assert_eq!(held, vec!["ASSET_002", "ASSET_004", "ASSET_000"]);
        assert_eq!(portfolio.number_of_assets(), 3);
        assert!((portfolio.total_weight() - 1.).abs() < FLOAT_COMPARISON_EPSILON);
    }

    #[test]
    fn test_equal_weights_keep_ticker_order() {
        let tickers = vec!["B".to_string(), "A".to_string(), "C".to_string()];
        let portfolio = Portfolio::from_weights(&[0.5, 0.5, 0.], &tickers).unwrap();
        assert_eq!(portfolio.holdings[0].ticker, "B");
        assert_eq!(portfolio.holdings[1].ticker, "A");
    }

    #[test]
    fn test_from_weights_rejects_mismatched_tickers() {
        assert!(matches!(
            Portfolio::from_weights(&[1.], &synthetic_tickers(2)),
            Err(PortfolioError::TickerMismatch {
                weights: 1,
                tickers: 2
            })
        ));
    }

    #[test]
    fn test_display_lists_percentages() {
        let portfolio = Portfolio::from_weights(&[0.25, 0.75], &synthetic_tickers(2)).unwrap();
        let text = portfolio.to_string();
        assert!(text.starts_with("A portfolio of 2 assets:"));
        assert!(text.contains("75.00%"));
    }

    #[test]
    fn test_value_over_time_compounds() {
        let returns = vec![vec![0.1, 0.], vec![-0.1, 0.2]];
        let path = value_over_time(&[0.5, 0.5], &returns, 100.).unwrap();

        assert_eq!(path.len(), 3);
        assert!((path[1] - 105.).abs() < FLOAT_COMPARISON_EPSILON);
        assert!((path[2] - 105. * 1.05).abs() < FLOAT_COMPARISON_EPSILON);

        let final_value = CumulativeValue {
            initial_amount: 100.,
        }
        .compute(&[0.5, 0.5], &returns)
        .unwrap();
        assert!((path[2] - final_value).abs() < FLOAT_COMPARISON_EPSILON);
    }
}
