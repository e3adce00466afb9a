use crate::consts::{DAYS_PER_YEAR, FLOAT_COMPARISON_EPSILON};
use crate::evolution::aggregator::{
    Aggregator, AggregatorError, ArithmeticMean, StandardDeviation,
};
use crate::evolution::fitness::FitnessFunction;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum OptimizationDirection {
    #[default]
    Maximize,
    Minimize,
}

impl OptimizationDirection {
    /// Strict "a beats b" under this direction. NaN never beats anything.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        match self {
            OptimizationDirection::Maximize => a > b,
            OptimizationDirection::Minimize => a < b,
        }
    }
}

/// A statistic of a portfolio computed against a table of periodic simple
/// returns (`returns[t][asset]`).
pub trait PortfolioObjective: std::fmt::Debug + Send + Sync {
    fn compute(&self, weights: &[f64], returns: &[Vec<f64>]) -> Result<f64, AggregatorError>;

    fn default_direction(&self) -> OptimizationDirection;

    fn direction(&self) -> OptimizationDirection;
}

/// Per-period portfolio returns `r_t · w`.
pub fn portfolio_returns(
    weights: &[f64],
    returns: &[Vec<f64>],
) -> Result<Vec<f64>, AggregatorError> {
    if let Some(row) = returns.iter().find(|row| row.len() != weights.len()) {
        return Err(AggregatorError::DimensionMismatch {
            weights: weights.len(),
            assets: row.len(),
        });
    }
    Ok(returns
        .par_iter()
        .map(|row| {
            row.iter()
                .zip(weights.iter())
                .map(|(period_return, weight)| period_return * weight)
                .sum::<f64>()
        })
        .collect::<Vec<f64>>())
}

// The Built-In Objectives
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Returns<A: Aggregator> {
    aggregator: A,
    direction: Option<OptimizationDirection>,
}

impl<A: Aggregator + Default> Returns<A> {
    pub fn new(direction: Option<OptimizationDirection>) -> Self {
        Returns {
            aggregator: A::default(),
            direction,
        }
    }
}

impl<A: Aggregator> PortfolioObjective for Returns<A> {
    fn compute(&self, weights: &[f64], returns: &[Vec<f64>]) -> Result<f64, AggregatorError> {
        self.aggregator.value(&portfolio_returns(weights, returns)?)
    }
    fn default_direction(&self) -> OptimizationDirection {
        OptimizationDirection::Maximize
    }
    fn direction(&self) -> OptimizationDirection {
        self.direction.unwrap_or(self.default_direction())
    }
}

pub type MeanReturns = Returns<ArithmeticMean>;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Volatility(pub Returns<StandardDeviation>);
impl PortfolioObjective for Volatility {
    fn compute(&self, weights: &[f64], returns: &[Vec<f64>]) -> Result<f64, AggregatorError> {
        // we simply delegate
        self.0.compute(weights, returns)
    }
    fn default_direction(&self) -> OptimizationDirection {
        OptimizationDirection::Minimize
    }
    fn direction(&self) -> OptimizationDirection {
        self.0.direction.unwrap_or(self.default_direction())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SharpeRatio {
    mean_returns: MeanReturns,
    volatility: Volatility,
    time_horizon_in_days: usize,
    risk_free_rate: f64,
    direction: Option<OptimizationDirection>,
}

impl SharpeRatio {
    pub fn new(time_horizon_in_days: usize, risk_free_rate: f64) -> Self {
        SharpeRatio {
            mean_returns: MeanReturns::default(),
            volatility: Volatility::default(),
            time_horizon_in_days,
            risk_free_rate,
            direction: None,
        }
    }
}

impl PortfolioObjective for SharpeRatio {
    fn compute(&self, weights: &[f64], returns: &[Vec<f64>]) -> Result<f64, AggregatorError> {
        if self.time_horizon_in_days == 0 {
            return Err(AggregatorError::InvalidNumberOfPeriods(
                "Time horizon must span at least one day.".into(),
            ));
        }
        let time_horizon_in_years = (self.time_horizon_in_days as f64) / DAYS_PER_YEAR;
        let periods_per_years = (returns.len() as f64) / time_horizon_in_years;
        let annualized_returns = self.mean_returns.compute(weights, returns)? * periods_per_years;
        let annualized_volatility =
            self.volatility.compute(weights, returns)? * periods_per_years.sqrt();

        if annualized_volatility.abs() >= FLOAT_COMPARISON_EPSILON {
            Ok((annualized_returns - self.risk_free_rate) / annualized_volatility)
        } else {
            // effectively riskless (and useless) portfolio, cap it at 0.
            Ok(0.)
        }
    }

    fn default_direction(&self) -> OptimizationDirection {
        OptimizationDirection::Maximize
    }
    fn direction(&self) -> OptimizationDirection {
        self.direction.unwrap_or(self.default_direction())
    }
}

/// Final value of `initial_amount` invested with constant weights and
/// compounded every period.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CumulativeValue {
    pub initial_amount: f64,
}

impl PortfolioObjective for CumulativeValue {
    fn compute(&self, weights: &[f64], returns: &[Vec<f64>]) -> Result<f64, AggregatorError> {
        Ok(portfolio_returns(weights, returns)?
            .iter()
            .fold(self.initial_amount, |value, r| value * (1. + r)))
    }
    fn default_direction(&self) -> OptimizationDirection {
        OptimizationDirection::Maximize
    }
    fn direction(&self) -> OptimizationDirection {
        OptimizationDirection::Maximize
    }
}

/// Objective selection as it appears in experiment configuration files.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum Objective {
    MeanReturns,
    Volatility,
    SharpeRatio {
        time_horizon_in_days: usize,
        risk_free_rate: f64,
    },
    CumulativeValue {
        initial_amount: f64,
    },
}

impl Objective {
    pub fn build(&self) -> Arc<dyn PortfolioObjective> {
        match self {
            Objective::MeanReturns => Arc::new(MeanReturns::default()),
            Objective::Volatility => Arc::new(Volatility::default()),
            Objective::SharpeRatio {
                time_horizon_in_days,
                risk_free_rate,
            } => Arc::new(SharpeRatio::new(*time_horizon_in_days, *risk_free_rate)),
            Objective::CumulativeValue { initial_amount } => Arc::new(CumulativeValue {
                initial_amount: *initial_amount,
            }),
        }
    }
}

/// Scores weights with a portfolio objective over a fixed returns table.
/// Minimizing objectives are negated so that higher fitness is always better.
#[derive(Debug, Clone)]
pub struct ObjectiveFitness {
    objective: Arc<dyn PortfolioObjective>,
    returns: Arc<Vec<Vec<f64>>>,
}

impl ObjectiveFitness {
    pub fn new(objective: Arc<dyn PortfolioObjective>, returns: Arc<Vec<Vec<f64>>>) -> Self {
        ObjectiveFitness { objective, returns }
    }
}

impl FitnessFunction for ObjectiveFitness {
    fn score(&self, weights: &[f64]) -> anyhow::Result<f64> {
        let value = self.objective.compute(weights, &self.returns)?;
        Ok(match self.objective.direction() {
            OptimizationDirection::Maximize => value,
            OptimizationDirection::Minimize => -value,
        })
    }
}
