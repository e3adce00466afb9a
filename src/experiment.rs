use crate::evolution::dfo::{DfoConfig, DfoEngine, DfoResult};
use crate::evolution::objective::{Objective, ObjectiveFitness};
use crate::portfolio::{synthetic_tickers, value_over_time, Portfolio};
use crate::sampling::Sampler;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Environment variable holding the path of the experiment file.
pub const CONFIG_ENV_VAR: &str = "DFO_CONFIG";

fn default_number_of_factors() -> usize {
    5
}

fn default_periods() -> usize {
    252
}

fn default_initial_amount() -> f64 {
    1_000_000.
}

fn default_max_parallel_runs() -> usize {
    4
}

/// One DFO run on a synthetic factor-model scenario, as read from JSON.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExperimentConfig {
    pub dfo: DfoConfig,
    pub objective: Objective,
    #[serde(default = "default_number_of_factors")]
    pub number_of_factors: usize,
    /// Periods (days) of returns in the scenario.
    #[serde(default = "default_periods")]
    pub periods: usize,
    #[serde(default)]
    pub scenario_seed: Option<u64>,
    /// Used to report the value path of the winning portfolio.
    #[serde(default = "default_initial_amount")]
    pub initial_amount: f64,
    /// Disturbance probabilities tried by the sweep binary.
    #[serde(default)]
    pub sweep_probabilities: Vec<f64>,
    #[serde(default = "default_max_parallel_runs")]
    pub max_parallel_runs: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let seed = 42;
        ExperimentConfig {
            dfo: DfoConfig::new(40, 30, 10, 0.001, 500, 0., 1.).with_seed(seed),
            objective: Objective::SharpeRatio {
                time_horizon_in_days: default_periods(),
                risk_free_rate: 0.01,
            },
            number_of_factors: default_number_of_factors(),
            periods: default_periods(),
            scenario_seed: Some(seed),
            initial_amount: default_initial_amount(),
            sweep_probabilities: vec![0., 0.001, 0.01, 0.05, 0.1],
            max_parallel_runs: default_max_parallel_runs(),
        }
    }
}

impl ExperimentConfig {
    /// Reads the experiment from `path`, else from the file named by
    /// `DFO_CONFIG`, else falls back to the defaults.
    pub fn load(path: Option<String>) -> anyhow::Result<Self> {
        let path = path
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
            .map(PathBuf::from);
        let Some(path) = path else {
            info!("No experiment file given, using defaults");
            return Ok(ExperimentConfig::default());
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read experiment file {}", path.display()))?;
        let config: ExperimentConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse experiment file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid experiment file {}", path.display()))?;
        info!(path = %path.display(), "Loaded experiment file");
        Ok(config)
    }

    /// Rejects settings the binaries cannot run with. Nothing is clamped.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.dfo.validate()?;
        if self.max_parallel_runs == 0 {
            bail!("max_parallel_runs must be at least 1");
        }
        if self.number_of_factors == 0 {
            bail!("number_of_factors must be at least 1");
        }
        if let Some(p) = self
            .sweep_probabilities
            .iter()
            .find(|p| !(0. ..=1.).contains(*p))
        {
            bail!("Sweep disturbance probability must lie in [0, 1], got {}", p);
        }
        Ok(())
    }

    pub fn sampler(&self) -> anyhow::Result<Sampler> {
        Sampler::factor_model_synthetic(
            self.dfo.dimensions,
            self.number_of_factors,
            self.periods,
            self.scenario_seed,
        )
        .context("Failed to build the scenario sampler")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExperimentOutcome {
    pub config: ExperimentConfig,
    /// Seed the scenario was actually drawn with.
    pub scenario_seed: u64,
    pub result: DfoResult,
    pub portfolio: Portfolio,
    pub value_over_time: Vec<f64>,
}

/// Samples the scenario, runs the engine on it and packages the winner.
/// Blocking; async callers should go through `spawn_blocking`.
pub fn run_experiment(config: ExperimentConfig) -> anyhow::Result<ExperimentOutcome> {
    let mut sampler = config.sampler()?;
    let returns = Arc::new(sampler.sample_returns());

    let fitness = ObjectiveFitness::new(config.objective.build(), Arc::clone(&returns));
    let result = DfoEngine::new(fitness, config.dfo.clone())
        .context("Failed to set up the DFO engine")?
        .run()
        .context("DFO run failed")?;

    let tickers = synthetic_tickers(config.dfo.dimensions);
    let portfolio = Portfolio::from_weights(&result.weights, &tickers)?;
    let value_over_time = value_over_time(&result.weights, &returns, config.initial_amount)?;

    Ok(ExperimentOutcome {
        scenario_seed: sampler.seed(),
        config,
        result,
        portfolio,
        value_over_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FLOAT_COMPARISON_EPSILON;

    fn small_experiment() -> ExperimentConfig {
        ExperimentConfig {
            dfo: DfoConfig::new(12, 8, 3, 0.01, 30, 0., 1.).with_seed(5),
            periods: 60,
            number_of_factors: 2,
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn test_default_experiment_is_valid() {
        let config = ExperimentConfig::default();
        assert!(config.dfo.validate().is_ok());
        assert_eq!(config.scenario_seed, Some(42));
    }

    #[test]
    fn test_experiment_json_defaults() {
        let json = r#"{
            "dfo": {
                "population_size": 20,
                "dimensions": 10,
                "cardinality": 4,
                "disturbance_probability": 0.01,
                "max_iterations": 50,
                "lower_bound": 0.0,
                "upper_bound": 1.0
            },
            "objective": { "type": "Volatility" }
        }"#;
        let config: ExperimentConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.number_of_factors, 5);
        assert_eq!(config.periods, 252);
        assert!(config.sweep_probabilities.is_empty());
        assert!(matches!(config.objective, Objective::Volatility));
    }

    #[test]
    fn test_zero_parallel_runs_is_rejected() {
        let config = ExperimentConfig {
            max_parallel_runs: 0,
            ..ExperimentConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ExperimentConfig {
            sweep_probabilities: vec![0.01, 1.5],
            ..ExperimentConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ExperimentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_rejects_invalid_experiment_file() {
        let mut config = serde_json::to_value(ExperimentConfig::default()).unwrap();
        config["max_parallel_runs"] = serde_json::json!(0);
        let path = std::env::temp_dir().join(format!(
            "portfolio_dfo_invalid_experiment_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, config.to_string()).unwrap();

        let loaded = ExperimentConfig::load(Some(path.display().to_string()));
        std::fs::remove_file(&path).unwrap();

        let error = loaded.unwrap_err();
        assert!(format!("{:#}", error).contains("max_parallel_runs"));
    }

    #[test]
    fn test_run_experiment_respects_cardinality() {
        let outcome = run_experiment(small_experiment()).unwrap();

        assert!(outcome.portfolio.number_of_assets() <= 3);
        assert!((outcome.portfolio.total_weight() - 1.).abs() < 1e-6);
        assert_eq!(outcome.value_over_time.len(), 61);
        assert_eq!(outcome.scenario_seed, 42);
        assert_eq!(outcome.result.evaluations, 12 * 31);
        assert!((outcome.value_over_time[0] - 1_000_000.).abs() < FLOAT_COMPARISON_EPSILON);
    }

    #[test]
    fn test_run_experiment_is_reproducible() {
        let first = run_experiment(small_experiment()).unwrap();
        let second = run_experiment(small_experiment()).unwrap();
        assert_eq!(first.result.weights, second.result.weights);
        assert_eq!(first.result.best_fitness, second.result.best_fitness);
    }
}
