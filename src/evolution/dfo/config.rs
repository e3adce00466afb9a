use crate::consts::DEFAULT_PROGRESS_INTERVAL;
use crate::evolution::objective::OptimizationDirection;
use rand::distributions::Uniform;
use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_max_concurrency() -> usize {
    num_cpus::get()
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Population size must be at least 2 for the ring topology, got {0}")]
    PopulationTooSmall(usize),
    #[error("Dimensions cannot be zero")]
    ZeroDimensions,
    #[error("Cardinality must lie in 1..={dimensions}, got {cardinality}")]
    InvalidCardinality {
        cardinality: usize,
        dimensions: usize,
    },
    #[error("Disturbance probability must lie in [0, 1], got {0}")]
    InvalidDisturbanceProbability(f64),
    #[error("Bounds of dimension {dimension} must be finite with lower < upper and a finite width, got [{lower}, {upper}]")]
    InvalidBounds {
        dimension: usize,
        lower: f64,
        upper: f64,
    },
    #[error("Got bounds for {bounds} dimensions but the search space has {dimensions}")]
    BoundsDimensionMismatch { bounds: usize, dimensions: usize },
    #[error("Max concurrency cannot be zero when evaluating in parallel")]
    ZeroConcurrency,
    #[error("Failed to build the evaluation thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Everything needed to set up a DFO run.
///
/// The scalar `lower_bound`/`upper_bound` pair applies to every dimension;
/// heterogeneous bounds go through [`SearchBounds::per_dimension`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DfoConfig {
    pub population_size: usize,
    pub dimensions: usize,
    /// Maximum number of assets held by a projected portfolio.
    pub cardinality: usize,
    pub disturbance_probability: f64,
    pub max_iterations: usize,
    pub lower_bound: f64,
    pub upper_bound: f64,
    #[serde(default)]
    pub direction: OptimizationDirection,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Generations between progress log lines, 0 turns them off.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default)]
    pub parallel_evaluation: bool,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl DfoConfig {
    pub fn new(
        population_size: usize,
        dimensions: usize,
        cardinality: usize,
        disturbance_probability: f64,
        max_iterations: usize,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Self {
        DfoConfig {
            population_size,
            dimensions,
            cardinality,
            disturbance_probability,
            max_iterations,
            lower_bound,
            upper_bound,
            direction: OptimizationDirection::default(),
            seed: None,
            progress_interval: default_progress_interval(),
            parallel_evaluation: false,
            max_concurrency: default_max_concurrency(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_direction(mut self, direction: OptimizationDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_parallel_evaluation(mut self, max_concurrency: usize) -> Self {
        self.parallel_evaluation = true;
        self.max_concurrency = max_concurrency;
        self
    }

    /// Rejects out-of-range parameters. Nothing is ever clamped.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.population_size < 2 {
            return Err(ConfigurationError::PopulationTooSmall(self.population_size));
        }
        if self.dimensions == 0 {
            return Err(ConfigurationError::ZeroDimensions);
        }
        if self.cardinality == 0 || self.cardinality > self.dimensions {
            return Err(ConfigurationError::InvalidCardinality {
                cardinality: self.cardinality,
                dimensions: self.dimensions,
            });
        }
        // written so that NaN fails too
        if !(0. ..=1.).contains(&self.disturbance_probability) {
            return Err(ConfigurationError::InvalidDisturbanceProbability(
                self.disturbance_probability,
            ));
        }
        check_bounds(0, self.lower_bound, self.upper_bound)?;
        if self.parallel_evaluation && self.max_concurrency == 0 {
            return Err(ConfigurationError::ZeroConcurrency);
        }
        Ok(())
    }
}

fn check_bounds(dimension: usize, lower: f64, upper: f64) -> Result<(), ConfigurationError> {
    // the width must be finite too, uniform sampling needs `upper - lower`
    if lower.is_finite() && upper.is_finite() && lower < upper && (upper - lower).is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidBounds {
            dimension,
            lower,
            upper,
        })
    }
}

/// Per-dimension `(lower, upper)` box the flies live in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchBounds(Vec<(f64, f64)>);

impl SearchBounds {
    pub fn uniform(lower: f64, upper: f64, dimensions: usize) -> Self {
        SearchBounds(vec![(lower, upper); dimensions])
    }

    pub fn per_dimension(bounds: Vec<(f64, f64)>) -> Self {
        SearchBounds(bounds)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, dimension: usize) -> (f64, f64) {
        self.0[dimension]
    }

    pub fn contains(&self, dimension: usize, value: f64) -> bool {
        let (lower, upper) = self.0[dimension];
        lower <= value && value <= upper
    }

    pub fn validate(&self, dimensions: usize) -> Result<(), ConfigurationError> {
        if self.0.len() != dimensions {
            return Err(ConfigurationError::BoundsDimensionMismatch {
                bounds: self.0.len(),
                dimensions,
            });
        }
        self.0
            .iter()
            .enumerate()
            .try_for_each(|(dimension, &(lower, upper))| check_bounds(dimension, lower, upper))
    }

    /// One uniform sampler per dimension. Only call on validated bounds.
    pub(crate) fn samplers(&self) -> Vec<Uniform<f64>> {
        self.0
            .iter()
            .map(|&(lower, upper)| Uniform::new(lower, upper))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> DfoConfig {
        DfoConfig::new(5, 4, 2, 0.01, 10, 0., 1.)
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_population_needs_two_flies() {
        let config = DfoConfig {
            population_size: 1,
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::PopulationTooSmall(1))
        ));
    }

    #[test]
    fn test_cardinality_must_fit_dimensions() {
        for cardinality in [0, 5] {
            let config = DfoConfig {
                cardinality,
                ..valid_config()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigurationError::InvalidCardinality { .. })
            ));
        }
        let config = DfoConfig {
            dimensions: 0,
            cardinality: 0,
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ZeroDimensions)
        ));
    }

    #[test]
    fn test_disturbance_probability_is_not_clamped() {
        for probability in [-0.1, 1.5, f64::NAN] {
            let config = DfoConfig {
                disturbance_probability: probability,
                ..valid_config()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigurationError::InvalidDisturbanceProbability(_))
            ));
        }
        for probability in [0., 1.] {
            let config = DfoConfig {
                disturbance_probability: probability,
                ..valid_config()
            };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_bounds_must_be_ordered_and_finite() {
        for (lower, upper) in [
            (1., 1.),
            (1., 0.),
            (f64::NEG_INFINITY, 0.),
            (-1e308, 1e308),
            (f64::MIN, f64::MAX),
        ] {
            let config = DfoConfig {
                lower_bound: lower,
                upper_bound: upper,
                ..valid_config()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigurationError::InvalidBounds { .. })
            ));
        }
    }

    #[test]
    fn test_parallel_evaluation_needs_threads() {
        let config = valid_config().with_parallel_evaluation(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ZeroConcurrency)
        ));
    }

    #[test]
    fn test_search_bounds_validation() {
        let bounds = SearchBounds::per_dimension(vec![(0., 1.), (-1., 2.)]);
        assert!(bounds.validate(2).is_ok());
        assert!(matches!(
            bounds.validate(3),
            Err(ConfigurationError::BoundsDimensionMismatch {
                bounds: 2,
                dimensions: 3
            })
        ));

        let bounds = SearchBounds::per_dimension(vec![(0., 1.), (2., 2.)]);
        assert!(matches!(
            bounds.validate(2),
            Err(ConfigurationError::InvalidBounds { dimension: 1, .. })
        ));

        let bounds = SearchBounds::per_dimension(vec![(0., 1.), (-1e308, 1e308), (0., 2.)]);
        assert!(matches!(
            bounds.validate(3),
            Err(ConfigurationError::InvalidBounds { dimension: 1, .. })
        ));
    }

    #[test]
    fn test_search_bounds_contains_is_inclusive() {
        let bounds = SearchBounds::uniform(0., 1., 3);
        assert!(bounds.contains(2, 0.));
        assert!(bounds.contains(2, 1.));
        assert!(!bounds.contains(2, 1.0000001));
        assert!(!bounds.contains(0, -0.0000001));
    }

    #[test]
    fn test_config_defaults_from_json() {
        let json = r#"{
            "population_size": 40,
            "dimensions": 30,
            "cardinality": 10,
            "disturbance_probability": 0.001,
            "max_iterations": 500,
            "lower_bound": 0.0,
            "upper_bound": 1.0
        }"#;
        let config: DfoConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.direction, OptimizationDirection::Maximize);
        assert_eq!(config.seed, None);
        assert_eq!(config.progress_interval, DEFAULT_PROGRESS_INTERVAL);
        assert!(!config.parallel_evaluation);
        assert!(config.max_concurrency >= 1);
        assert!(config.validate().is_ok());
    }
}
