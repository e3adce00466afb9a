//! Dispersive Flies Optimization.
//!
//! A population of flies sits on a fixed ring. Every generation all flies are
//! scored (on their projected portfolio), the best fly is kept as-is, and each
//! other fly is rebuilt dimension by dimension: with probability
//! `disturbance_probability` the dimension is redrawn uniformly, otherwise it
//! moves to `neighbour + r * (elite - self)` where `neighbour` is the better of
//! its two ring neighbours. Values that leave the search box are redrawn.

use crate::evolution::fitness::{EvaluationError, FitnessEvaluator, FitnessFunction};
use crate::evolution::objective::OptimizationDirection;
use crate::evolution::projection::{CardinalityProjection, ConstraintProjection, IdentityProjection};
use rand::distributions::Uniform;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

mod config;

pub use config::{ConfigurationError, DfoConfig, SearchBounds};

#[derive(Error, Debug)]
pub enum DfoError {
    #[error("Invalid DFO configuration")]
    Configuration(#[from] ConfigurationError),
    #[error("Evaluation of fly {fly} failed in generation {generation}")]
    Evaluation {
        generation: usize,
        fly: usize,
        #[source]
        source: EvaluationError,
    },
}

/// Snapshot handed to observers once per generation, before flies move.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GenerationReport {
    pub generation: usize,
    pub best_index: usize,
    pub best_fitness: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DfoResult {
    pub best_fitness: f64,
    /// Projected (feasible) weights of the best fly.
    pub weights: Vec<f64>,
    pub best_index: usize,
    pub generations: usize,
    pub evaluations: usize,
    pub degenerate_projections: usize,
}

type Observer = Box<dyn FnMut(&GenerationReport) + Send>;

pub fn seeded_rng(seed: Option<u64>) -> ChaCha20Rng {
    match seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed),
        None => ChaCha20Rng::from_entropy(),
    }
}

/// Index of the best fitness. The first index wins ties.
pub fn best_fly_index(fitness: &[f64], direction: OptimizationDirection) -> usize {
    (1..fitness.len()).fold(0, |best, idx| {
        if direction.is_better(fitness[idx], fitness[best]) {
            idx
        } else {
            best
        }
    })
}

/// Better of the two ring neighbours of `fly`. The right neighbour wins ties.
pub fn best_neighbour(fitness: &[f64], fly: usize, direction: OptimizationDirection) -> usize {
    let population_size = fitness.len();
    let left = (fly + population_size - 1) % population_size;
    let right = (fly + 1) % population_size;
    if direction.is_better(fitness[left], fitness[right]) {
        left
    } else {
        right
    }
}

pub struct DfoEngine<F, P = CardinalityProjection, R = ChaCha20Rng> {
    config: DfoConfig,
    evaluator: FitnessEvaluator<F, P>,
    bounds: SearchBounds,
    samplers: Vec<Uniform<f64>>,
    flies: Vec<Vec<f64>>,
    fitness: Vec<f64>,
    generation: usize,
    rng: R,
    pool: Option<rayon::ThreadPool>,
    observer: Option<Observer>,
}

impl<F: FitnessFunction> DfoEngine<F> {
    /// Portfolio search: flies are projected onto cardinality-limited,
    /// long-only, unit-sum portfolios before scoring.
    pub fn new(fitness_function: F, config: DfoConfig) -> Result<Self, DfoError> {
        let projection = CardinalityProjection::new(config.dimensions, config.cardinality);
        let bounds = SearchBounds::uniform(config.lower_bound, config.upper_bound, config.dimensions);
        let rng = seeded_rng(config.seed);
        Self::from_parts(fitness_function, projection, config, bounds, rng)
    }
}

impl<F: FitnessFunction> DfoEngine<F, IdentityProjection> {
    /// Plain box-constrained search, flies are scored as they are.
    pub fn unconstrained(fitness_function: F, config: DfoConfig) -> Result<Self, DfoError> {
        let bounds = SearchBounds::uniform(config.lower_bound, config.upper_bound, config.dimensions);
        let rng = seeded_rng(config.seed);
        Self::from_parts(fitness_function, IdentityProjection, config, bounds, rng)
    }
}

impl<F, P, R> DfoEngine<F, P, R>
where
    F: FitnessFunction,
    P: ConstraintProjection,
    R: Rng,
{
    pub fn from_parts(
        fitness_function: F,
        projection: P,
        config: DfoConfig,
        bounds: SearchBounds,
        mut rng: R,
    ) -> Result<Self, DfoError> {
        config.validate()?;
        bounds.validate(config.dimensions)?;

        let pool = if config.parallel_evaluation {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.max_concurrency)
                .build()
                .map_err(ConfigurationError::from)?;
            Some(pool)
        } else {
            None
        };

        let samplers = bounds.samplers();
        let flies = (0..config.population_size)
            .map(|_| {
                samplers
                    .iter()
                    .map(|sampler| rng.sample(sampler))
                    .collect::<Vec<f64>>()
            })
            .collect::<Vec<_>>();

        Ok(DfoEngine {
            fitness: vec![0.; config.population_size],
            evaluator: FitnessEvaluator::new(fitness_function, projection),
            config,
            bounds,
            samplers,
            flies,
            generation: 0,
            rng,
            pool,
            observer: None,
        })
    }

    /// Called once per generation with the elite of that generation.
    pub fn with_observer(
        mut self,
        observer: impl FnMut(&GenerationReport) + Send + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &DfoConfig {
        &self.config
    }

    pub fn bounds(&self) -> &SearchBounds {
        &self.bounds
    }

    /// Raw (unprojected) fly positions.
    pub fn flies(&self) -> &[Vec<f64>] {
        &self.flies
    }

    /// Fitness of each fly as of the last evaluation pass.
    pub fn fitness(&self) -> &[f64] {
        &self.fitness
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Runs a single generation: evaluate, pick the elite, move every other fly.
    pub fn step(&mut self) -> Result<GenerationReport, DfoError> {
        self.evaluate_population()?;
        let best_index = best_fly_index(&self.fitness, self.config.direction);
        let report = GenerationReport {
            generation: self.generation,
            best_index,
            best_fitness: self.fitness[best_index],
        };
        self.report_progress(&report);

        self.update_flies(best_index);
        self.generation += 1;
        Ok(report)
    }

    /// Runs the remaining generations, then scores the final population and
    /// returns its best fly, projected.
    pub fn run(mut self) -> Result<DfoResult, DfoError> {
        info!(
            population_size = self.config.population_size,
            dimensions = self.config.dimensions,
            cardinality = self.config.cardinality,
            max_iterations = self.config.max_iterations,
            "Starting DFO run."
        );
        while self.generation < self.config.max_iterations {
            self.step()?;
        }

        self.evaluate_population()?;
        let best_index = best_fly_index(&self.fitness, self.config.direction);
        let weights = self
            .evaluator
            .projection()
            .project(&self.flies[best_index])
            .map_err(|e| DfoError::Evaluation {
                generation: self.generation,
                fly: best_index,
                source: e.into(),
            })?
            .weights;

        let result = DfoResult {
            best_fitness: self.fitness[best_index],
            weights,
            best_index,
            generations: self.generation,
            evaluations: self.evaluator.evaluations(),
            degenerate_projections: self.evaluator.degenerate_projections(),
        };
        if result.degenerate_projections > 0 {
            warn!(
                degenerate_projections = result.degenerate_projections,
                "Some candidates projected to the uniform fallback portfolio, cardinality was ignored for them."
            );
        }
        info!(
            best_fitness = result.best_fitness,
            evaluations = result.evaluations,
            "DFO run finished."
        );
        Ok(result)
    }

    fn evaluate_population(&mut self) -> Result<(), DfoError> {
        let generation = self.generation;
        let evaluator = &self.evaluator;
        let evaluate_fly = |(fly, position): (usize, &Vec<f64>)| {
            evaluator
                .evaluate(position)
                .map_err(|source| DfoError::Evaluation {
                    generation,
                    fly,
                    source,
                })
        };

        // population order is preserved either way, sequential stops at the first failure
        self.fitness = match &self.pool {
            Some(pool) => pool.install(|| {
                self.flies
                    .par_iter()
                    .enumerate()
                    .map(evaluate_fly)
                    .collect::<Result<Vec<f64>, DfoError>>()
            })?,
            None => self
                .flies
                .iter()
                .enumerate()
                .map(evaluate_fly)
                .collect::<Result<Vec<f64>, DfoError>>()?,
        };
        Ok(())
    }

    fn update_flies(&mut self, elite: usize) {
        let direction = self.config.direction;
        let disturbance_probability = self.config.disturbance_probability;

        for fly in 0..self.flies.len() {
            if fly == elite {
                continue; // Elitist strategy
            }
            let neighbour = best_neighbour(&self.fitness, fly, direction);

            for dim in 0..self.config.dimensions {
                let sampler = &self.samplers[dim];
                if self.rng.gen::<f64>() < disturbance_probability {
                    self.flies[fly][dim] = self.rng.sample(sampler);
                    continue;
                }

                let randomness = self.rng.gen::<f64>();
                let moved = self.flies[neighbour][dim]
                    + randomness * (self.flies[elite][dim] - self.flies[fly][dim]);

                self.flies[fly][dim] = if self.bounds.contains(dim, moved) {
                    moved
                } else {
                    self.rng.sample(sampler)
                };
            }
        }
    }

    fn report_progress(&mut self, report: &GenerationReport) {
        let interval = self.config.progress_interval;
        if interval > 0 && report.generation % interval == 0 {
            info!(
                generation = report.generation,
                best_index = report.best_index,
                best_fitness = report.best_fitness,
                "DFO progress"
            );
        }
        if let Some(observer) = self.observer.as_mut() {
            observer(report);
        }
    }
}
