use crate::evolution::projection::{ConstraintProjection, ProjectionError};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Anything that can score a (projected) weight vector. Higher is better.
///
/// Closures of the shape `Fn(&[f64]) -> anyhow::Result<f64>` implement this
/// directly; use [`Infallible`] to wrap a plain `Fn(&[f64]) -> f64`.
pub trait FitnessFunction: Send + Sync {
    fn score(&self, weights: &[f64]) -> anyhow::Result<f64>;
}

impl<F> FitnessFunction for F
where
    F: Fn(&[f64]) -> anyhow::Result<f64> + Send + Sync,
{
    fn score(&self, weights: &[f64]) -> anyhow::Result<f64> {
        self(weights)
    }
}

/// Adapter for scoring functions that cannot fail.
#[derive(Debug, Clone, Copy)]
pub struct Infallible<G>(pub G);

impl<G> FitnessFunction for Infallible<G>
where
    G: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn score(&self, weights: &[f64]) -> anyhow::Result<f64> {
        Ok((self.0)(weights))
    }
}

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Scoring function failed")]
    Scoring(#[source] anyhow::Error),
    #[error("Scoring function returned NaN, fitness values must be totally ordered")]
    NotComparable,
    #[error("Candidate could not be projected")]
    Projection(#[from] ProjectionError),
}

/// Projects a raw fly and hands the result to the scoring function.
///
/// Keeps running counters of evaluations and degenerate projections; both are
/// atomics so a generation can be evaluated from several threads.
pub struct FitnessEvaluator<F, P> {
    fitness_function: F,
    projection: P,
    evaluations: AtomicUsize,
    degenerate_projections: AtomicUsize,
}

impl<F: FitnessFunction, P: ConstraintProjection> FitnessEvaluator<F, P> {
    pub fn new(fitness_function: F, projection: P) -> Self {
        FitnessEvaluator {
            fitness_function,
            projection,
            evaluations: AtomicUsize::new(0),
            degenerate_projections: AtomicUsize::new(0),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn evaluate(&self, raw: &[f64]) -> Result<f64, EvaluationError> {
        let projected = self.projection.project(raw)?;
        if projected.is_degenerate() {
            self.degenerate_projections.fetch_add(1, Ordering::Relaxed);
        }
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let fitness = self
            .fitness_function
            .score(&projected.weights)
            .map_err(EvaluationError::Scoring)?;
        if fitness.is_nan() {
            return Err(EvaluationError::NotComparable);
        }
        Ok(fitness)
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn degenerate_projections(&self) -> usize {
        self.degenerate_projections.load(Ordering::Relaxed)
    }
}
