use crate::consts::PROJECTION_EPSILON;
use itertools::Itertools;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("Raw vector has {got} entries but the projection expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Whether a projection produced a genuine feasible portfolio or had to fall
/// back to the uniform allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    Feasible,
    /// Every surviving weight was non-positive, so the uniform `1/n` portfolio
    /// was returned instead. This ignores the cardinality limit.
    DegenerateFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projected {
    pub weights: Vec<f64>,
    pub outcome: ProjectionOutcome,
}

impl Projected {
    pub fn is_degenerate(&self) -> bool {
        self.outcome == ProjectionOutcome::DegenerateFallback
    }
}

/// Maps a raw fly position into the vector that actually gets scored.
/// Implementations never mutate the raw slice.
pub trait ConstraintProjection: Send + Sync {
    fn project(&self, raw: &[f64]) -> Result<Projected, ProjectionError>;
}

/// Cardinality-limited, long-only, fully-invested portfolio projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardinalityProjection {
    dimensions: usize,
    cardinality: usize,
}

impl CardinalityProjection {
    pub fn new(dimensions: usize, cardinality: usize) -> Self {
        CardinalityProjection {
            dimensions,
            cardinality,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }
}

impl ConstraintProjection for CardinalityProjection {
    fn project(&self, raw: &[f64]) -> Result<Projected, ProjectionError> {
        enforce_constraints(raw, self.dimensions, self.cardinality)
    }
}

/// Scores raw positions as they are. Used for unconstrained benchmark
/// functions (sphere, rastrigin, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityProjection;

impl ConstraintProjection for IdentityProjection {
    fn project(&self, raw: &[f64]) -> Result<Projected, ProjectionError> {
        Ok(Projected {
            weights: raw.to_vec(),
            outcome: ProjectionOutcome::Feasible,
        })
    }
}

/// Convenience wrapper returning only the projected weights.
pub fn project(
    raw: &[f64],
    dimensions: usize,
    cardinality: usize,
) -> Result<Vec<f64>, ProjectionError> {
    Ok(enforce_constraints(raw, dimensions, cardinality)?.weights)
}

/// Turns raw weights into a valid portfolio:
/// 1. keep only the `cardinality` largest entries (stable ascending rank, so among
///    equal values the lower index is dropped first),
/// 2. clamp negatives to zero,
/// 3. renormalize to unit sum, or fall back to `1/dimensions` everywhere when
///    nothing positive survived.
///
/// Fails if `raw` does not have exactly `dimensions` entries.
pub fn enforce_constraints(
    raw: &[f64],
    dimensions: usize,
    cardinality: usize,
) -> Result<Projected, ProjectionError> {
    if raw.len() != dimensions {
        return Err(ProjectionError::DimensionMismatch {
            expected: dimensions,
            got: raw.len(),
        });
    }
    let mut weights = raw.to_vec();

    if dimensions > cardinality {
        let dropped = weights
            .iter()
            .enumerate()
            .sorted_by(|(_, a), (_, b)| a.total_cmp(b))
            .take(dimensions - cardinality)
            .map(|(idx, _)| idx)
            .collect::<Vec<usize>>();
        for idx in dropped {
            weights[idx] = 0.;
        }
    }

    weights.iter_mut().for_each(|w| *w = w.max(0.));
    let total_weight = weights.iter().sum::<f64>();

    if total_weight > PROJECTION_EPSILON {
        weights.iter_mut().for_each(|w| *w /= total_weight);
        Ok(Projected {
            weights,
            outcome: ProjectionOutcome::Feasible,
        })
    } else {
        debug!(
            dimensions,
            cardinality, "Projection degenerated, falling back to the uniform portfolio."
        );
        Ok(Projected {
            weights: vec![1. / dimensions as f64; dimensions],
            outcome: ProjectionOutcome::DegenerateFallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FLOAT_COMPARISON_EPSILON;
    use rand::prelude::*;
    use rand_chacha::ChaCha20Rng;

    fn positive_count(weights: &[f64]) -> usize {
        weights.iter().filter(|&&w| w > 0.).count()
    }

    #[test]
    fn test_projection_is_feasible_for_random_inputs() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..500 {
            let dimensions = rng.gen_range(1..20);
            let cardinality = rng.gen_range(1..=dimensions);
            let raw = (0..dimensions)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect::<Vec<f64>>();

            let projected = enforce_constraints(&raw, dimensions, cardinality).unwrap();
            let sum = projected.weights.iter().sum::<f64>();

            assert_eq!(projected.weights.len(), dimensions);
            assert!(projected.weights.iter().all(|&w| w >= 0.));
            assert!((sum - 1.).abs() < 1e-6, "Weights should sum to 1, got {}", sum);
            if !projected.is_degenerate() {
                assert!(positive_count(&projected.weights) <= cardinality);
            }
        }
    }

    #[test]
    fn test_all_negative_input_falls_back_to_uniform() {
        let raw = vec![-0.3, -0.1, -0.7, -0.2];
        let projected = enforce_constraints(&raw, 4, 2).unwrap();

        assert_eq!(projected.outcome, ProjectionOutcome::DegenerateFallback);
        for w in projected.weights.iter() {
            assert!((w - 0.25).abs() < FLOAT_COMPARISON_EPSILON);
        }
    }

    #[test]
    fn test_full_cardinality_only_clamps_and_renormalizes() {
        let raw = vec![0.2, -0.5, 0.6, 0.2];
        let projected = project(&raw, 4, 4).unwrap();
        let expected = [0.2, 0., 0.6, 0.2];

        for (w, e) in projected.iter().zip(expected.iter()) {
            assert!((w - e).abs() < FLOAT_COMPARISON_EPSILON);
        }
    }

    #[test]
    fn test_keeps_largest_entries() {
        let raw = vec![0.1, 0.4, 0.2, 0.3];
        let projected = project(&raw, 4, 2).unwrap();

        assert_eq!(projected[0], 0.);
        assert_eq!(projected[2], 0.);
        assert!((projected[1] - 4. / 7.).abs() < FLOAT_COMPARISON_EPSILON);
        assert!((projected[3] - 3. / 7.).abs() < FLOAT_COMPARISON_EPSILON);
    }

    #[test]
    fn test_ties_drop_lower_index_first() {
        let raw = vec![0.5, 0.5, 0.5];
        let projected = project(&raw, 3, 2).unwrap();
        assert_eq!(projected, vec![0., 0.5, 0.5]);

        let raw = vec![0.9, 0.1, 0.1, 0.1];
        let projected = project(&raw, 4, 2).unwrap();
        assert!((projected[0] - 0.9).abs() < FLOAT_COMPARISON_EPSILON);
        assert_eq!(projected[1], 0.);
        assert_eq!(projected[2], 0.);
        assert!((projected[3] - 0.1).abs() < FLOAT_COMPARISON_EPSILON);
    }

    #[test]
    fn test_negative_survivors_reduce_holdings_below_cardinality() {
        let raw = vec![0.8, -0.1, -0.2, -0.9];
        let projected = enforce_constraints(&raw, 4, 3).unwrap();

        assert_eq!(projected.outcome, ProjectionOutcome::Feasible);
        assert_eq!(projected.weights, vec![1., 0., 0., 0.]);
    }

    #[test]
    fn test_raw_input_is_left_untouched() {
        let raw = vec![0.3, -0.2, 0.1, 0.6];
        let before = raw.clone();
        let _ = CardinalityProjection::new(4, 1).project(&raw).unwrap();
        assert_eq!(raw, before);
    }

    #[test]
    fn test_identity_projection_copies_input() {
        let raw = vec![-3., 2.5, 0.];
        let projected = IdentityProjection.project(&raw).unwrap();
        assert_eq!(projected.weights, raw);
        assert!(!projected.is_degenerate());
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        assert_eq!(
            enforce_constraints(&[0.4, 0.6], 3, 2),
            Err(ProjectionError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        );
        // checked before the degenerate fallback too
        assert!(project(&[-1., -1., -1., -1.], 3, 1).is_err());
        assert!(CardinalityProjection::new(2, 1).project(&[1., 2., 3.]).is_err());
    }
}
