use nalgebra::{DMatrix, DVector};
use rand::distributions::Uniform;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use statrs::distribution::MultivariateNormal;
use thiserror::Error;

// Daily-scale factor model parameters
const FACTOR_MEAN_RETURN: f64 = 0.0004;
const FACTOR_VARIANCE_RANGE: (f64, f64) = (1e-5, 1e-4);
const LOADING_RANGE: (f64, f64) = (0.5, 1.5);
const IDIOSYNCRATIC_VARIANCE: f64 = 1e-4;
const COVARIANCE_JITTER: f64 = 1e-10;

#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("Invalid sampler parameters: {0}")]
    InvalidParameters(String),
    #[error("Failed to create the return distribution: {0}")]
    Distribution(String),
}

/// Synthetic periodic simple returns, `returns[t][asset]`.
///
/// Every sampler owns a seeded `ChaCha20Rng` so that a scenario can be
/// regenerated exactly from its seed.
#[derive(Debug, Clone)]
pub enum Sampler {
    FactorModel {
        assets_under_management: usize,
        number_of_factors: usize,
        periods_to_sample: usize,
        normal_distribution: MultivariateNormal,
        rng: ChaCha20Rng,
        seed: u64,
    },
    Normal {
        assets_under_management: usize,
        periods_to_sample: usize,
        normal_distribution: MultivariateNormal,
        rng: ChaCha20Rng,
        seed: u64,
    },
}

impl Sampler {
    /// Random linear factor model: `r = B f + e`, with diagonal factor and
    /// idiosyncratic covariances. The model itself is drawn from the seed too.
    /// If seed is None, one is drawn from the OS so it can still be recorded.
    pub fn factor_model_synthetic(
        assets_under_management: usize,
        number_of_factors: usize,
        periods_to_sample: usize,
        seed: Option<u64>,
    ) -> Result<Self, SamplingError> {
        if assets_under_management == 0 || number_of_factors == 0 {
            return Err(SamplingError::InvalidParameters(
                "Assets and factors should be positive".into(),
            ));
        }
        let seed = seed.unwrap_or_else(|| rand::rngs::OsRng.next_u64());
        let mut rng = ChaCha20Rng::seed_from_u64(seed);

        let loading_distribution = Uniform::new(LOADING_RANGE.0, LOADING_RANGE.1);
        let variance_distribution = Uniform::new(FACTOR_VARIANCE_RANGE.0, FACTOR_VARIANCE_RANGE.1);

        let loadings = DMatrix::from_fn(assets_under_management, number_of_factors, |_, _| {
            rng.sample(&loading_distribution)
        });
        let factor_variances =
            DVector::from_fn(number_of_factors, |_, _| rng.sample(&variance_distribution));
        let covariance_factors = DMatrix::from_diagonal(&factor_variances);

        let mu_factors = DVector::from_element(number_of_factors, FACTOR_MEAN_RETURN);
        let mu_assets = (&loadings * mu_factors).iter().copied().collect::<Vec<f64>>();

        let covariance_assets = &loadings * covariance_factors * loadings.transpose()
            + DMatrix::from_diagonal_element(
                assets_under_management,
                assets_under_management,
                IDIOSYNCRATIC_VARIANCE,
            );
        // Enforce exact symmetry and keep it numerically positive-definite
        let covariance_assets = (&covariance_assets + covariance_assets.transpose()) * 0.5
            + DMatrix::from_diagonal_element(
                assets_under_management,
                assets_under_management,
                COVARIANCE_JITTER,
            );

        let normal_distribution = MultivariateNormal::new(
            mu_assets,
            covariance_assets.iter().copied().collect(),
        )
        .map_err(|e| SamplingError::Distribution(e.to_string()))?;

        Ok(Sampler::FactorModel {
            assets_under_management,
            number_of_factors,
            periods_to_sample,
            normal_distribution,
            rng,
            seed,
        })
    }

    /// `covariance` is the flattened `n x n` matrix.
    pub fn normal(
        means: &[f64],
        covariance: &[f64],
        periods_to_sample: usize,
        seed: Option<u64>,
    ) -> Result<Self, SamplingError> {
        if means.is_empty() || covariance.len() != means.len() * means.len() {
            return Err(SamplingError::InvalidParameters(format!(
                "Expected a {0}x{0} covariance for {0} means, got {1} entries",
                means.len(),
                covariance.len()
            )));
        }
        let seed = seed.unwrap_or_else(|| rand::rngs::OsRng.next_u64());
        let rng = ChaCha20Rng::seed_from_u64(seed);

        let normal_distribution = MultivariateNormal::new(means.to_vec(), covariance.to_vec())
            .map_err(|e| SamplingError::Distribution(e.to_string()))?;

        Ok(Sampler::Normal {
            assets_under_management: means.len(),
            periods_to_sample,
            normal_distribution,
            rng,
            seed,
        })
    }

    pub fn seed(&self) -> u64 {
        match self {
            Sampler::FactorModel { seed, .. } | Sampler::Normal { seed, .. } => *seed,
        }
    }

    pub fn assets(&self) -> usize {
        match self {
            Sampler::FactorModel {
                assets_under_management,
                ..
            }
            | Sampler::Normal {
                assets_under_management,
                ..
            } => *assets_under_management,
        }
    }

    /// Zero for plain normal samplers.
    pub fn number_of_factors(&self) -> usize {
        match self {
            Sampler::FactorModel {
                number_of_factors, ..
            } => *number_of_factors,
            Sampler::Normal { .. } => 0,
        }
    }

    pub fn periods_to_sample(&self) -> usize {
        match self {
            Sampler::FactorModel {
                periods_to_sample, ..
            }
            | Sampler::Normal {
                periods_to_sample, ..
            } => *periods_to_sample,
        }
    }

    /// Draws one scenario: `periods_to_sample` rows of per-asset returns.
    /// Advances the internal RNG.
    pub fn sample_returns(&mut self) -> Vec<Vec<f64>> {
        match self {
            Sampler::FactorModel {
                periods_to_sample,
                normal_distribution,
                rng,
                ..
            }
            | Sampler::Normal {
                periods_to_sample,
                normal_distribution,
                rng,
                ..
            } => (0..*periods_to_sample)
                .map(|_| {
                    normal_distribution
                        .sample(&mut *rng)
                        .iter()
                        .copied()
                        .collect::<Vec<f64>>()
                })
                .collect(),
        }
    }

    /// Restarts the scenario stream from a new seed. The factor model itself
    /// is kept.
    pub fn reseed(&mut self, new_seed: u64) {
        match self {
            Sampler::FactorModel { rng, seed, .. } | Sampler::Normal { rng, seed, .. } => {
                *rng = ChaCha20Rng::seed_from_u64(new_seed);
                *seed = new_seed;
            }
        }
    }
}
