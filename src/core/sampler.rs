/// Competency sampler — clamped-normal knowledge with correlated grammar/flow.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::competency::{CompetencyTriplet, Level};

/// Grammar and flow wander at most one step away from knowledge.
const PERTURBATIONS: [i8; 3] = [-1, 0, 1];

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("invalid knowledge distribution (mean {mean}, std dev {std_dev})")]
    InvalidDistribution { mean: f64, std_dev: f64 },
}

/// Parameters of the knowledge distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerParams {
    pub mean: f64,
    pub std_dev: f64,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            mean: 3.5,
            std_dev: 1.0,
        }
    }
}

/// Draws competency triplets for a simulated student population.
///
/// Knowledge comes from `Normal(mean, std_dev)`, rounded and clamped to
/// the 1..=5 scale. Grammar and flow are each knowledge plus an
/// independent uniform pick from {-1, 0, +1}, clamped again.
#[derive(Debug, Clone)]
pub struct CompetencySampler {
    params: SamplerParams,
    knowledge: Normal<f64>,
}

impl CompetencySampler {
    /// Fails unless the mean is finite and the standard deviation is a
    /// finite, non-negative number.
    pub fn new(params: SamplerParams) -> Result<Self, SamplerError> {
        let invalid = || SamplerError::InvalidDistribution {
            mean: params.mean,
            std_dev: params.std_dev,
        };
        if !params.mean.is_finite() || !params.std_dev.is_finite() || params.std_dev < 0.0 {
            return Err(invalid());
        }
        let knowledge = Normal::new(params.mean, params.std_dev).map_err(|_| invalid())?;
        Ok(Self { params, knowledge })
    }

    pub fn params(&self) -> SamplerParams {
        self.params
    }

    /// Draw a single triplet.
    pub fn sample_one<R: Rng + ?Sized>(&self, rng: &mut R) -> CompetencyTriplet {
        let raw = self.knowledge.sample(rng);
        let knowledge = Level::clamped(raw.round() as i64);
        CompetencyTriplet {
            knowledge,
            grammar: knowledge.offset(perturbation(rng)),
            flow: knowledge.offset(perturbation(rng)),
        }
    }

    /// Draw `n` independent triplets.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<CompetencyTriplet> {
        (0..n).map(|_| self.sample_one(rng)).collect()
    }
}

impl Default for CompetencySampler {
    fn default() -> Self {
        let params = SamplerParams::default();
        Self {
            params,
            knowledge: Normal::new(params.mean, params.std_dev)
                .unwrap_or_else(|_| unreachable!("default parameters are valid")),
        }
    }
}

fn perturbation<R: Rng + ?Sized>(rng: &mut R) -> i8 {
    PERTURBATIONS.choose(rng).copied().unwrap_or(0)
}
