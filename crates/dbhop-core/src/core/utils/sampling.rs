use rand::{distributions::WeightedIndex, prelude::*};
use rand_distr::Exp1;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("Input weights list is empty, cannot perform sampling")]
    EmptyWeights,
    #[error("All weights are zero, resulting in zero total weight for sampling")]
    ZeroTotalWeight,
    #[error("Failed to create weighted distribution: {source}")]
    DistributionError {
        #[from]
        source: rand::distributions::WeightedError,
    },
}

/// Draws a unit-mean exponential residual lifetime.
#[inline]
pub fn draw_lifetime(rng: &mut impl Rng) -> f64 {
    Exp1.sample(rng)
}

/// Picks an index with probability proportional to its weight.
///
/// An all-zero weight vector is reported as an error instead of being sampled.
#[instrument(level = "trace", skip_all, fields(n = weights.len()))]
pub fn weighted_choice(weights: &[f64], rng: &mut impl Rng) -> Result<usize, SamplingError> {
    if weights.is_empty() {
        return Err(SamplingError::EmptyWeights);
    }

    let total_weight: f64 = weights.iter().sum();
    if !(total_weight > 0.0) {
        return Err(SamplingError::ZeroTotalWeight);
    }

    let dist = WeightedIndex::new(weights)?;
    Ok(dist.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn empty_weights_are_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            weighted_choice(&[], &mut rng),
            Err(SamplingError::EmptyWeights)
        ));
    }

    #[test]
    fn all_zero_weights_are_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            weighted_choice(&[0.0, 0.0], &mut rng),
            Err(SamplingError::ZeroTotalWeight)
        ));
    }

    #[test]
    fn zero_weight_entries_are_never_chosen() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            assert_eq!(weighted_choice(&[0.0, 2.0, 0.0], &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn choice_frequencies_follow_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let n = 20_000;
        let hits = (0..n)
            .filter(|_| weighted_choice(&[1.0, 3.0], &mut rng).unwrap() == 1)
            .count();
        let frac = hits as f64 / n as f64;
        assert!((frac - 0.75).abs() < 0.02);
    }

    #[test]
    fn lifetimes_have_unit_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let n = 50_000;
        let mean = (0..n).map(|_| draw_lifetime(&mut rng)).sum::<f64>() / n as f64;
        assert!(draw_lifetime(&mut rng) >= 0.0);
        assert!((mean - 1.0).abs() < 0.03);
    }
}
