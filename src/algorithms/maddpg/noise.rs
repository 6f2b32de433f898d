//! Exploration noise with a linear anneal over the training horizon.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::StandardNormal;

/// Zero-mean Gaussian exploration noise.
///
/// The standard deviation decays linearly from `std` at episode 0 to zero at
/// `total_episodes`, and stays at zero afterwards. The episode index is always
/// supplied by the caller.
#[derive(Debug, Clone)]
pub struct ExplorationNoise {
    std: f64,
    total_episodes: usize,
    rng: StdRng,
}

impl ExplorationNoise {
    /// Creates a noise source. `seed = None` draws the RNG state from entropy.
    pub fn new(std: f64, total_episodes: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            std,
            total_episodes,
            rng,
        }
    }

    /// Decay factor `max(0, 1 - episode / total_episodes)`.
    pub fn decay(&self, episode: usize) -> f64 {
        if self.total_episodes == 0 {
            return 0.0;
        }
        (1.0 - episode as f64 / self.total_episodes as f64).max(0.0)
    }

    /// Effective standard deviation at `episode`.
    pub fn scale(&self, episode: usize) -> f64 {
        self.std * self.decay(episode)
    }

    /// Draws one noise value for `episode`.
    pub fn sample(&mut self, episode: usize) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z * self.scale(episode)
    }

    /// Initial standard deviation.
    pub fn std(&self) -> f64 {
        self.std
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_is_linear() {
        let noise = ExplorationNoise::new(0.2, 100, Some(0));
        assert!((noise.decay(0) - 1.0).abs() < 1e-12);
        assert!((noise.decay(50) - 0.5).abs() < 1e-12);
        assert_eq!(noise.decay(100), 0.0);
    }

    #[test]
    fn decay_clamps_past_horizon() {
        let noise = ExplorationNoise::new(0.2, 100, Some(0));
        assert_eq!(noise.decay(250), 0.0);
        assert_eq!(noise.scale(250), 0.0);
    }

    #[test]
    fn no_noise_at_final_episode() {
        let mut noise = ExplorationNoise::new(0.5, 10, Some(1));
        for _ in 0..20 {
            assert_eq!(noise.sample(10), 0.0);
        }
    }

    #[test]
    fn full_scale_noise_at_start() {
        let mut noise = ExplorationNoise::new(1.0, 10, Some(2));
        let draws: Vec<f64> = (0..2000).map(|_| noise.sample(0)).collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.1);
        assert!((var.sqrt() - 1.0).abs() < 0.1);
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let mut a = ExplorationNoise::new(0.3, 10, Some(42));
        let mut b = ExplorationNoise::new(0.3, 10, Some(42));
        for episode in 0..5 {
            assert_eq!(a.sample(episode), b.sample(episode));
        }
    }
}
