//! Seedable noise for simulated devices

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, StandardNormal, Uniform};

#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// Seed 0 draws from entropy; any other seed is reproducible
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Derived generator for one device, distinct per `stream`
    pub fn for_device(seed: u64, stream: u64) -> Self {
        if seed == 0 {
            Self::new(0)
        } else {
            Self::new(seed.wrapping_mul(31).wrapping_add(stream))
        }
    }

    #[inline]
    pub fn gaussian(&mut self, stddev: f32) -> f32 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// Uniform in [0, 1)
    #[inline]
    pub fn uniform(&mut self) -> f32 {
        Uniform::new(0.0f32, 1.0).sample(&mut self.rng)
    }

    #[inline]
    pub fn chance(&mut self, probability: f32) -> bool {
        probability > 0.0 && self.uniform() < probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_seed() {
        let mut a = NoiseGenerator::new(42);
        let mut b = NoiseGenerator::new(42);
        for _ in 0..100 {
            assert_eq!(a.gaussian(1.0), b.gaussian(1.0));
        }
    }

    #[test]
    fn test_device_streams_differ() {
        let mut a = NoiseGenerator::for_device(7, 1);
        let mut b = NoiseGenerator::for_device(7, 2);
        let same = (0..20).all(|_| a.gaussian(1.0) == b.gaussian(1.0));
        assert!(!same);
    }

    #[test]
    fn test_zero_probability_never_fires() {
        let mut noise = NoiseGenerator::new(3);
        assert!((0..1000).all(|_| !noise.chance(0.0)));
    }

    #[test]
    fn test_chance_probability() {
        let mut noise = NoiseGenerator::new(42);
        let hits = (0..10_000).filter(|_| noise.chance(0.3)).count();
        let ratio = hits as f32 / 10_000.0;
        assert!((ratio - 0.3).abs() < 0.05);
    }
}
