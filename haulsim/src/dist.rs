// HaulSim: Open-Pit Haulage Simulator written in Rust
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Random time generators.
//!
//! Every duration in the simulation (travel, filling, emptying) is drawn from
//! a [`TimeDistribution`] parameterized by the mean and standard deviation of
//! the modeled task. Implementations must return nonnegative values and reject
//! parameter combinations that could produce negative ones; the kernel does
//! not catch such errors.

use std::sync::Mutex;

use rand::{Rng, RngCore};

use crate::types::SimError;

/// The square root of three, relating the half-width of a uniform
/// distribution to its standard deviation.
const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// A generator of nonnegative random task durations.
///
/// The trait is object safe so that a single simulator can be handed any
/// distribution at run time, and `Send + Sync` so that fitness evaluations
/// can fan out across threads.
pub trait TimeDistribution: std::fmt::Debug + Send + Sync {
    /// Draw a single duration for a task with the given `mean` and standard
    /// deviation `sd`.
    fn sample(&self, mean: f64, sd: f64, rng: &mut dyn RngCore) -> Result<f64, SimError>;
}

/// A degenerate distribution that always returns the mean.
///
/// This turns the stochastic simulator into a deterministic one, which the
/// DISPATCH controller uses to estimate incoming trucks, and which the test
/// scenarios use to derive exact cycle counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicTimes;

impl TimeDistribution for DeterministicTimes {
    fn sample(&self, mean: f64, _sd: f64, _rng: &mut dyn RngCore) -> Result<f64, SimError> {
        Ok(mean)
    }
}

/// Uniform distribution on `[mean - sd*sqrt(3), mean + sd*sqrt(3)]`.
///
/// The half-width is chosen such that the standard deviation of the uniform
/// distribution equals the requested `sd`. Queries where the lower bound
/// would be negative are rejected with [`SimError::DistributionDomain`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformTimes;

impl TimeDistribution for UniformTimes {
    fn sample(&self, mean: f64, sd: f64, rng: &mut dyn RngCore) -> Result<f64, SimError> {
        let half_width = sd * SQRT_3;
        if half_width > mean || sd < 0.0 {
            return Err(SimError::DistributionDomain { mean, sd });
        }
        if half_width == 0.0 {
            return Ok(mean);
        }
        Ok(rng.gen_range((mean - half_width)..=(mean + half_width)))
    }
}

/// Uniform distribution with a preset relative noise level.
///
/// The configured standard deviation is ignored; instead, every value is
/// drawn uniformly from `mean * [1 - noise, 1 + noise]`. Useful to study the
/// sensitivity of a dispatching policy against a single noise knob.
#[derive(Debug, Clone, Copy)]
pub struct NoisyTimes {
    /// Relative half-width of the sampling interval, in `[0, 1)`.
    noise: f64,
}

impl NoisyTimes {
    /// Create a new noise-preset distribution. Fails if `noise` does not lie
    /// in `[0, 1)`.
    pub fn new(noise: f64) -> Result<Self, SimError> {
        if !(0.0..1.0).contains(&noise) {
            return Err(SimError::DistributionDomain {
                mean: 1.0,
                sd: noise,
            });
        }
        Ok(Self { noise })
    }
}

impl TimeDistribution for NoisyTimes {
    fn sample(&self, mean: f64, _sd: f64, rng: &mut dyn RngCore) -> Result<f64, SimError> {
        if mean < 0.0 {
            return Err(SimError::DistributionDomain {
                mean,
                sd: self.noise,
            });
        }
        if self.noise == 0.0 || mean == 0.0 {
            return Ok(mean);
        }
        Ok(rng.gen_range((mean * (1.0 - self.noise))..=(mean * (1.0 + self.noise))))
    }
}

/// Replays a fixed sequence of durations, then falls back to the mean.
///
/// Only used in tests that need full control over individual draws (e.g., to
/// force a fast truck behind a slow one on the same road).
#[derive(Debug, Default)]
pub struct SequenceTimes {
    values: Mutex<Vec<f64>>,
}

impl SequenceTimes {
    /// Create a generator replaying `values` front to back.
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = values.into_iter().collect();
        values.reverse();
        Self {
            values: Mutex::new(values),
        }
    }
}

impl TimeDistribution for SequenceTimes {
    fn sample(&self, mean: f64, sd: f64, _rng: &mut dyn RngCore) -> Result<f64, SimError> {
        match self.values.lock().unwrap().pop() {
            Some(x) if x < 0.0 => Err(SimError::DistributionDomain { mean: x, sd }),
            Some(x) => Ok(x),
            None => Ok(mean),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn deterministic_returns_mean() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(DeterministicTimes.sample(5.0, 3.0, &mut rng), Ok(5.0));
    }

    #[test]
    fn uniform_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let (mean, sd) = (10.0, 2.0);
        for _ in 0..1000 {
            let x = UniformTimes.sample(mean, sd, &mut rng).unwrap();
            assert!(x >= mean - sd * SQRT_3);
            assert!(x <= mean + sd * SQRT_3);
        }
    }

    #[test]
    fn uniform_zero_sd_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(UniformTimes.sample(7.5, 0.0, &mut rng), Ok(7.5));
    }

    #[test]
    fn uniform_rejects_wide_sd() {
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(
            UniformTimes.sample(1.0, 1.0, &mut rng),
            Err(SimError::DistributionDomain { mean: 1.0, sd: 1.0 })
        );
    }

    #[test]
    fn noisy_tracks_mean() {
        let mut rng = StdRng::seed_from_u64(5);
        let dist = NoisyTimes::new(0.1).unwrap();
        for _ in 0..1000 {
            let x = dist.sample(20.0, 100.0, &mut rng).unwrap();
            assert!((18.0..=22.0).contains(&x));
        }
    }

    #[test]
    fn noisy_rejects_bad_level() {
        assert!(NoisyTimes::new(1.0).is_err());
        assert!(NoisyTimes::new(-0.1).is_err());
    }

    #[test]
    fn sequence_replays_then_mean() {
        let mut rng = StdRng::seed_from_u64(6);
        let dist = SequenceTimes::new([3.0, 1.0]);
        assert_eq!(dist.sample(9.0, 0.0, &mut rng), Ok(3.0));
        assert_eq!(dist.sample(9.0, 0.0, &mut rng), Ok(1.0));
        assert_eq!(dist.sample(9.0, 0.0, &mut rng), Ok(9.0));
    }
}
