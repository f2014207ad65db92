/*
 * PanSim
 * Copyright (c) 2020  ThoughtWorks, Inc.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 */

use rand::Rng;

use crate::error::{Error, Result};
use crate::models::constants::PROB_SUM_TOLERANCE;

/// Constant-time sampler over a categorical distribution, built with Vose's
/// alias method. Construction is O(n); each sample costs one die roll and
/// one biased coin flip.
#[derive(Debug, Clone)]
pub struct CategoricalSampler {
    values: Vec<i64>,
    prob: Vec<f64>,
    alias: Vec<usize>,
}

impl CategoricalSampler {
    pub fn new(dist: &[(i64, f64)]) -> Result<CategoricalSampler> {
        if dist.is_empty() {
            return Err(Error::InvalidModel(
                "categorical distribution has no categories".to_string(),
            ));
        }
        for &(value, p) in dist {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::InvalidModel(format!(
                    "probability {} for category {} is outside [0, 1]",
                    p, value
                )));
            }
        }
        let total: f64 = dist.iter().map(|&(_, p)| p).sum();
        if (total - 1.0).abs() > PROB_SUM_TOLERANCE {
            return Err(Error::InvalidModel(format!(
                "probabilities in the distribution sum to {}, not 1",
                total
            )));
        }

        let n = dist.len();
        let values: Vec<i64> = dist.iter().map(|&(v, _)| v).collect();
        let mut scaled: Vec<f64> = dist.iter().map(|&(_, p)| p * n as f64).collect();
        let mut prob = vec![0.0f64; n];
        let mut alias = vec![0usize; n];

        let mut small: Vec<usize> = Vec::new();
        let mut large: Vec<usize> = Vec::new();
        for (i, &s) in scaled.iter().enumerate() {
            if s < 1.0 {
                small.push(i);
            } else {
                large.push(i);
            }
        }

        while let (Some(&l), Some(&g)) = (small.last(), large.last()) {
            small.pop();
            large.pop();
            prob[l] = scaled[l];
            alias[l] = g;
            scaled[g] = (scaled[g] + scaled[l]) - 1.0;
            if scaled[g] < 1.0 {
                small.push(g);
            } else {
                large.push(g);
            }
        }
        // Leftovers are within rounding error of 1.
        for &g in large.iter().chain(small.iter()) {
            prob[g] = 1.0;
        }

        Ok(CategoricalSampler { values, prob, alias })
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        let i = rng.gen_range(0..self.values.len());
        if rng.gen::<f64>() < self.prob[i] {
            self.values[i]
        } else {
            self.values[self.alias[i]]
        }
    }

    /// The category values this sampler can produce.
    pub fn values(&self) -> &[i64] {
        &self.values
    }
}

/// Sampler over the distribution families the model file supports.
#[derive(Debug, Clone)]
pub enum Sampler {
    Fixed(i64),
    Categorical(CategoricalSampler),
}

impl Sampler {
    pub fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        match self {
            Sampler::Fixed(value) => *value,
            Sampler::Categorical(sampler) => sampler.sample(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn fixed_sampler_returns_value() {
        let mut rng = StdRng::seed_from_u64(0);
        let sampler = Sampler::Fixed(7);
        for _ in 0..10 {
            assert_eq!(sampler.sample(&mut rng), 7);
        }
    }

    #[test]
    fn should_reject_bad_sum() {
        let result = CategoricalSampler::new(&[(0, 0.5), (1, 0.4)]);
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[test]
    fn should_reject_empty() {
        let result = CategoricalSampler::new(&[]);
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[test]
    fn degenerate_categorical_is_constant() {
        let mut rng = StdRng::seed_from_u64(1);
        let sampler = CategoricalSampler::new(&[(3, 1.0)]).unwrap();
        for _ in 0..100 {
            assert_eq!(sampler.sample(&mut rng), 3);
        }
    }

    #[test]
    fn alias_table_matches_distribution() {
        let mut rng = StdRng::seed_from_u64(42);
        let sampler = CategoricalSampler::new(&[(0, 0.2), (1, 0.3), (2, 0.5)]).unwrap();

        let n = 200_000;
        let mut counts = [0usize; 3];
        for _ in 0..n {
            counts[sampler.sample(&mut rng) as usize] += 1;
        }
        let freq: Vec<f64> = counts.iter().map(|&c| c as f64 / n as f64).collect();
        assert!((freq[0] - 0.2).abs() < 0.01);
        assert!((freq[1] - 0.3).abs() < 0.01);
        assert!((freq[2] - 0.5).abs() < 0.01);
    }
}
