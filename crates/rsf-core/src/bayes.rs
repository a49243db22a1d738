// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Bayesian Ensemble Sampling
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Affine-invariant ensemble MCMC (stretch move) and chain persistence.
//!
//! The ensemble is split in two halves; every walker of one half proposes
//!   y = x_j + z (x_k − x_j),  z ~ g(z) ∝ 1/√z on [1/s, s]
//! against a random walker `j` of the other half, and is accepted with
//! probability min(1, z^{n−1} p(y)/p(x_k)). Proposals within a half are
//! independent, so their log-probabilities are evaluated in parallel.

use crate::forward::ForwardSolver;
use crate::residual::ResidualEvaluator;
use crate::uncertainty::posterior_summary;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use rsf_types::config::SamplerConfig;
use rsf_types::constants::SIGMA;
use rsf_types::error::{RsfError, RsfResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Redraws allowed per walker when the initial ball lands outside the support.
const INIT_ATTEMPTS: usize = 100;

/// Retained posterior draws, flattened across walkers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleChain {
    pub parameter_names: Vec<String>,
    /// One row per retained draw, one column per parameter.
    pub samples: Array2<f64>,
    pub acceptance_fraction: f64,
}

impl SampleChain {
    pub fn save(&self, path: impl AsRef<Path>) -> RsfResult<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn restore(path: impl AsRef<Path>) -> RsfResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let chain: Self = serde_json::from_str(&contents)?;
        if chain.samples.ncols() != chain.parameter_names.len() {
            return Err(RsfError::ConfigError(format!(
                "Chain has {} columns but names {} parameters",
                chain.samples.ncols(),
                chain.parameter_names.len()
            )));
        }
        if chain.samples.nrows() == 0 {
            return Err(RsfError::ConfigError("Chain holds no samples".to_string()));
        }
        Ok(chain)
    }

    /// Fail unless the chain was sampled over exactly `expected`, in order.
    pub fn check_names(&self, expected: &[String]) -> RsfResult<()> {
        if self.parameter_names != expected {
            return Err(RsfError::ConfigError(format!(
                "Chain parameters [{}] do not match inversion parameters [{}]",
                self.parameter_names.join(", "),
                expected.join(", ")
            )));
        }
        Ok(())
    }

    /// Posterior mean and standard deviation per parameter.
    pub fn summary(&self) -> RsfResult<(Array1<f64>, Array1<f64>)> {
        posterior_summary(&self.samples)
    }
}

/// Gaussian log-likelihood `−½ Σ ((obs − model)/σ)² − m ln σ`.
pub fn gaussian_log_likelihood(observed: &[f64], modelled: &[f64], sigma: f64) -> f64 {
    let inv_sigma = 1.0 / sigma;
    let chi_sq: f64 = observed
        .iter()
        .zip(modelled.iter())
        .map(|(o, m)| {
            let z = (o - m) * inv_sigma;
            z * z
        })
        .sum();
    -0.5 * chi_sq - observed.len() as f64 * sigma.ln()
}

/// Flat prior on the physically admissible region.
pub fn log_prior(names: &[String], x: &[f64]) -> f64 {
    for (name, &value) in names.iter().zip(x.iter()) {
        let admissible = value.is_finite()
            && match name.as_str() {
                SIGMA => value > 0.0,
                "Dc" | "V0" => (1.0 / value).is_finite(),
                _ => true,
            };
        if !admissible {
            return f64::NEG_INFINITY;
        }
    }
    0.0
}

/// Log-posterior of `x = [physical..., sigma]` against the evaluator's dataset.
///
/// Forward failures map to −∞ so the proposal is simply rejected.
pub fn log_posterior<F: ForwardSolver>(
    evaluator: &mut ResidualEvaluator<'_, F>,
    names: &[String],
    x: &[f64],
) -> f64 {
    let lp = log_prior(names, x);
    if !lp.is_finite() {
        return lp;
    }
    let Some((&sigma, physical)) = x.split_last() else {
        return f64::NEG_INFINITY;
    };
    let dataset = evaluator.dataset();
    match evaluator.residual(physical, &dataset.t) {
        Ok(model) => {
            let ll = gaussian_log_likelihood(&dataset.mu, &model, sigma);
            if ll.is_nan() {
                f64::NEG_INFINITY
            } else {
                lp + ll
            }
        }
        Err(_) => f64::NEG_INFINITY,
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleSampler {
    pub config: SamplerConfig,
}

impl EnsembleSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn sample_stretch(&self, rng: &mut StdRng) -> f64 {
        let s = self.config.stretch;
        let u: f64 = rng.gen();
        let root = (s - 1.0) * u + 1.0;
        root * root / s
    }

    /// Run the ensemble from a ball around `seed` and keep post-burn-in draws.
    pub fn run<P>(&self, names: &[String], seed: &Array1<f64>, log_prob: P) -> RsfResult<SampleChain>
    where
        P: Fn(&[f64]) -> f64 + Sync,
    {
        let ndim = seed.len();
        self.config.validate(ndim)?;
        if names.len() != ndim {
            return Err(RsfError::ConfigError(format!(
                "Sampler got {} names for a {ndim}-dimensional seed",
                names.len()
            )));
        }
        let n_walkers = self.config.n_walkers;
        let half = n_walkers / 2;
        let mut rng = self.rng();

        let mut walkers = Array2::<f64>::zeros((n_walkers, ndim));
        for k in 0..n_walkers {
            let mut x = vec![0.0; ndim];
            for _ in 0..INIT_ATTEMPTS {
                for d in 0..ndim {
                    let jitter = self.config.init_spread * rng.sample::<f64, _>(StandardNormal);
                    x[d] = if seed[d] != 0.0 {
                        seed[d] * (1.0 + jitter)
                    } else {
                        jitter
                    };
                }
                if log_prior(names, &x).is_finite() {
                    break;
                }
            }
            for d in 0..ndim {
                walkers[[k, d]] = x[d];
            }
        }
        let rows: Vec<Vec<f64>> = walkers.outer_iter().map(|r| r.to_vec()).collect();
        let mut lp: Vec<f64> = rows.par_iter().map(|x| log_prob(x.as_slice())).collect();
        if let Some(k) = lp.iter().position(|v| !v.is_finite()) {
            return Err(RsfError::FitError {
                iterations: 0,
                message: format!("initial walker {k} has zero posterior probability"),
            });
        }

        let kept = self.config.n_steps - self.config.n_burn;
        let mut samples = Array2::<f64>::zeros((kept * n_walkers, ndim));
        let mut accepted = 0usize;
        let report_every = (self.config.n_steps / 10).max(1);

        for step in 0..self.config.n_steps {
            for active in 0..2 {
                let (lo, other_lo) = if active == 0 { (0, half) } else { (half, 0) };

                let mut proposals = Vec::with_capacity(half);
                let mut stretches = Vec::with_capacity(half);
                for k in lo..lo + half {
                    let j = other_lo + rng.gen_range(0..half);
                    let z = self.sample_stretch(&mut rng);
                    let y: Vec<f64> = (0..ndim)
                        .map(|d| walkers[[j, d]] + z * (walkers[[k, d]] - walkers[[j, d]]))
                        .collect();
                    proposals.push(y);
                    stretches.push(z);
                }
                let lp_new: Vec<f64> = proposals.par_iter().map(|y| log_prob(y.as_slice())).collect();

                for (i, (y, z)) in proposals.iter().zip(stretches.iter()).enumerate() {
                    let k = lo + i;
                    let log_ratio = (ndim as f64 - 1.0) * z.ln() + lp_new[i] - lp[k];
                    let u: f64 = rng.gen();
                    if lp_new[i].is_finite() && u.ln() < log_ratio {
                        for d in 0..ndim {
                            walkers[[k, d]] = y[d];
                        }
                        lp[k] = lp_new[i];
                        accepted += 1;
                    }
                }
            }

            if step >= self.config.n_burn {
                let base = (step - self.config.n_burn) * n_walkers;
                for k in 0..n_walkers {
                    samples.row_mut(base + k).assign(&walkers.row(k));
                }
            }
            if (step + 1) % report_every == 0 {
                debug!(
                    step = step + 1,
                    n_steps = self.config.n_steps,
                    acceptance = accepted as f64 / ((step + 1) * n_walkers) as f64,
                    "sampler progress"
                );
            }
        }

        if accepted == 0 {
            return Err(RsfError::FitError {
                iterations: self.config.n_steps,
                message: "sampler accepted no proposals".to_string(),
            });
        }
        Ok(SampleChain {
            parameter_names: names.to_vec(),
            samples,
            acceptance_fraction: accepted as f64 / (self.config.n_steps * n_walkers) as f64,
        })
    }
}
