// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{RsfError, RsfResult};
use crate::state::LoadingProtocol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level inversion session configuration (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionConfig {
    /// Initial parameter set. Required keys are checked by the parameter store.
    pub parameters: BTreeMap<String, f64>,
    #[serde(default = "default_state_evolution")]
    pub state_evolution: String,
    #[serde(default = "default_inversion_params")]
    pub inversion_params: Vec<String>,
    /// Kept as text so an unknown mode is reported by the inversion, not the parser.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub bayesian: bool,
    /// Previously persisted chain to restore instead of sampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_source: Option<PathBuf>,
    /// Where to persist a freshly sampled chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_output: Option<PathBuf>,
    #[serde(default)]
    pub least_squares: LeastSquaresConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading: Option<LoadingProtocol>,
}

fn default_state_evolution() -> String {
    "aging".to_string()
}
fn default_inversion_params() -> Vec<String> {
    vec!["a".to_string(), "b".to_string(), "Dc".to_string()]
}
fn default_mode() -> String {
    "dense".to_string()
}

/// Levenberg–Marquardt settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeastSquaresConfig {
    #[serde(default = "default_lsq_max_iterations")]
    pub max_iterations: usize,
    /// Relative cost / step tolerance for convergence.
    #[serde(default = "default_lsq_tolerance")]
    pub tolerance: f64,
    /// Relative forward-difference step for the Jacobian.
    #[serde(default = "default_fd_step")]
    pub fd_step: f64,
    #[serde(default = "default_initial_damping")]
    pub initial_damping: f64,
}

fn default_lsq_max_iterations() -> usize {
    100
}
fn default_lsq_tolerance() -> f64 {
    1e-10
}
fn default_fd_step() -> f64 {
    1e-6
}
fn default_initial_damping() -> f64 {
    1e-3
}

impl Default for LeastSquaresConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_lsq_max_iterations(),
            tolerance: default_lsq_tolerance(),
            fd_step: default_fd_step(),
            initial_damping: default_initial_damping(),
        }
    }
}

impl LeastSquaresConfig {
    pub fn validate(&self) -> RsfResult<()> {
        if self.max_iterations == 0 {
            return Err(RsfError::ConfigError(
                "least_squares.max_iterations must be >= 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(RsfError::ConfigError(
                "least_squares.tolerance must be finite and > 0".to_string(),
            ));
        }
        if !self.fd_step.is_finite() || self.fd_step <= 0.0 {
            return Err(RsfError::ConfigError(
                "least_squares.fd_step must be finite and > 0".to_string(),
            ));
        }
        if !self.initial_damping.is_finite() || self.initial_damping <= 0.0 {
            return Err(RsfError::ConfigError(
                "least_squares.initial_damping must be finite and > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ensemble sampler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_n_walkers")]
    pub n_walkers: usize,
    #[serde(default = "default_n_steps")]
    pub n_steps: usize,
    #[serde(default = "default_n_burn")]
    pub n_burn: usize,
    /// Stretch-move scale `a`; proposals use `z ~ g(z) ∝ 1/sqrt(z)` on `[1/a, a]`.
    #[serde(default = "default_stretch")]
    pub stretch: f64,
    /// Relative radius of the initial walker ball around the seed.
    #[serde(default = "default_init_spread")]
    pub init_spread: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_n_walkers() -> usize {
    32
}
fn default_n_steps() -> usize {
    2000
}
fn default_n_burn() -> usize {
    500
}
fn default_stretch() -> f64 {
    2.0
}
fn default_init_spread() -> f64 {
    1e-3
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            n_walkers: default_n_walkers(),
            n_steps: default_n_steps(),
            n_burn: default_n_burn(),
            stretch: default_stretch(),
            init_spread: default_init_spread(),
            seed: None,
        }
    }
}

impl SamplerConfig {
    /// Check settings against the dimension of the sampled vector.
    pub fn validate(&self, ndim: usize) -> RsfResult<()> {
        if ndim == 0 {
            return Err(RsfError::ConfigError(
                "sampler needs at least one parameter".to_string(),
            ));
        }
        if self.n_walkers < 2 * ndim || self.n_walkers % 2 != 0 {
            return Err(RsfError::ConfigError(format!(
                "sampler.n_walkers must be even and >= 2 * ndim ({}), got {}",
                2 * ndim,
                self.n_walkers
            )));
        }
        if self.n_steps == 0 || self.n_burn >= self.n_steps {
            return Err(RsfError::ConfigError(format!(
                "sampler.n_burn ({}) must be < sampler.n_steps ({})",
                self.n_burn, self.n_steps
            )));
        }
        if !self.stretch.is_finite() || self.stretch <= 1.0 {
            return Err(RsfError::ConfigError(
                "sampler.stretch must be finite and > 1".to_string(),
            ));
        }
        if !self.init_spread.is_finite() || self.init_spread <= 0.0 {
            return Err(RsfError::ConfigError(
                "sampler.init_spread must be finite and > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Adaptive forward-solver tolerances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    #[serde(default = "default_atol")]
    pub atol: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Initial step as a fraction of the integration span.
    #[serde(default = "default_initial_step")]
    pub initial_step: f64,
}

fn default_rtol() -> f64 {
    1e-10
}
fn default_atol() -> f64 {
    1e-14
}
fn default_max_steps() -> usize {
    100_000
}
fn default_initial_step() -> f64 {
    1e-6
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            rtol: default_rtol(),
            atol: default_atol(),
            max_steps: default_max_steps(),
            initial_step: default_initial_step(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> RsfResult<()> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(RsfError::ConfigError(
                "solver.rtol must be finite and > 0".to_string(),
            ));
        }
        if !self.atol.is_finite() || self.atol < 0.0 {
            return Err(RsfError::ConfigError(
                "solver.atol must be finite and >= 0".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(RsfError::ConfigError(
                "solver.max_steps must be >= 1".to_string(),
            ));
        }
        if !self.initial_step.is_finite() || self.initial_step <= 0.0 || self.initial_step > 1.0 {
            return Err(RsfError::ConfigError(
                "solver.initial_step must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

impl InversionConfig {
    /// Minimal config around a parameter set; every other section defaulted.
    pub fn with_parameters(parameters: BTreeMap<String, f64>) -> Self {
        Self {
            parameters,
            state_evolution: default_state_evolution(),
            inversion_params: default_inversion_params(),
            mode: default_mode(),
            bayesian: false,
            chain_source: None,
            chain_output: None,
            least_squares: LeastSquaresConfig::default(),
            sampler: SamplerConfig::default(),
            solver: SolverConfig::default(),
            loading: None,
        }
    }

    /// Load from JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> RsfResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> RsfResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
