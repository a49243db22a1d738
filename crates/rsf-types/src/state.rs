// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{RsfError, RsfResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How the forward solver lays out its output in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverMode {
    /// Evaluate exactly on the caller's time grid.
    #[default]
    Dense,
    /// Report the solver's own adaptive step grid.
    Step,
}

impl SolverMode {
    pub const ALL: [SolverMode; 2] = [SolverMode::Dense, SolverMode::Step];

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverMode::Dense => "dense",
            SolverMode::Step => "step",
        }
    }
}

impl fmt::Display for SolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolverMode {
    type Err = RsfError;

    fn from_str(s: &str) -> RsfResult<Self> {
        match s {
            "dense" => Ok(SolverMode::Dense),
            "step" => Ok(SolverMode::Step),
            other => Err(RsfError::ConfigError(format!(
                "Illegal solver mode '{other}'. Available options: {:?}",
                SolverMode::ALL.map(|m| m.as_str())
            ))),
        }
    }
}

/// One velocity step of the load point: from `t_start` on, it moves at `velocity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityStep {
    pub t_start: f64,
    pub velocity: f64,
}

/// Piecewise-constant load-point velocity history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadingProtocol {
    pub steps: Vec<VelocityStep>,
}

impl LoadingProtocol {
    /// Build a protocol from `(t_start, velocity)` pairs, sorted by start time.
    pub fn new(steps: &[(f64, f64)]) -> RsfResult<Self> {
        let mut steps: Vec<VelocityStep> = steps
            .iter()
            .map(|&(t_start, velocity)| VelocityStep { t_start, velocity })
            .collect();
        steps.sort_by(|x, y| x.t_start.total_cmp(&y.t_start));
        let protocol = Self { steps };
        protocol.validate()?;
        Ok(protocol)
    }

    pub fn validate(&self) -> RsfResult<()> {
        for step in &self.steps {
            if !step.t_start.is_finite() {
                return Err(RsfError::ConfigError(
                    "loading step start time must be finite".to_string(),
                ));
            }
            if !step.velocity.is_finite() || step.velocity <= 0.0 {
                return Err(RsfError::ConfigError(format!(
                    "loading velocity must be finite and > 0 (got {} at t={})",
                    step.velocity, step.t_start
                )));
            }
        }
        if self
            .steps
            .windows(2)
            .any(|w| w[1].t_start <= w[0].t_start)
        {
            return Err(RsfError::ConfigError(
                "loading step start times must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    /// Load-point velocity at time `t`, or `fallback` before the first step.
    pub fn velocity_at(&self, t: f64, fallback: f64) -> f64 {
        self.steps
            .iter()
            .take_while(|s| s.t_start <= t)
            .last()
            .map(|s| s.velocity)
            .unwrap_or(fallback)
    }

    /// Step times strictly inside `(t0, t1)`.
    pub fn breakpoints(&self, t0: f64, t1: f64) -> Vec<f64> {
        self.steps
            .iter()
            .map(|s| s.t_start)
            .filter(|&t| t > t0 && t < t1)
            .collect()
    }
}

/// Observed friction time series. Time is non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationDataset {
    pub t: Vec<f64>,
    pub mu: Vec<f64>,
}

impl ObservationDataset {
    pub fn new(t: Vec<f64>, mu: Vec<f64>) -> RsfResult<Self> {
        if t.len() != mu.len() {
            return Err(RsfError::ConfigError(format!(
                "Length mismatch: t={}, mu={}",
                t.len(),
                mu.len()
            )));
        }
        if t.len() < 2 {
            return Err(RsfError::ConfigError(
                "observation dataset needs at least two samples".to_string(),
            ));
        }
        if !t.iter().chain(mu.iter()).all(|v| v.is_finite()) {
            return Err(RsfError::ConfigError(
                "observation dataset contains non-finite values".to_string(),
            ));
        }
        if t.windows(2).any(|w| w[1] < w[0]) {
            return Err(RsfError::ConfigError(
                "observation times must be non-decreasing".to_string(),
            ));
        }
        Ok(Self { t, mu })
    }

    /// Load a two-column `t mu` text file (whitespace or comma separated).
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> RsfResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut t = Vec::new();
        let mut mu = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<&str> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .collect();
            if cols.len() < 2 {
                return Err(RsfError::ConfigError(format!(
                    "line {}: expected two columns, found {}",
                    lineno + 1,
                    cols.len()
                )));
            }
            let parse = |s: &str| {
                s.parse::<f64>().map_err(|e| {
                    RsfError::ConfigError(format!("line {}: '{s}': {e}", lineno + 1))
                })
            };
            t.push(parse(cols[0])?);
            mu.push(parse(cols[1])?);
        }
        Self::new(t, mu)
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

/// Forward-model output, index-aligned and time-ordered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub t: Vec<f64>,
    pub mu: Vec<f64>,
    pub v: Vec<f64>,
    pub theta: Vec<f64>,
}

impl Trajectory {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            t: Vec::with_capacity(n),
            mu: Vec::with_capacity(n),
            v: Vec::with_capacity(n),
            theta: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, t: f64, mu: f64, v: f64, theta: f64) {
        self.t.push(t);
        self.mu.push(mu);
        self.v.push(v);
        self.theta.push(theta);
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

/// Which strategy produced an inversion result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversionStrategy {
    LeastSquares,
    Bayesian,
    RestoredChain,
}

/// Point estimate and one-standard-deviation uncertainty of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub value: f64,
    pub uncertainty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionResult {
    /// Ordered like the inversion vector (`sigma` last in Bayesian mode).
    pub estimates: Vec<ParameterEstimate>,
    /// Best-fit forward model on the observation time grid.
    pub trajectory: Trajectory,
    pub strategy: InversionStrategy,
}

impl InversionResult {
    pub fn get(&self, name: &str) -> Option<&ParameterEstimate> {
        self.estimates.iter().find(|e| e.name == name)
    }

    /// `(value, uncertainty)` pair for `name`.
    pub fn pair(&self, name: &str) -> Option<(f64, f64)> {
        self.get(name).map(|e| (e.value, e.uncertainty))
    }
}
