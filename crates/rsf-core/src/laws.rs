// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Friction and State-Evolution Laws
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Rate-and-state friction law and the registry of state-evolution laws.
//!
//! Friction:
//!   mu = mu0 + a ln(V / V0) + b ln(V0 θ / Dc)
//! Aging (Dieterich):
//!   dθ/dt = 1 − V θ / Dc
//! Slip (Ruina):
//!   dθ/dt = −(V θ / Dc) ln(V θ / Dc)

use crate::params::ParameterSet;
use rsf_types::constants::STIFFNESS;
use rsf_types::error::{RsfError, RsfResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateLaw {
    Aging,
    Slip,
}

impl StateLaw {
    pub fn name(&self) -> &'static str {
        match self {
            StateLaw::Aging => "aging",
            StateLaw::Slip => "slip",
        }
    }

    /// dθ/dt at slip rate `v` and state `theta`.
    pub fn evolution(&self, v: f64, theta: f64, inv_dc: f64) -> f64 {
        let omega = v * theta * inv_dc;
        match self {
            StateLaw::Aging => 1.0 - omega,
            StateLaw::Slip => -omega * omega.ln(),
        }
    }
}

impl fmt::Display for StateLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
struct LawEntry {
    law: StateLaw,
    aliases: Vec<String>,
}

/// Canonical state-evolution laws and their accepted spellings.
#[derive(Debug, Clone)]
pub struct LawRegistry {
    entries: Vec<LawEntry>,
}

impl Default for LawRegistry {
    fn default() -> Self {
        let entry = |law, aliases: &[&str]| LawEntry {
            law,
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            entries: vec![
                entry(StateLaw::Aging, &["aging", "ageing", "dieterich"]),
                entry(StateLaw::Slip, &["slip", "ruina"]),
            ],
        }
    }
}

impl LawRegistry {
    /// Resolve a user-supplied law name, case-insensitively.
    pub fn resolve(&self, name: &str) -> RsfResult<StateLaw> {
        let wanted = name.trim().to_lowercase();
        self.entries
            .iter()
            .find(|e| e.aliases.iter().any(|a| *a == wanted))
            .map(|e| e.law)
            .ok_or_else(|| {
                RsfError::ConfigError(format!(
                    "The requested state evolution law ({wanted}) is not available. Available laws: {}",
                    self.describe()
                ))
            })
    }

    /// `aging => [aging, ageing, ...], slip => [...]`
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} => [{}]", e.law, e.aliases.join(", ")))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Numbers the forward model needs, pulled out of a parameter set once per solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsfCoefficients {
    pub a: f64,
    pub b: f64,
    pub mu0: f64,
    pub v0: f64,
    pub inv_v0: f64,
    pub inv_dc: f64,
    /// Spring stiffness; `None` couples the slider rigidly to the load point.
    pub stiffness: Option<f64>,
    pub law: StateLaw,
}

impl RsfCoefficients {
    pub fn from_params(params: &ParameterSet) -> RsfResult<Self> {
        let law = params.state_evolution().ok_or_else(|| {
            RsfError::ConfigError("No state evolution law selected".to_string())
        })?;
        let stiffness = params.get(STIFFNESS);
        if let Some(k) = stiffness {
            if !k.is_finite() || k <= 0.0 {
                return Err(RsfError::ConfigError(format!(
                    "Stiffness '{STIFFNESS}' must be finite and > 0 (got {k})"
                )));
            }
        }
        Ok(Self {
            a: params.value("a")?,
            b: params.value("b")?,
            mu0: params.value("mu0")?,
            v0: params.value("V0")?,
            inv_v0: params.value("inv_V0")?,
            inv_dc: params.value("inv_Dc")?,
            stiffness,
            law,
        })
    }

    pub fn friction(&self, v: f64, theta: f64) -> f64 {
        self.mu0 + self.a * (v * self.inv_v0).ln() + self.b * (self.v0 * theta * self.inv_dc).ln()
    }
}
