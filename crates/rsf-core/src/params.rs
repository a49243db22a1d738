// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Parameter Store
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Validated rate-and-state parameter set.
//!
//! The set always carries the six required keys plus the derived reciprocals
//! `inv_Dc` and `inv_V0`; every update recomputes both.

use crate::laws::StateLaw;
use rsf_types::constants::{INV_DC, INV_V0, REQUIRED_PARAMS};
use rsf_types::error::{RsfError, RsfResult};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    values: BTreeMap<String, f64>,
    state_evolution: Option<StateLaw>,
}

/// Required keys absent from `values`, in declaration order.
pub fn missing_required(values: &BTreeMap<String, f64>) -> Vec<&'static str> {
    REQUIRED_PARAMS
        .iter()
        .copied()
        .filter(|key| !values.contains_key(*key))
        .collect()
}

fn is_derived(key: &str) -> bool {
    key == INV_DC || key == INV_V0
}

fn check_values(values: &BTreeMap<String, f64>) -> RsfResult<()> {
    let missing = missing_required(values);
    if !missing.is_empty() {
        return Err(RsfError::ConfigError(format!(
            "Parameters missing: {}",
            missing.join(", ")
        )));
    }
    if let Some((key, value)) = values
        .iter()
        .find(|(k, v)| !is_derived(k) && !v.is_finite())
    {
        return Err(RsfError::ConfigError(format!(
            "Parameter '{key}' must be finite (got {value})"
        )));
    }
    for key in ["Dc", "V0"] {
        // Zero and subnormal divisors both give an infinite reciprocal.
        if !(1.0 / values[key]).is_finite() {
            return Err(RsfError::ConfigError(format!(
                "Parameter '{key}' must be non-zero with a finite reciprocal (got {:e})",
                values[key]
            )));
        }
    }
    Ok(())
}

impl ParameterSet {
    /// Validate and store a parameter mapping, computing the derived keys.
    ///
    /// All missing required keys are reported together.
    pub fn new(mut values: BTreeMap<String, f64>) -> RsfResult<Self> {
        values.retain(|k, _| !is_derived(k));
        check_values(&values)?;
        let mut set = Self {
            values,
            state_evolution: None,
        };
        set.refresh_derived();
        Ok(set)
    }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> RsfResult<Self> {
        Self::new(
            pairs
                .iter()
                .map(|&(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn refresh_derived(&mut self) {
        let inv_dc = 1.0 / self.values["Dc"];
        let inv_v0 = 1.0 / self.values["V0"];
        self.values.insert(INV_DC.to_string(), inv_dc);
        self.values.insert(INV_V0.to_string(), inv_v0);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Value of `key`, or a configuration error naming it.
    pub fn value(&self, key: &str) -> RsfResult<f64> {
        self.get(key)
            .ok_or_else(|| RsfError::ConfigError(format!("Parameter '{key}' is not set")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Merge `updates` into the set as one transaction.
    ///
    /// Either every update lands and the derived keys are recomputed, or the
    /// set is left untouched and an error is returned.
    pub fn update<'a, I>(&mut self, updates: I) -> RsfResult<()>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut candidate = self.values.clone();
        for (key, value) in updates {
            if is_derived(key) {
                return Err(RsfError::ConfigError(format!(
                    "'{key}' is derived and cannot be set directly"
                )));
            }
            candidate.insert(key.to_string(), value);
        }
        check_values(&candidate)?;
        self.values = candidate;
        self.refresh_derived();
        Ok(())
    }

    pub fn insert(&mut self, key: &str, value: f64) -> RsfResult<()> {
        self.update([(key, value)])
    }

    pub fn state_evolution(&self) -> Option<StateLaw> {
        self.state_evolution
    }

    pub fn set_state_evolution(&mut self, law: StateLaw) {
        self.state_evolution = Some(law);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.values.clone()
    }
}
