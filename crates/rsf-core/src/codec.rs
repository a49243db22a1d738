//! Flat-vector view of the parameters under inversion.

use crate::params::ParameterSet;
use ndarray::Array1;
use rsf_types::constants::{INV_DC, INV_V0};
use rsf_types::error::{RsfError, RsfResult};

/// Read the parameters named by `spec`, in order.
pub fn pack(params: &ParameterSet, spec: &[String]) -> RsfResult<Array1<f64>> {
    spec.iter()
        .map(|key| params.value(key))
        .collect::<RsfResult<Vec<f64>>>()
        .map(Array1::from)
}

/// Write `x` back into `params` by position; keys outside `spec` are kept.
pub fn unpack(params: &mut ParameterSet, x: &[f64], spec: &[String]) -> RsfResult<()> {
    if x.len() != spec.len() {
        return Err(RsfError::ConfigError(format!(
            "Vector length {} does not match inversion spec length {} ({})",
            x.len(),
            spec.len(),
            spec.join(", ")
        )));
    }
    params.update(spec.iter().map(String::as_str).zip(x.iter().copied()))
}

/// Ordered, duplicate-free spec, checked against the parameter set.
pub fn validate_spec(params: &ParameterSet, spec: &[String]) -> RsfResult<()> {
    if spec.is_empty() {
        return Err(RsfError::ConfigError(
            "Inversion spec must name at least one parameter".to_string(),
        ));
    }
    for (i, key) in spec.iter().enumerate() {
        if spec[..i].contains(key) {
            return Err(RsfError::ConfigError(format!(
                "Inversion spec lists '{key}' more than once"
            )));
        }
        if key == INV_DC || key == INV_V0 {
            return Err(RsfError::ConfigError(format!(
                "'{key}' is derived from its reciprocal and cannot be inverted"
            )));
        }
        if !params.contains(key) {
            return Err(RsfError::ConfigError(format!(
                "Inversion parameter '{key}' is not in the parameter set"
            )));
        }
    }
    Ok(())
}
