// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Residual Evaluator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Flat parameter vector in, modelled friction out.
//!
//! Each evaluator owns its parameter set and solver session, so clones can be
//! evaluated concurrently against the same borrowed dataset.

use crate::codec::unpack;
use crate::forward::ForwardSolver;
use crate::params::ParameterSet;
use ndarray::Array1;
use rsf_math::interp::interp1d_many;
use rsf_types::error::{RsfError, RsfResult};
use rsf_types::state::{ObservationDataset, SolverMode, Trajectory};

#[derive(Debug, Clone)]
pub struct ResidualEvaluator<'a, F> {
    params: ParameterSet,
    solver: F,
    spec: Vec<String>,
    dataset: &'a ObservationDataset,
    mode: SolverMode,
}

impl<'a, F: ForwardSolver> ResidualEvaluator<'a, F> {
    pub fn new(
        params: ParameterSet,
        solver: F,
        spec: Vec<String>,
        dataset: &'a ObservationDataset,
        mode: SolverMode,
    ) -> Self {
        Self {
            params,
            solver,
            spec,
            dataset,
            mode,
        }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn into_params(self) -> ParameterSet {
        self.params
    }

    pub fn spec(&self) -> &[String] {
        &self.spec
    }

    pub fn dataset(&self) -> &'a ObservationDataset {
        self.dataset
    }

    pub fn mode(&self) -> SolverMode {
        self.mode
    }

    fn solve(&mut self, x: &[f64], times: &[f64], mode: SolverMode) -> RsfResult<Trajectory> {
        unpack(&mut self.params, x, &self.spec)?;
        let v0 = self.params.value("V0")?;
        let dc = self.params.value("Dc")?;
        self.solver.set_initial_values([v0, dc / v0]);
        self.solver.integrate(&self.params, times, mode)
    }

    /// Modelled friction at `query_times` in the session mode.
    ///
    /// Step-mode output is linearly interpolated onto the query grid and held
    /// constant outside the solved range.
    pub fn residual(&mut self, x: &[f64], query_times: &[f64]) -> RsfResult<Vec<f64>> {
        let mode = self.mode;
        let traj = self.solve(x, query_times, mode)?;
        match mode {
            SolverMode::Dense => {
                if traj.len() != query_times.len() {
                    return Err(RsfError::SolverError {
                        time: traj.t.last().copied().unwrap_or(f64::NAN),
                        message: format!(
                            "dense output has {} samples for {} query times",
                            traj.len(),
                            query_times.len()
                        ),
                    });
                }
                Ok(traj.mu)
            }
            SolverMode::Step => Ok(interp1d_many(query_times, &traj.t, &traj.mu)),
        }
    }

    /// `observed − modelled` on the dataset's own time grid.
    ///
    /// Always solved in dense mode, whatever the session mode.
    pub fn misfit(&mut self, x: &[f64]) -> RsfResult<Array1<f64>> {
        let dataset = self.dataset;
        let traj = self.solve(x, &dataset.t, SolverMode::Dense)?;
        if traj.len() != dataset.len() {
            return Err(RsfError::SolverError {
                time: traj.t.last().copied().unwrap_or(f64::NAN),
                message: format!(
                    "model returned {} samples for {} observations",
                    traj.len(),
                    dataset.len()
                ),
            });
        }
        Ok(dataset
            .mu
            .iter()
            .zip(traj.mu.iter())
            .map(|(obs, model)| obs - model)
            .collect())
    }

    /// Dense forward trajectory on the dataset grid for vector `x`.
    pub fn trajectory(&mut self, x: &[f64]) -> RsfResult<Trajectory> {
        let dataset = self.dataset;
        self.solve(x, &dataset.t, SolverMode::Dense)
    }
}
