// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Forward Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Spring-slider forward model driven through a load point.
//!
//! State vector `y = [V, θ]`. With a stiffness `k` in the parameter set the
//! slider is elastically coupled:
//!   dmu/dt = k (V_lp − V)
//!   dV/dt  = (V / a) (dmu/dt − b θ'/θ)
//! Without `k` the slider follows the load point exactly (`V = V_lp`) and
//! only θ evolves. Integration restarts at every load-point velocity step.

use crate::laws::RsfCoefficients;
use crate::params::ParameterSet;
use rsf_math::ode::{AdaptiveOptions, DormandPrince, OdeSystem};
use rsf_types::config::SolverConfig;
use rsf_types::error::{RsfError, RsfResult};
use rsf_types::state::{LoadingProtocol, SolverMode, Trajectory};

/// Forward solver session: initial values are set, then one integration runs.
pub trait ForwardSolver {
    /// Initial `[V, θ]` for the next `integrate` call.
    fn set_initial_values(&mut self, y0: [f64; 2]);

    /// Solve over `times` (non-decreasing). `Dense` returns one sample per
    /// entry of `times`; `Step` returns the solver's own step grid spanning
    /// `times[0]..=times[last]`.
    fn integrate(
        &mut self,
        params: &ParameterSet,
        times: &[f64],
        mode: SolverMode,
    ) -> RsfResult<Trajectory>;
}

struct Slider {
    coeffs: RsfCoefficients,
    v_lp: f64,
}

impl Slider {
    fn friction(&self, y: &[f64]) -> f64 {
        self.coeffs.friction(y[0], y[1])
    }
}

impl OdeSystem for Slider {
    fn dim(&self) -> usize {
        2
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let (v, theta) = (y[0], y[1]);
        let c = &self.coeffs;
        let dtheta = c.law.evolution(v, theta, c.inv_dc);
        dydt[1] = dtheta;
        dydt[0] = match c.stiffness {
            Some(k) => {
                let dmu = k * (self.v_lp - v);
                v / c.a * (dmu - c.b * dtheta / theta)
            }
            None => 0.0,
        };
    }
}

/// Dormand–Prince integration of the spring-slider system.
#[derive(Debug, Clone)]
pub struct RsfIntegrator {
    pub config: SolverConfig,
    pub loading: LoadingProtocol,
    initial: Option<[f64; 2]>,
}

impl Default for RsfIntegrator {
    fn default() -> Self {
        Self::new(SolverConfig::default(), LoadingProtocol::default())
    }
}

impl RsfIntegrator {
    pub fn new(config: SolverConfig, loading: LoadingProtocol) -> Self {
        Self {
            config,
            loading,
            initial: None,
        }
    }

    fn check_times(times: &[f64]) -> RsfResult<()> {
        if times.is_empty() {
            return Err(RsfError::ConfigError(
                "Forward model needs at least one output time".to_string(),
            ));
        }
        if !times.iter().all(|t| t.is_finite()) || times.windows(2).any(|w| w[1] < w[0]) {
            return Err(RsfError::ConfigError(
                "Forward model output times must be finite and non-decreasing".to_string(),
            ));
        }
        Ok(())
    }

    fn sample(slider: &Slider, traj: &mut Trajectory, t: f64, y: &[f64]) {
        traj.push(t, slider.friction(y), y[0], y[1]);
    }
}

impl ForwardSolver for RsfIntegrator {
    fn set_initial_values(&mut self, y0: [f64; 2]) {
        self.initial = Some(y0);
    }

    fn integrate(
        &mut self,
        params: &ParameterSet,
        times: &[f64],
        mode: SolverMode,
    ) -> RsfResult<Trajectory> {
        self.config.validate()?;
        self.loading.validate()?;
        Self::check_times(times)?;
        let y0 = self.initial.take().ok_or_else(|| {
            RsfError::ConfigError("Initial values must be set before integrating".to_string())
        })?;
        let coeffs = RsfCoefficients::from_params(params)?;
        if !(y0[0] > 0.0 && y0[1] > 0.0) {
            return Err(RsfError::SolverError {
                time: times[0],
                message: format!("initial state must be positive (V={}, θ={})", y0[0], y0[1]),
            });
        }

        let t_start = times[0];
        let t_final = times[times.len() - 1];
        let span = (t_final - t_start).max(f64::MIN_POSITIVE);
        let options = AdaptiveOptions {
            rtol: self.config.rtol,
            atol: self.config.atol,
            max_steps: self.config.max_steps,
        };
        let mut stepper = DormandPrince::new(options, self.config.initial_step * span);

        let mut slider = Slider {
            coeffs,
            v_lp: self.loading.velocity_at(t_start, coeffs.v0),
        };
        let mut y = y0.to_vec();
        if coeffs.stiffness.is_none() {
            y[0] = slider.v_lp;
        }

        let breakpoints = self.loading.breakpoints(t_start, t_final);
        let mut next_bp = breakpoints.iter().copied().peekable();
        let mut traj = match mode {
            SolverMode::Dense => Trajectory::with_capacity(times.len()),
            SolverMode::Step => Trajectory::with_capacity(times.len().max(64)),
        };
        Self::sample(&slider, &mut traj, t_start, &y);

        let targets: Vec<f64> = match mode {
            SolverMode::Dense => times[1..].to_vec(),
            SolverMode::Step => vec![t_final],
        };

        let mut t_cur = t_start;
        for &target in &targets {
            while let Some(bp) = next_bp.next_if(|&bp| bp <= target) {
                match mode {
                    SolverMode::Dense => stepper.advance(&slider, t_cur, &mut y, bp, |_, _| {})?,
                    SolverMode::Step => stepper.advance(&slider, t_cur, &mut y, bp, |t, ys| {
                        Self::sample(&slider, &mut traj, t, ys)
                    })?,
                }
                t_cur = bp;
                slider.v_lp = self.loading.velocity_at(bp, coeffs.v0);
                if coeffs.stiffness.is_none() {
                    y[0] = slider.v_lp;
                    if mode == SolverMode::Step {
                        Self::sample(&slider, &mut traj, bp, &y);
                    }
                }
            }
            match mode {
                SolverMode::Dense => {
                    stepper.advance(&slider, t_cur, &mut y, target, |_, _| {})?;
                    Self::sample(&slider, &mut traj, target, &y);
                }
                SolverMode::Step => stepper.advance(&slider, t_cur, &mut y, target, |t, ys| {
                    Self::sample(&slider, &mut traj, t, ys)
                })?,
            }
            t_cur = target;
        }

        if traj.mu.iter().any(|m| !m.is_finite()) {
            let idx = traj.mu.iter().position(|m| !m.is_finite()).unwrap_or(0);
            return Err(RsfError::SolverError {
                time: traj.t[idx],
                message: "friction became non-finite".to_string(),
            });
        }
        Ok(traj)
    }
}
