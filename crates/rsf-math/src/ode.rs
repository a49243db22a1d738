// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Adaptive ODE Integration
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Explicit Runge–Kutta integration for small first-order systems.
//!
//! `DormandPrince` is an embedded 5(4) pair with step-size control; the
//! integrator keeps its last step size between calls so that a sequence of
//! `advance` calls over consecutive output intervals does not restart the
//! step-size search each time.

use rsf_types::error::{RsfError, RsfResult};

/// First-order system `dy/dt = f(t, y)`.
pub trait OdeSystem {
    fn dim(&self) -> usize;
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

/// Step-size control settings.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveOptions {
    pub rtol: f64,
    pub atol: f64,
    /// Accepted plus rejected steps allowed per `advance` call.
    pub max_steps: usize,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-12,
            max_steps: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub accepted: usize,
    pub rejected: usize,
}

const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Fifth- minus fourth-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

/// Dormand–Prince 5(4) integrator with persistent step size.
#[derive(Debug, Clone)]
pub struct DormandPrince {
    pub options: AdaptiveOptions,
    h: f64,
    stats: StepStats,
}

impl DormandPrince {
    /// `h_init` is the first trial step; later calls reuse the last accepted size.
    pub fn new(options: AdaptiveOptions, h_init: f64) -> Self {
        Self {
            options,
            h: h_init.abs(),
            stats: StepStats::default(),
        }
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    /// Integrate `y` in place from `t` to `t_end` (`t_end >= t`).
    ///
    /// `on_step` sees the state after every accepted step, including the final
    /// one landing exactly on `t_end`.
    pub fn advance<S, F>(
        &mut self,
        system: &S,
        t: f64,
        y: &mut [f64],
        t_end: f64,
        mut on_step: F,
    ) -> RsfResult<()>
    where
        S: OdeSystem + ?Sized,
        F: FnMut(f64, &[f64]),
    {
        let n = system.dim();
        if y.len() != n {
            return Err(RsfError::SolverError {
                time: t,
                message: format!("state has {} components, system expects {n}", y.len()),
            });
        }
        if !(t_end >= t) {
            return Err(RsfError::SolverError {
                time: t,
                message: format!("cannot integrate backwards to t={t_end:e}"),
            });
        }
        if t_end == t {
            return Ok(());
        }

        let span = t_end - t;
        if !(self.h > 0.0) || !self.h.is_finite() {
            self.h = span * 1e-6;
        }

        let mut k = [
            vec![0.0; n],
            vec![0.0; n],
            vec![0.0; n],
            vec![0.0; n],
            vec![0.0; n],
            vec![0.0; n],
            vec![0.0; n],
        ];
        let mut y_stage = vec![0.0; n];
        let mut y_new = vec![0.0; n];

        let mut t_cur = t;
        let mut steps = 0usize;
        system.rhs(t_cur, y, &mut k[0]);

        while t_cur < t_end {
            steps += 1;
            if steps > self.options.max_steps {
                return Err(RsfError::SolverError {
                    time: t_cur,
                    message: format!(
                        "exceeded {} steps before reaching t={t_end:e}",
                        self.options.max_steps
                    ),
                });
            }

            let remaining = t_end - t_cur;
            let last = self.h >= remaining;
            let h = if last { remaining } else { self.h };
            let h_min = 16.0 * f64::EPSILON * t_cur.abs().max(span);
            if h < h_min && !last {
                return Err(RsfError::SolverError {
                    time: t_cur,
                    message: format!("step size underflow (h={h:e})"),
                });
            }

            for i in 0..n {
                y_stage[i] = y[i] + h * A21 * k[0][i];
            }
            system.rhs(t_cur + C2 * h, &y_stage, &mut k[1]);
            for i in 0..n {
                y_stage[i] = y[i] + h * (A31 * k[0][i] + A32 * k[1][i]);
            }
            system.rhs(t_cur + C3 * h, &y_stage, &mut k[2]);
            for i in 0..n {
                y_stage[i] = y[i] + h * (A41 * k[0][i] + A42 * k[1][i] + A43 * k[2][i]);
            }
            system.rhs(t_cur + C4 * h, &y_stage, &mut k[3]);
            for i in 0..n {
                y_stage[i] = y[i]
                    + h * (A51 * k[0][i] + A52 * k[1][i] + A53 * k[2][i] + A54 * k[3][i]);
            }
            system.rhs(t_cur + C5 * h, &y_stage, &mut k[4]);
            for i in 0..n {
                y_stage[i] = y[i]
                    + h * (A61 * k[0][i]
                        + A62 * k[1][i]
                        + A63 * k[2][i]
                        + A64 * k[3][i]
                        + A65 * k[4][i]);
            }
            system.rhs(t_cur + h, &y_stage, &mut k[5]);
            for i in 0..n {
                y_new[i] = y[i]
                    + h * (B1 * k[0][i] + B3 * k[2][i] + B4 * k[3][i] + B5 * k[4][i] + B6 * k[5][i]);
            }
            system.rhs(t_cur + h, &y_new, &mut k[6]);

            let mut err_sq = 0.0;
            for i in 0..n {
                let e = h
                    * (E1 * k[0][i]
                        + E3 * k[2][i]
                        + E4 * k[3][i]
                        + E5 * k[4][i]
                        + E6 * k[5][i]
                        + E7 * k[6][i]);
                let sc = self.options.atol + self.options.rtol * y[i].abs().max(y_new[i].abs());
                let ratio = if sc > 0.0 { e / sc } else { e };
                err_sq += ratio * ratio;
            }
            let err = (err_sq / n as f64).sqrt();

            if !err.is_finite() {
                // Non-finite trial: shrink hard and retry.
                self.stats.rejected += 1;
                self.h = h * MIN_FACTOR;
                continue;
            }

            let factor = if err == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
            };

            if err <= 1.0 {
                t_cur = if last { t_end } else { t_cur + h };
                y.copy_from_slice(&y_new);
                if y.iter().any(|v| !v.is_finite()) {
                    return Err(RsfError::SolverError {
                        time: t_cur,
                        message: "state became non-finite".to_string(),
                    });
                }
                // FSAL: last stage is the first stage of the next step.
                let (first, rest) = k.split_at_mut(1);
                first[0].copy_from_slice(&rest[5]);
                self.stats.accepted += 1;
                on_step(t_cur, y);
                if !last {
                    self.h = h * factor;
                }
            } else {
                self.stats.rejected += 1;
                self.h = h * factor.min(1.0);
            }
        }
        Ok(())
    }
}
