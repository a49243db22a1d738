// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Inversion Orchestrator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Public entry point tying the parameter store, law registry, forward
//! solver and both inversion strategies together.

use crate::bayes::{log_posterior, EnsembleSampler, SampleChain};
use crate::codec::{pack, validate_spec};
use crate::forward::{ForwardSolver, RsfIntegrator};
use crate::laws::{LawRegistry, StateLaw};
use crate::lsq::{levenberg_marquardt, LeastSquaresFit};
use crate::params::ParameterSet;
use crate::residual::ResidualEvaluator;
use crate::uncertainty::{estimates, from_covariance};
use ndarray::{s, Array1};
use rsf_types::config::{InversionConfig, LeastSquaresConfig, SamplerConfig};
use rsf_types::constants::{DEFAULT_SIGMA, SIGMA};
use rsf_types::error::{RsfError, RsfResult};
use rsf_types::state::{
    InversionResult, InversionStrategy, ObservationDataset, SolverMode, Trajectory,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Inversion session: current parameter set, selected law, forward solver
/// and strategy settings.
#[derive(Debug, Clone)]
pub struct RsfInversion<F = RsfIntegrator> {
    params: Option<ParameterSet>,
    law: Option<StateLaw>,
    registry: LawRegistry,
    solver: F,
    pub least_squares: LeastSquaresConfig,
    pub sampler: SamplerConfig,
    /// Where a freshly sampled chain is written, if anywhere.
    pub chain_output: Option<PathBuf>,
}

impl RsfInversion<RsfIntegrator> {
    /// Session with the built-in integrator configured from `config`.
    ///
    /// Parameters and law are not applied here; `run` does that.
    pub fn from_config(config: &InversionConfig) -> RsfResult<Self> {
        config.solver.validate()?;
        let loading = config.loading.clone().unwrap_or_default();
        loading.validate()?;
        let mut inversion = Self::new(RsfIntegrator::new(config.solver.clone(), loading));
        inversion.least_squares = config.least_squares.clone();
        inversion.sampler = config.sampler.clone();
        inversion.chain_output = config.chain_output.clone();
        Ok(inversion)
    }
}

impl<F> RsfInversion<F>
where
    F: ForwardSolver + Clone + Send + Sync,
{
    pub fn new(solver: F) -> Self {
        Self {
            params: None,
            law: None,
            registry: LawRegistry::default(),
            solver,
            least_squares: LeastSquaresConfig::default(),
            sampler: SamplerConfig::default(),
            chain_output: None,
        }
    }

    pub fn params(&self) -> Option<&ParameterSet> {
        self.params.as_ref()
    }

    pub fn solver(&self) -> &F {
        &self.solver
    }

    /// Validate and install a parameter mapping; a previously selected law
    /// carries over.
    pub fn set_params(&mut self, values: BTreeMap<String, f64>) -> RsfResult<()> {
        let mut params = ParameterSet::new(values)?;
        if let Some(law) = self.law {
            params.set_state_evolution(law);
        }
        self.params = Some(params);
        Ok(())
    }

    /// Resolve `name` through the law registry and make it the active law.
    pub fn set_state_evolution(&mut self, name: &str) -> RsfResult<StateLaw> {
        let law = self.registry.resolve(name)?;
        self.law = Some(law);
        if let Some(params) = self.params.as_mut() {
            params.set_state_evolution(law);
        }
        Ok(law)
    }

    fn ready_params(&self) -> RsfResult<&ParameterSet> {
        let params = self.params.as_ref().ok_or_else(|| {
            RsfError::ConfigError("Parameters have not been set".to_string())
        })?;
        if params.state_evolution().is_none() {
            return Err(RsfError::ConfigError(format!(
                "No state evolution law selected. Available laws: {}",
                self.registry.describe()
            )));
        }
        Ok(params)
    }

    /// Forward model for the current parameter set, started from `(V0, Dc/V0)`.
    pub fn forward(&mut self, times: &[f64], mode: SolverMode) -> RsfResult<Trajectory> {
        let params = self.ready_params()?.clone();
        let v0 = params.value("V0")?;
        let dc = params.value("Dc")?;
        self.solver.set_initial_values([v0, dc / v0]);
        self.solver.integrate(&params, times, mode)
    }

    fn run_least_squares(
        &self,
        evaluator: &mut ResidualEvaluator<'_, F>,
    ) -> RsfResult<LeastSquaresFit> {
        let x0 = pack(evaluator.params(), evaluator.spec())?;
        levenberg_marquardt(|x| evaluator.misfit(&x.to_vec()), &x0, &self.least_squares)
    }

    /// Invert `dataset` for the parameters named in `spec`.
    ///
    /// `mode` is `"dense"` or `"step"`. With `bayesian` set, `sigma` is
    /// appended to the inverted vector and the posterior is sampled, or read
    /// from `chain_source` when one is given.
    pub fn invert(
        &mut self,
        dataset: &ObservationDataset,
        spec: &[String],
        mode: &str,
        bayesian: bool,
        chain_source: Option<&Path>,
    ) -> RsfResult<InversionResult> {
        let mode: SolverMode = mode.parse()?;
        let params = self.ready_params()?.clone();
        validate_spec(&params, spec)?;
        if bayesian && spec.iter().any(|k| k == SIGMA) {
            return Err(RsfError::ConfigError(format!(
                "'{SIGMA}' is appended automatically in Bayesian mode"
            )));
        }

        info!(
            observations = dataset.len(),
            parameters = %spec.join(","),
            %mode,
            bayesian,
            "starting inversion"
        );

        let spec = spec.to_vec();
        let mut evaluator =
            ResidualEvaluator::new(params, self.solver.clone(), spec.clone(), dataset, mode);

        let (names, values, uncertainties, strategy) = if bayesian {
            let mut names = spec.clone();
            names.push(SIGMA.to_string());
            let (chain, strategy) = match chain_source {
                Some(path) => {
                    info!(source = %path.display(), "restoring posterior chain");
                    let chain = SampleChain::restore(path)?;
                    chain.check_names(&names)?;
                    (chain, InversionStrategy::RestoredChain)
                }
                None => {
                    let fit = self.run_least_squares(&mut evaluator)?;
                    let mut seed = fit.x.to_vec();
                    seed.push(DEFAULT_SIGMA);
                    let seed = Array1::from(seed);
                    info!(
                        iterations = fit.iterations,
                        cost = fit.cost,
                        walkers = self.sampler.n_walkers,
                        steps = self.sampler.n_steps,
                        "least-squares seed ready, sampling posterior"
                    );
                    let template = evaluator.clone();
                    let chain = EnsembleSampler::new(self.sampler.clone()).run(
                        &names,
                        &seed,
                        |x| {
                            let mut local = template.clone();
                            log_posterior(&mut local, &names, x)
                        },
                    )?;
                    info!(acceptance = chain.acceptance_fraction, "sampling finished");
                    if let Some(out) = &self.chain_output {
                        chain.save(out)?;
                        info!(path = %out.display(), "posterior chain saved");
                    }
                    (chain, InversionStrategy::Bayesian)
                }
            };
            let (mean, std) = chain.summary()?;
            (names, mean, std, strategy)
        } else {
            let fit = self.run_least_squares(&mut evaluator)?;
            let std = from_covariance(&fit.covariance)?;
            info!(iterations = fit.iterations, cost = fit.cost, "least-squares fit converged");
            (spec.clone(), fit.x, std, InversionStrategy::LeastSquares)
        };

        let physical = values.slice(s![..spec.len()]).to_vec();
        let trajectory = evaluator.trajectory(&physical)?;
        let mut best = evaluator.into_params();
        if bayesian {
            best.insert(SIGMA, values[spec.len()])?;
        }
        self.params = Some(best);

        let result = InversionResult {
            estimates: estimates(&names, &values, &uncertainties),
            trajectory,
            strategy,
        };
        for e in &result.estimates {
            info!(name = %e.name, value = e.value, uncertainty = e.uncertainty, "estimate");
        }
        Ok(result)
    }

    /// Apply a full session configuration and invert `dataset`.
    pub fn run(
        &mut self,
        config: &InversionConfig,
        dataset: &ObservationDataset,
    ) -> RsfResult<InversionResult> {
        config.mode.parse::<SolverMode>()?;
        self.set_params(config.parameters.clone())?;
        self.set_state_evolution(&config.state_evolution)?;
        self.invert(
            dataset,
            &config.inversion_params,
            &config.mode,
            config.bayesian,
            config.chain_source.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use rsf_types::config::SolverConfig;
    use rsf_types::state::LoadingProtocol;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct CountingSolver {
        inner: RsfIntegrator,
        calls: Arc<AtomicUsize>,
    }

    impl CountingSolver {
        fn new() -> Self {
            Self {
                inner: step_solver(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ForwardSolver for CountingSolver {
        fn set_initial_values(&mut self, y0: [f64; 2]) {
            self.inner.set_initial_values(y0);
        }

        fn integrate(
            &mut self,
            params: &ParameterSet,
            times: &[f64],
            mode: SolverMode,
        ) -> RsfResult<Trajectory> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.integrate(params, times, mode)
        }
    }

    fn step_solver() -> RsfIntegrator {
        RsfIntegrator::new(
            SolverConfig::default(),
            LoadingProtocol::new(&[(0.0, 1e-5)]).unwrap(),
        )
    }

    fn true_params() -> BTreeMap<String, f64> {
        [
            ("a", 0.01),
            ("b", 0.015),
            ("Dc", 10.0),
            ("mu0", 0.6),
            ("V0", 1e-6),
            ("V1", 1e-6),
        ]
        .iter()
        .map(|&(k, v)| (k.to_string(), v))
        .collect()
    }

    fn spec(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|s| s.to_string()).collect()
    }

    fn synthetic(noise: f64, seed: u64) -> ObservationDataset {
        let mut inv = RsfInversion::new(step_solver());
        inv.set_params(true_params()).unwrap();
        inv.set_state_evolution("aging").unwrap();
        let t: Vec<f64> = (0..101).map(|i| 5e4 * i as f64).collect();
        let traj = inv.forward(&t, SolverMode::Dense).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mu = traj
            .mu
            .iter()
            .map(|m| m + noise * normal.sample(&mut rng))
            .collect();
        ObservationDataset::new(t, mu).unwrap()
    }

    fn session_with_guess(guess: &[(&str, f64)]) -> RsfInversion {
        let mut inv = RsfInversion::new(step_solver());
        let mut values = true_params();
        for &(k, v) in guess {
            values.insert(k.to_string(), v);
        }
        inv.set_params(values).unwrap();
        inv.set_state_evolution("Aging").unwrap();
        inv
    }

    #[test]
    fn test_recovers_a_b_with_negligible_noise() {
        let data = synthetic(1e-9, 1);
        let mut inv = session_with_guess(&[("a", 0.005), ("b", 0.02)]);
        let result = inv
            .invert(&data, &spec(&["a", "b"]), "dense", false, None)
            .unwrap();
        assert_eq!(result.strategy, InversionStrategy::LeastSquares);
        let (a, sa) = result.pair("a").unwrap();
        let (b, sb) = result.pair("b").unwrap();
        assert!((a - 0.01).abs() / 0.01 < 0.01, "a={a}");
        assert!((b - 0.015).abs() / 0.015 < 0.01, "b={b}");
        assert!(sa < 1e-6 && sb < 1e-6, "sa={sa} sb={sb}");
        assert_eq!(result.trajectory.len(), data.len());
        // The store now holds the best fit.
        let stored = inv.params().unwrap();
        assert!((stored.get("a").unwrap() - a).abs() < 1e-15);
    }

    #[test]
    fn test_recovers_dc_with_rate_and_state_terms() {
        let data = synthetic(1e-6, 2);
        let mut inv = session_with_guess(&[("a", 0.008), ("b", 0.018), ("Dc", 12.0)]);
        let result = inv
            .invert(&data, &spec(&["a", "b", "Dc"]), "dense", false, None)
            .unwrap();
        let (dc, sdc) = result.pair("Dc").unwrap();
        assert!((dc - 10.0).abs() / 10.0 < 0.02, "Dc={dc}");
        assert!(sdc > 0.0 && sdc < 0.5, "sigma_Dc={sdc}");
        assert_eq!(inv.params().unwrap().get("inv_Dc"), Some(1.0 / dc));
    }

    #[test]
    fn test_uncertainty_shrinks_with_noise() {
        let loud = {
            let mut inv = session_with_guess(&[("a", 0.005), ("b", 0.02)]);
            inv.invert(&synthetic(1e-3, 5), &spec(&["a", "b"]), "dense", false, None)
                .unwrap()
        };
        let quiet = {
            let mut inv = session_with_guess(&[("a", 0.005), ("b", 0.02)]);
            inv.invert(&synthetic(1e-5, 5), &spec(&["a", "b"]), "dense", false, None)
                .unwrap()
        };
        for name in ["a", "b"] {
            let (_, s_loud) = loud.pair(name).unwrap();
            let (_, s_quiet) = quiet.pair(name).unwrap();
            assert!(s_quiet < s_loud, "{name}: {s_quiet} !< {s_loud}");
        }
    }

    #[test]
    fn test_missing_dc_fails_before_forward_model() {
        let solver = CountingSolver::new();
        let mut inv = RsfInversion::new(solver.clone());
        let mut values = true_params();
        values.remove("Dc");
        let mut config = InversionConfig::with_parameters(values);
        config.inversion_params = spec(&["a", "b"]);
        let data = ObservationDataset::new(vec![0.0, 1.0, 2.0], vec![0.6; 3]).unwrap();
        match inv.run(&config, &data).unwrap_err() {
            RsfError::ConfigError(msg) => assert!(msg.contains("Dc"), "{msg}"),
            other => panic!("Unexpected error: {other:?}"),
        }
        assert_eq!(solver.calls(), 0);
    }

    #[test]
    fn test_invalid_mode_rejected_first() {
        let solver = CountingSolver::new();
        let mut inv = RsfInversion::new(solver.clone());
        // No parameters set either: the mode check must come first.
        let data = ObservationDataset::new(vec![0.0, 1.0], vec![0.6, 0.6]).unwrap();
        match inv
            .invert(&data, &spec(&["a"]), "weekly", false, None)
            .unwrap_err()
        {
            RsfError::ConfigError(msg) => assert!(msg.contains("weekly"), "{msg}"),
            other => panic!("Unexpected error: {other:?}"),
        }
        assert_eq!(solver.calls(), 0);
    }

    #[test]
    fn test_unknown_law_and_missing_law() {
        let mut inv = RsfInversion::new(step_solver());
        assert!(inv.set_state_evolution("weakening").unwrap_err().is_config());
        inv.set_params(true_params()).unwrap();
        let data = synthetic(0.0, 1);
        let err = inv
            .invert(&data, &spec(&["a"]), "dense", false, None)
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(inv.set_state_evolution("RUINA").unwrap(), StateLaw::Slip);
        assert_eq!(inv.params().unwrap().state_evolution(), Some(StateLaw::Slip));
    }

    #[test]
    fn test_bad_spec_rejected() {
        let mut inv = session_with_guess(&[]);
        let data = synthetic(0.0, 1);
        for bad in [spec(&[]), spec(&["a", "a"]), spec(&["k"])] {
            assert!(inv.invert(&data, &bad, "dense", false, None).unwrap_err().is_config());
        }
        assert!(inv
            .invert(&data, &spec(&["a", "sigma"]), "dense", true, None)
            .unwrap_err()
            .is_config());
    }

    #[test]
    fn test_step_mode_inversion() {
        let data = synthetic(1e-9, 3);
        let mut inv = session_with_guess(&[("a", 0.005), ("b", 0.02)]);
        let result = inv
            .invert(&data, &spec(&["a", "b"]), "step", false, None)
            .unwrap();
        let (a, _) = result.pair("a").unwrap();
        assert!((a - 0.01).abs() / 0.01 < 0.01, "a={a}");
        assert_eq!(result.trajectory.t, data.t);
    }

    #[test]
    fn test_bayesian_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let chain_path = dir.path().join("chain.json");
        let data = synthetic(1e-3, 9);

        let mut inv = session_with_guess(&[("a", 0.009), ("b", 0.016)]);
        inv.sampler = SamplerConfig {
            n_walkers: 8,
            n_steps: 400,
            n_burn: 300,
            seed: Some(42),
            ..Default::default()
        };
        inv.chain_output = Some(chain_path.clone());
        let result = inv
            .invert(&data, &spec(&["a", "b"]), "dense", true, None)
            .unwrap();
        assert_eq!(result.strategy, InversionStrategy::Bayesian);
        let names: Vec<&str> = result.estimates.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "sigma"]);
        let (a, sa) = result.pair("a").unwrap();
        assert!((a - 0.01).abs() / 0.01 < 0.1, "a={a}");
        assert!(sa.is_finite() && sa > 0.0);
        let (sigma, _) = result.pair("sigma").unwrap();
        assert!(sigma > 0.0 && sigma < 0.1, "sigma={sigma}");
        assert_eq!(inv.params().unwrap().get("sigma"), Some(sigma));

        let counting = CountingSolver::new();
        let mut restored = RsfInversion::new(counting.clone());
        restored.set_params(true_params()).unwrap();
        restored.set_state_evolution("aging").unwrap();
        let again = restored
            .invert(&data, &spec(&["a", "b"]), "dense", true, Some(&chain_path))
            .unwrap();
        assert_eq!(again.strategy, InversionStrategy::RestoredChain);
        assert_eq!(again.estimates, result.estimates);
        // Only the reporting trajectory touches the forward model.
        assert_eq!(counting.calls(), 1);

        let err = restored
            .invert(&data, &spec(&["a"]), "dense", true, Some(&chain_path))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_run_from_config() {
        let data = synthetic(1e-9, 4);
        let mut values = true_params();
        values.insert("a".to_string(), 0.006);
        let mut config = InversionConfig::with_parameters(values);
        config.inversion_params = spec(&["a", "b"]);
        config.state_evolution = "ageing".to_string();
        config.loading = Some(LoadingProtocol::new(&[(0.0, 1e-5)]).unwrap());
        let mut inv = RsfInversion::from_config(&config).unwrap();
        let result = inv.run(&config, &data).unwrap();
        let (a, _) = result.pair("a").unwrap();
        assert!((a - 0.01).abs() / 0.01 < 0.01, "a={a}");
    }

    #[test]
    fn test_spring_slider_forward_through_session() {
        let mut inv = session_with_guess(&[]);
        let mut values = true_params();
        values.insert("k".to_string(), 1e-2);
        inv.set_params(values).unwrap();
        let t: Vec<f64> = (0..11).map(|i| 1e5 * i as f64).collect();
        let traj = inv.forward(&t, SolverMode::Dense).unwrap();
        assert_eq!(traj.len(), 11);
        // Elastic coupling: velocity starts at V0 and accelerates toward V_lp.
        assert_eq!(traj.v[0], 1e-6);
        assert!(traj.v[10] > traj.v[0]);
    }
}
