// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Property-Based Tests (proptest) for rsf-core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for rsf-core using proptest.
//!
//! Covers: derived reciprocals after every update, pack/unpack round trip,
//! law lookup case folding, dense residual length.

use proptest::prelude::*;
use rsf_core::codec::{pack, unpack};
use rsf_core::forward::RsfIntegrator;
use rsf_core::laws::{LawRegistry, StateLaw};
use rsf_core::params::ParameterSet;
use rsf_core::residual::ResidualEvaluator;
use rsf_types::state::{ObservationDataset, SolverMode};

fn base() -> ParameterSet {
    ParameterSet::from_pairs(&[
        ("a", 0.01),
        ("b", 0.015),
        ("Dc", 10.0),
        ("mu0", 0.6),
        ("V0", 1e-6),
        ("V1", 1e-6),
    ])
    .unwrap()
}

fn names(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|s| s.to_string()).collect()
}

fn nonzero() -> impl Strategy<Value = f64> {
    prop_oneof![1e-9f64..1e3, -1e3f64..-1e-9]
}

/// Values whose reciprocal overflows to infinity.
fn no_reciprocal() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        Just(-0.0),
        1e-320f64..5e-309,
        -5e-309f64..-1e-320,
    ]
}

// ── Parameter Store Properties ───────────────────────────────────────

proptest! {
    /// inv_Dc and inv_V0 track Dc and V0 through any sequence of updates.
    #[test]
    fn derived_reciprocals_hold(updates in prop::collection::vec((nonzero(), nonzero()), 1..8)) {
        let mut p = base();
        for (dc, v0) in updates {
            p.update([("Dc", dc), ("V0", v0)]).unwrap();
            prop_assert_eq!(p.get("inv_Dc"), Some(1.0 / dc));
            prop_assert_eq!(p.get("inv_V0"), Some(1.0 / v0));
        }
    }

    /// Divisors without a finite reciprocal (zero or subnormal, either sign)
    /// are always refused and never reach the derived keys.
    #[test]
    fn zero_divisor_refused(dc in nonzero(), tiny in no_reciprocal()) {
        let mut p = base();
        p.update([("Dc", dc)]).unwrap();
        prop_assert!(p.update([("V0", tiny)]).is_err());
        prop_assert!(p.update([("Dc", tiny)]).is_err());
        prop_assert_eq!(p.get("V0"), Some(1e-6));
        prop_assert_eq!(p.get("Dc"), Some(dc));
        prop_assert_eq!(p.get("inv_V0"), Some(1e6));
        prop_assert_eq!(p.get("inv_Dc"), Some(1.0 / dc));
    }
}

// ── Vector Codec Properties ──────────────────────────────────────────

proptest! {
    /// unpack(pack(p)) is the identity on the spec keys and leaves the rest alone.
    #[test]
    fn pack_unpack_roundtrip(
        a in -1.0f64..1.0,
        b in -1.0f64..1.0,
        dc in nonzero(),
        order in 0usize..3,
    ) {
        let mut p = base();
        p.update([("a", a), ("b", b), ("Dc", dc)]).unwrap();
        let spec = match order {
            0 => names(&["a", "b", "Dc"]),
            1 => names(&["Dc", "a"]),
            _ => names(&["b"]),
        };
        let x = pack(&p, &spec).unwrap();
        let mut q = base();
        unpack(&mut q, x.as_slice().unwrap(), &spec).unwrap();
        for key in &spec {
            prop_assert_eq!(q.get(key), p.get(key));
        }
        prop_assert_eq!(q.get("mu0"), Some(0.6));
        prop_assert_eq!(q.get("inv_Dc"), Some(1.0 / q.get("Dc").unwrap()));
    }
}

// ── Law Registry Properties ──────────────────────────────────────────

proptest! {
    /// Any ASCII case mix of a known alias resolves to the same law.
    #[test]
    fn law_lookup_case_folds(mask in prop::collection::vec(any::<bool>(), 7)) {
        let reg = LawRegistry::default();
        let mixed: String = "ageing"
            .chars()
            .zip(mask.iter())
            .map(|(c, &up)| if up { c.to_ascii_uppercase() } else { c })
            .collect();
        prop_assert_eq!(reg.resolve(&mixed).unwrap(), StateLaw::Aging);
    }
}

// ── Residual Properties ──────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Dense residuals match the query length for any grid size.
    #[test]
    fn dense_residual_length(n in 2usize..60, a in 0.005f64..0.02) {
        let t: Vec<f64> = (0..n).map(|i| 1e4 * i as f64).collect();
        let data = ObservationDataset::new(t.clone(), vec![0.6; n]).unwrap();
        let mut p = base();
        p.set_state_evolution(StateLaw::Aging);
        let mut ev = ResidualEvaluator::new(
            p,
            RsfIntegrator::default(),
            names(&["a"]),
            &data,
            SolverMode::Dense,
        );
        let mu = ev.residual(&[a], &t).unwrap();
        prop_assert_eq!(mu.len(), n);
    }
}
