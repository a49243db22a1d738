// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Keys every parameter set must carry before it can be used.
pub const REQUIRED_PARAMS: [&str; 6] = ["a", "b", "Dc", "mu0", "V0", "V1"];

/// Derived reciprocal of the critical slip distance.
pub const INV_DC: &str = "inv_Dc";

/// Derived reciprocal of the reference velocity.
pub const INV_V0: &str = "inv_V0";

/// Observation-noise scale, appended to the inversion vector in Bayesian mode.
pub const SIGMA: &str = "sigma";

/// Optional spring stiffness. Absent means rigid coupling to the load point.
pub const STIFFNESS: &str = "k";

/// Starting noise scale when the Bayesian seed comes from least squares.
pub const DEFAULT_SIGMA: f64 = 1.0;
