//! Numerical primitives for RSF inversion.

pub mod interp;
pub mod linalg;
pub mod ode;
