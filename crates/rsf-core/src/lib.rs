//! Rate-and-state friction inversion engine.
//!
//! Parameter store and vector codec, state-evolution law registry, forward
//! spring-slider model, residual evaluation, Levenberg–Marquardt and ensemble
//! MCMC strategies, and the orchestrating `RsfInversion` session.

pub mod bayes;
pub mod codec;
pub mod forward;
pub mod inversion;
pub mod laws;
pub mod lsq;
pub mod params;
pub mod residual;
pub mod uncertainty;

pub use inversion::RsfInversion;
