//! eq-core: stable foundation for the equilibrium engine.
//!
//! Contains:
//! - numeric (Real + finiteness checks)
//! - ids (typed compact IDs for nodes, elements and load patterns)
//! - error (shared error types)
//! - timing (wall-clock accumulators for solver diagnostics)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;

// Re-exports: nice ergonomics for downstream crates
pub use error::EqError;
pub use ids::*;
pub use numeric::*;
pub use timing::{Stopwatch, TimeAccumulator};
