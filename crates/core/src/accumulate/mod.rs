//! Accumulation of raw particle mass into physical concentration and
//! deposition fields, the transient carry-over pool, and receptor series.

pub mod concentration;
pub mod receptors;
pub mod transient;

pub use concentration::{AccumulationDelta, ConcentrationGrid};
pub use receptors::{Receptor, ReceptorSet, ReceptorStatistics};
pub use transient::{PoolRelease, TransientPool};
