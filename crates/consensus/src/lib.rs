//! Consensus constants, parameters, and upgrade schedule.

pub mod constants;
pub mod money;
pub mod params;
pub mod upgrades;

pub use params::{consensus_params, Checkpoint, ConsensusParams, Network};
pub use upgrades::Hash256;
