//! Consensus calling for read families.
//!
//! - [`tally`]: per-position likelihood accumulation and base calling
//! - [`builder`]: one consensus record per mate for each family
//! - [`overlap`]: reconciliation of the positions both consensus mates cover
//! - [`record`]: the consensus output types

pub mod builder;
pub mod overlap;
pub mod record;
pub mod tally;

pub use builder::ConsensusBuilder;
pub use overlap::{AgreementStrategy, OverlapReconciler};
pub use record::{ConsensusPair, ConsensusRecord, FamilySummary, ReconciledPair};
