//! Deterministic epoch reward distribution (spec §4.6): pro-rata split over
//! a weight snapshot with rounding-bucket carry, persisted as an auditable
//! reward ledger.

pub mod bucket;
pub mod distributor;
pub mod ledger;

pub use bucket::RoundingBucket;
pub use distributor::{distribute, DistributionOutcome, RewardShare};
pub use ledger::{PaidRef, RewardEntry, RewardError, RewardLedger, RewardStatus};
