//! Evidence ingestion: canonical hashing, validation, and durable storage of
//! misbehavior reports feeding the Penalty Engine (spec §4.3).

pub mod record;
pub mod store;
pub mod validate;

pub use record::{canonical_hash, signing_digest, Evidence, EvidenceRecord};
pub use store::{EvidenceError, EvidenceFilter, EvidenceStore};
pub use validate::{validate, AcceptAllHeights, HeightLookup, KnownHeights, RejectReason};
