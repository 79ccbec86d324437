//! Evidence data model and canonical hashing (spec §3).

use potso_crypto::Signature65;
use potso_types::{Address, EvidenceKind, Hash32};
use serde::{Deserialize, Serialize};

/// A signed, canonical report of validator misbehavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub offender: Address,
    pub reporter: Address,
    /// Ascending, non-empty.
    pub heights: Vec<u64>,
    pub details: Vec<u8>,
    #[serde(with = "sig_bytes")]
    pub reporter_sig: Signature65,
    pub timestamp: i64,
}

mod sig_bytes {
    use potso_crypto::Signature65;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(sig: &Signature65, s: S) -> Result<S::Ok, S::Error> {
        sig.as_bytes().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Signature65, D::Error> {
        let bytes = <[u8; 65]>::deserialize(d)?;
        Ok(Signature65(bytes))
    }
}

/// `canonicalHash`: blake3-256 of a length-delimited serialization of
/// `{type, offender, heights, details}` — deliberately excludes `reporter`
/// and `timestamp` so that the hash is a pure function of the misbehavior
/// claim itself (spec §8 universal invariant).
pub fn canonical_hash(evidence: &Evidence) -> Hash32 {
    let mut buf = Vec::with_capacity(1 + 20 + 4 + evidence.heights.len() * 8 + 4 + evidence.details.len());
    buf.push(evidence.kind.wire_tag());
    buf.extend_from_slice(evidence.offender.as_bytes());
    buf.extend_from_slice(&(evidence.heights.len() as u32).to_be_bytes());
    for h in &evidence.heights {
        buf.extend_from_slice(&h.to_be_bytes());
    }
    buf.extend_from_slice(&(evidence.details.len() as u32).to_be_bytes());
    buf.extend_from_slice(&evidence.details);
    Hash32(potso_crypto::blake3_256(&buf))
}

/// The digest a reporter signs over: `sha256("potso_evidence|hex(hash)|timestamp")`.
pub fn signing_digest(hash: &Hash32, timestamp: i64) -> [u8; 32] {
    let s = format!("potso_evidence|{}|{}", hash.to_hex(), timestamp);
    potso_crypto::sha256(s.as_bytes())
}

/// `{hash, evidence, receivedAt}` — stored once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub hash: Hash32,
    pub evidence: Evidence,
    pub received_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(heights: Vec<u64>) -> Evidence {
        Evidence {
            kind: EvidenceKind::Equivocation,
            offender: Address([1u8; 20]),
            reporter: Address([2u8; 20]),
            heights,
            details: b"conflicting blocks".to_vec(),
            reporter_sig: Signature65([0u8; 65]),
            timestamp: 100,
        }
    }

    #[test]
    fn canonical_hash_ignores_reporter_and_timestamp() {
        let mut a = sample(vec![1, 2, 3]);
        let mut b = a.clone();
        b.reporter = Address([9u8; 20]);
        b.timestamp = 999;
        assert_eq!(canonical_hash(&a), canonical_hash(&b));

        a.heights = vec![1, 2, 4];
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn canonical_hash_is_deterministic() {
        let e = sample(vec![10, 20]);
        assert_eq!(canonical_hash(&e), canonical_hash(&e));
    }
}
