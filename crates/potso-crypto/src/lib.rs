//! The Signer collaborator (spec §6): deterministic secp256k1 sign/verify
//! over message digests, plus the sha256/blake3 digest helpers the rest of
//! the workspace builds canonical hashes from.
//!
//! Grounded in the teacher's secp256k1 usage
//! (`docklock-platform/docklock/src/wallet.rs`: `Secp256k1::new()`,
//! `Message::from_digest_slice`, `sign_ecdsa`, `serialize_compact`), extended
//! with ECDSA recovery (spec requires `Recover(digest, sig) -> pubkey`) via
//! the `recovery` feature.

use potso_types::Address;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid digest length: expected 32 bytes, got {0}")]
    InvalidDigestLength(usize),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("signature recovery failed: {0}")]
    RecoveryFailed(String),
}

/// A 65-byte recoverable ECDSA signature: 64 bytes of (r, s) plus a 1-byte
/// recovery id, matching spec §3 ("reporterSig: 65 bytes").
#[derive(Clone, PartialEq, Eq)]
pub struct Signature65(pub [u8; 65]);

impl Signature65 {
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }
}

/// The Signer collaborator. `Sign` and `Recover` operate over 32-byte
/// digests; `AddressOf` derives the 20-byte identifier used everywhere else
/// in the workspace.
pub trait Signer: Send + Sync {
    fn sign(&self, digest: &[u8; 32]) -> Result<Signature65, CryptoError>;
    fn public_key(&self) -> PublicKey;
}

/// Recover the signer's public key from a digest + 65-byte recoverable
/// signature, independent of which key produced it.
pub fn recover(digest: &[u8; 32], sig: &Signature65) -> Result<PublicKey, CryptoError> {
    let secp = Secp256k1::verification_only();
    let message = Message::from_digest_slice(digest)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let recovery_id = RecoveryId::from_i32(sig.0[64] as i32)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
    let recoverable = RecoverableSignature::from_compact(&sig.0[..64], recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
    secp.recover_ecdsa(&message, &recoverable)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))
}

/// Derive the 20-byte address of a public key: the low 20 bytes of
/// sha256(uncompressed public key, minus the 0x04 prefix).
///
/// The spec leaves the exact derivation unspecified (it is owned by the
/// external Signer collaborator); sha256 is used here, rather than keccak,
/// because it is already a workspace dependency and the derivation only
/// needs to be *consistent*, not interoperable with any specific external
/// chain. Recorded as an open question in DESIGN.md.
pub fn address_of(pubkey: &PublicKey) -> Address {
    let uncompressed = pubkey.serialize_uncompressed();
    let mut hasher = Sha256::new();
    hasher.update(&uncompressed[1..]);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..32]);
    Address(bytes)
}

/// An in-memory secp256k1 signer, for nodes and tests that hold their own
/// key material directly (production deployments inject a hardware/remote
/// Signer implementing the same trait).
pub struct LocalSigner {
    secret: SecretKey,
    public: PublicKey,
}

impl LocalSigner {
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secret, public })
    }

    pub fn generate(rng: &mut impl rand::RngCore) -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(rng);
        Self { secret, public }
    }

    pub fn address(&self) -> Address {
        address_of(&self.public)
    }
}

impl Signer for LocalSigner {
    fn sign(&self, digest: &[u8; 32]) -> Result<Signature65, CryptoError> {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest_slice(digest)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let recoverable = secp.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = recoverable.serialize_compact();
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&compact);
        out[64] = recovery_id.to_i32() as u8;
        Ok(Signature65(out))
    }

    fn public_key(&self) -> PublicKey {
        self.public
    }
}

/// sha256(data), used for the evidence-signature digest
/// (`sha256("potso_evidence|hex(hash)|timestamp")`) and the BFT vote/
/// proposal signing digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// blake3-256 of `data`, used for the evidence canonical hash (spec §3).
pub fn blake3_256(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_then_recover_roundtrips_to_same_address() {
        let signer = LocalSigner::generate(&mut OsRng);
        let digest = sha256(b"hello potso");
        let sig = signer.sign(&digest).unwrap();
        assert_eq!(sig.as_bytes().len(), 65);

        let recovered = recover(&digest, &sig).unwrap();
        assert_eq!(address_of(&recovered), signer.address());
    }

    #[test]
    fn recover_fails_on_wrong_digest() {
        let signer = LocalSigner::generate(&mut OsRng);
        let digest = sha256(b"hello potso");
        let sig = signer.sign(&digest).unwrap();
        let other_digest = sha256(b"goodbye potso");
        let recovered = recover(&other_digest, &sig).unwrap();
        assert_ne!(address_of(&recovered), signer.address());
    }
}
