//! Vote/Proposal types and their canonical signing representation (spec §3,
//! §4.5 "Signing"). One pure function maps each variant to signing bytes;
//! both the signer and the verifier path reuse it, mirroring the teacher's
//! `BlockProposal::compute_hash` pattern in `ibft`.

use potso_crypto::{recover, Signature65, Signer};
use potso_types::{Address, Hash32};
use serde::{Deserialize, Serialize};

use crate::collaborators::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteKind {
    Prevote,
    Precommit,
}

impl VoteKind {
    fn wire_tag(self) -> u8 {
        match self {
            VoteKind::Prevote => 0,
            VoteKind::Precommit => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub height: u64,
    pub round: u32,
    pub kind: VoteKind,
    /// `None` is a nil vote (no block, or a round/step timeout).
    pub block_hash: Option<Hash32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedVote {
    pub vote: Vote,
    pub validator: Address,
    pub signature: Signature65,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub block: Block,
    pub round: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedProposal {
    pub proposal: Proposal,
    pub proposer: Address,
    pub signature: Signature65,
}

/// Canonical bytes for a vote, excluding `validator`/`signature` (spec
/// §4.5: "the canonical ... serialization of the vote/proposal payload
/// excluding validator/signature fields").
fn vote_signing_bytes(vote: &Vote) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 4 + 1 + 33);
    buf.extend_from_slice(&vote.height.to_be_bytes());
    buf.extend_from_slice(&vote.round.to_be_bytes());
    buf.push(vote.kind.wire_tag());
    match vote.block_hash {
        Some(hash) => {
            buf.push(1);
            buf.extend_from_slice(&hash.0);
        }
        None => buf.push(0),
    }
    buf
}

fn proposal_signing_bytes(proposal: &Proposal) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + 4);
    buf.extend_from_slice(&proposal.block.hash().0);
    buf.extend_from_slice(&proposal.round.to_be_bytes());
    buf
}

pub fn vote_digest(vote: &Vote) -> [u8; 32] {
    potso_crypto::sha256(&vote_signing_bytes(vote))
}

pub fn proposal_digest(proposal: &Proposal) -> [u8; 32] {
    potso_crypto::sha256(&proposal_signing_bytes(proposal))
}

pub fn sign_vote(vote: Vote, validator: Address, signer: &dyn Signer) -> Result<SignedVote, potso_crypto::CryptoError> {
    let signature = signer.sign(&vote_digest(&vote))?;
    Ok(SignedVote { vote, validator, signature })
}

pub fn sign_proposal(
    proposal: Proposal,
    proposer: Address,
    signer: &dyn Signer,
) -> Result<SignedProposal, potso_crypto::CryptoError> {
    let signature = signer.sign(&proposal_digest(&proposal))?;
    Ok(SignedProposal { proposal, proposer, signature })
}

/// Recovers the signer and checks it matches the claimed identity. Callers
/// additionally check set membership (spec §4.5: "verifiers MUST reject
/// votes whose recovered signer does not match `validator` ... or whose
/// `validator` is not in the current validator set").
pub fn verify_vote(signed: &SignedVote) -> bool {
    match recover(&vote_digest(&signed.vote), &signed.signature) {
        Ok(pubkey) => potso_crypto::address_of(&pubkey) == signed.validator,
        Err(_) => false,
    }
}

pub fn verify_proposal(signed: &SignedProposal) -> bool {
    match recover(&proposal_digest(&signed.proposal), &signed.signature) {
        Ok(pubkey) => potso_crypto::address_of(&pubkey) == signed.proposer,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potso_crypto::LocalSigner;
    use rand::rngs::OsRng;

    #[test]
    fn vote_signature_roundtrips() {
        let signer = LocalSigner::generate(&mut OsRng);
        let vote = Vote {
            height: 1,
            round: 0,
            kind: VoteKind::Prevote,
            block_hash: Some(Hash32([3u8; 32])),
        };
        let signed = sign_vote(vote, signer.address(), &signer).unwrap();
        assert!(verify_vote(&signed));
    }

    #[test]
    fn tampered_vote_fails_verification() {
        let signer = LocalSigner::generate(&mut OsRng);
        let vote = Vote {
            height: 1,
            round: 0,
            kind: VoteKind::Prevote,
            block_hash: Some(Hash32([3u8; 32])),
        };
        let mut signed = sign_vote(vote, signer.address(), &signer).unwrap();
        signed.vote.block_hash = Some(Hash32([9u8; 32]));
        assert!(!verify_vote(&signed));
    }

    #[test]
    fn proposal_signature_roundtrips() {
        let signer = LocalSigner::generate(&mut OsRng);
        let proposal = Proposal {
            block: Block {
                height: 1,
                previous_hash: Hash32([0u8; 32]),
                transactions: vec![b"tx".to_vec()],
            },
            round: 0,
        };
        let signed = sign_proposal(proposal, signer.address(), &signer).unwrap();
        assert!(verify_proposal(&signed));
    }
}
