//! Weighted BFT consensus core: proposer selection, round/height state
//! machine, and the async engine driving them against the Block Executor,
//! Broadcaster, and Signer collaborators (spec §4.4, §4.5, §6).

pub mod collaborators;
pub mod core;
pub mod engine;
pub mod selector;
pub mod wire;

pub use collaborators::{
    AccountInfo, Block, BlockExecutor, BroadcastMessage, Broadcaster, ExecutorError, NoopBroadcaster,
};
pub use core::{quorum_threshold, BftError, CoreState, VoteAdmission};
pub use engine::{BftEngine, BftEngineConfig};
pub use selector::{collect_powers, select_proposer};
pub use wire::{
    proposal_digest, sign_proposal, sign_vote, verify_proposal, verify_vote, vote_digest, Proposal,
    SignedProposal, SignedVote, Vote, VoteKind,
};
