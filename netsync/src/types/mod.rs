//! Chain entities exchanged during synchronization.
//!
//! Blocks are content-addressed by `Block::hash()`; a commit certificate
//! attests finality of the block it names. Signature payloads are opaque to
//! this layer, which only inspects parent pointers and target hashes.

use crate::crypto::{hash_data, Hash};
use serde::{Deserialize, Serialize};

/// Transport channels the sync layer subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    Header,
    Block,
    Proposal,
    CommitCertificate,
    Vote,
}

/// Block structure.
///
/// The root block's parent is `Hash::zero()`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub parent: Hash,
    pub height: u64,
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(parent: Hash, height: u64, transactions: Vec<Vec<u8>>) -> Self {
        Self {
            parent,
            height,
            transactions,
        }
    }

    /// Content-addressed identifier of this block.
    pub fn hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(self.parent.as_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        for tx in &self.transactions {
            data.extend_from_slice(&(tx.len() as u64).to_le_bytes());
            data.extend_from_slice(tx);
        }
        hash_data(&data)
    }

    /// Check if this block extends from another block.
    pub fn extends_from(&self, other: &Block) -> bool {
        self.parent == other.hash()
    }
}

/// Quorum attestation that a block is finalised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitCertificate {
    pub block_hash: Hash,
    pub signature: Vec<u8>,
}

impl CommitCertificate {
    pub fn new(block_hash: Hash, signature: Vec<u8>) -> Self {
        Self {
            block_hash,
            signature,
        }
    }
}

/// A block together with an optional commit certificate for an ancestor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub commit_certificate: Option<CommitCertificate>,
    pub block: Block,
}

/// A validator's endorsement of a block by hash.
///
/// A hash-less vote is legitimate wire traffic and passes straight through
/// to consensus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub block_hash: Option<Hash>,
    pub voter: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Decoded entity carried by a data response, selected by its channel.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncData {
    Proposal(Proposal),
    Block(Block),
    CommitCertificate(CommitCertificate),
    Vote(Vote),
}
