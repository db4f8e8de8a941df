//! Consensus engine contract consumed by the sync layer.

use crate::types::{Block, CommitCertificate, Vote};

/// Entities the sync layer hands to consensus.
///
/// Proposals are unpacked before hand-off; the engine never sees one.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsensusMessage {
    Block(Block),
    CommitCertificate(CommitCertificate),
    Vote(Vote),
}

/// Opaque sink for entities whose ancestry is locally resolvable.
///
/// Hand-off is fire-and-forget: the engine owns the entity from this point
/// and the sync layer never re-buffers it, whatever the engine decides.
pub trait ConsensusEngine: Send + Sync {
    fn add_message(&self, message: ConsensusMessage);

    /// Node identifier, used in log records when configured.
    fn id(&self) -> String;
}
