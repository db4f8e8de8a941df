//! Block synchronization layer.
//!
//! Sits between the p2p transport and the consensus engine. Incoming
//! messages are decoded, demultiplexed by kind, and either answered by the
//! request manager (inventory/data traffic) or triaged for orphanhood and
//! handed to consensus. Blocks and commit certificates whose ancestry is
//! not yet known are buffered in volatile orphan pools and re-processed
//! when the missing ancestor arrives.

pub mod chain;
pub mod crypto;
pub mod engine;
pub mod network;
pub mod sync;
pub mod types;
pub mod wire;

pub use chain::Chain;
pub use crypto::Hash;
pub use engine::{ConsensusEngine, ConsensusMessage};
pub use network::{Message, MessageHandler, Network, NetworkError};
pub use sync::{SyncConfig, SyncError, SyncManager, SyncStats};
pub use types::{Block, ChannelId, CommitCertificate, Proposal, SyncData, Vote};
