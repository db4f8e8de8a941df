//! Fixtures standing in for the sync layer's external collaborators: an
//! in-memory chain, a consensus sink that records hand-offs, and a network
//! that records outbound messages.

use libp2p::PeerId;
use netsync::engine::ConsensusMessage;
use netsync::network::{Message, MessageHandler, NetworkResult};
use netsync::{Block, Chain, ConsensusEngine, Hash, Network};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::generators::random_peer_id;

/// In-memory block store seeded with a genesis block.
pub struct MemoryChain {
    blocks: RwLock<HashMap<Hash, Block>>,
    genesis: Hash,
}

impl MemoryChain {
    pub fn with_genesis() -> Self {
        let genesis = Block::new(Hash::zero(), 0, vec![]);
        let hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);
        Self {
            blocks: RwLock::new(blocks),
            genesis: hash,
        }
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis
    }

    pub fn insert(&self, block: Block) {
        self.blocks.write().unwrap().insert(block.hash(), block);
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.read().unwrap().contains_key(hash)
    }
}

impl Chain for MemoryChain {
    fn find_block(&self, hash: &Hash) -> Option<Block> {
        self.blocks.read().unwrap().get(hash).cloned()
    }

    fn find_blocks_by_height(&self, height: u64) -> Vec<Block> {
        self.blocks
            .read()
            .unwrap()
            .values()
            .filter(|block| block.height == height)
            .cloned()
            .collect()
    }
}

/// Consensus sink that records every hand-off in arrival order.
///
/// When wired to a [`MemoryChain`] it commits received blocks, mimicking
/// the engine's effect on the store so resolution cascades can proceed.
pub struct RecordingConsensus {
    id: String,
    chain: Option<Arc<MemoryChain>>,
    messages: Mutex<Vec<ConsensusMessage>>,
}

impl RecordingConsensus {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            chain: None,
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn committing_to(id: &str, chain: Arc<MemoryChain>) -> Self {
        Self {
            id: id.to_string(),
            chain: Some(chain),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<ConsensusMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Blocks received, in arrival order.
    pub fn blocks(&self) -> Vec<Block> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                ConsensusMessage::Block(block) => Some(block),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().unwrap().is_empty()
    }
}

impl ConsensusEngine for RecordingConsensus {
    fn add_message(&self, message: ConsensusMessage) {
        if let (Some(chain), ConsensusMessage::Block(block)) = (&self.chain, &message) {
            chain.insert(block.clone());
        }
        self.messages.lock().unwrap().push(message);
    }

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Network stub that records outbound messages and hands back the
/// registered handler for driving ingress in tests.
pub struct RecordingNetwork {
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    sent: Mutex<Vec<Message>>,
    peers: Mutex<Vec<PeerId>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn add_peers(&self, count: usize) -> Vec<PeerId> {
        let fresh: Vec<PeerId> = (0..count).map(|_| random_peer_id()).collect();
        self.peers.lock().unwrap().extend(fresh.iter().copied());
        fresh
    }

    pub fn handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.handler.lock().unwrap().clone()
    }
}

impl Default for RecordingNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Network for RecordingNetwork {
    fn register_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn send(&self, message: Message) -> NetworkResult<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn peers(&self) -> Vec<PeerId> {
        self.peers.lock().unwrap().clone()
    }
}
