//! Test data generators

use libp2p::identity::Keypair;
use libp2p::PeerId;
use netsync::crypto::hash_data;
use netsync::{Block, Hash};
use rand::Rng;

/// Generate random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// Generate a random content hash
pub fn random_hash() -> Hash {
    hash_data(&random_bytes(32))
}

/// Generate a fresh peer identity
pub fn random_peer_id() -> PeerId {
    PeerId::from(Keypair::generate_ed25519().public())
}

/// A block at `height` extending `parent`, with a random payload so
/// sibling blocks hash differently.
pub fn random_block(parent: Hash, height: u64) -> Block {
    Block::new(parent, height, vec![random_bytes(8)])
}

/// A chain of `len` blocks extending `parent`, in parent-first order.
pub fn block_chain(parent: Hash, start_height: u64, len: usize) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(len);
    let mut parent = parent;
    for i in 0..len {
        let block = random_block(parent, start_height + i as u64);
        parent = block.hash();
        blocks.push(block);
    }
    blocks
}
