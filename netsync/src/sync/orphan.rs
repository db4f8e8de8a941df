//! Volatile buffers for blocks and commit certificates whose ancestry is
//! not yet locally known.

use crate::crypto::Hash;
use crate::types::{Block, CommitCertificate};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Blocks waiting for a missing parent, keyed by their own hash and
/// indexed by parent hash for next-child lookup.
pub struct OrphanBlockPool {
    blocks: HashMap<Hash, Block>,
    children: HashMap<Hash, BTreeSet<Hash>>,
    capacity: usize,
}

impl OrphanBlockPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            children: HashMap::new(),
            capacity,
        }
    }

    /// Insert a block. Re-insertion with the same hash is a no-op.
    ///
    /// On overflow the highest block is evicted: the entry furthest above
    /// the local tip is the least likely to resolve.
    pub fn add(&mut self, block: Block) {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return;
        }

        self.children.entry(block.parent).or_default().insert(hash);
        self.blocks.insert(hash, block);

        if self.blocks.len() > self.capacity {
            if let Some(evict) = self.most_futuristic() {
                debug!(block = %evict, "orphan pool full, evicting");
                self.remove(&evict);
            }
        }
    }

    /// Remove and return a block whose parent is `parent`. Forks resolve to
    /// the lowest hash byte-wise; callers re-invoke until `None`.
    pub fn try_get_next_block(&mut self, parent: &Hash) -> Option<Block> {
        let next = *self.children.get(parent)?.first()?;
        self.remove(&next)
    }

    /// Drop a block by its own hash.
    pub fn remove(&mut self, hash: &Hash) -> Option<Block> {
        let block = self.blocks.remove(hash)?;
        if let Some(siblings) = self.children.get_mut(&block.parent) {
            siblings.remove(hash);
            if siblings.is_empty() {
                self.children.remove(&block.parent);
            }
        }
        Some(block)
    }

    /// Peek without removing, for serving data requests.
    pub fn get(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn most_futuristic(&self) -> Option<Hash> {
        self.blocks
            .iter()
            .max_by_key(|(hash, block)| (block.height, **hash))
            .map(|(hash, _)| *hash)
    }
}

/// Commit certificates waiting for their target block, keyed by that
/// block's hash. At most one CC per target is retained, first wins.
pub struct OrphanCcPool {
    ccs: HashMap<Hash, CommitCertificate>,
}

impl OrphanCcPool {
    pub fn new() -> Self {
        Self {
            ccs: HashMap::new(),
        }
    }

    pub fn add(&mut self, cc: CommitCertificate) {
        self.ccs.entry(cc.block_hash).or_insert(cc);
    }

    /// Remove and return the CC targeting `block_hash`, if buffered.
    pub fn try_get_cc_by_block_hash(&mut self, block_hash: &Hash) -> Option<CommitCertificate> {
        self.ccs.remove(block_hash)
    }

    /// Peek without removing, for serving data requests.
    pub fn get(&self, block_hash: &Hash) -> Option<&CommitCertificate> {
        self.ccs.get(block_hash)
    }

    pub fn len(&self) -> usize {
        self.ccs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ccs.is_empty()
    }
}

impl Default for OrphanCcPool {
    fn default() -> Self {
        Self::new()
    }
}
