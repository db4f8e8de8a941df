//! Block store contract consumed by the sync layer.

use crate::crypto::Hash;
use crate::types::Block;

/// Read access to the locally committed chain.
///
/// The store is updated by the consensus engine; the sync layer only
/// queries it to decide orphanhood and to serve data requests.
pub trait Chain: Send + Sync {
    /// Look up a block by its content hash.
    fn find_block(&self, hash: &Hash) -> Option<Block>;

    /// A block is an orphan when its parent is absent from the chain.
    /// The root block (zero parent) is never an orphan.
    fn is_orphan(&self, block: &Block) -> bool {
        !block.parent.is_zero() && self.find_block(&block.parent).is_none()
    }

    /// All known blocks at a height. Forks may yield more than one.
    fn find_blocks_by_height(&self, height: u64) -> Vec<Block>;
}
