pub mod hash;

pub use hash::{hash_data, Hash, HASH_SIZE};
