mod hash_index;
mod key_hasher;

pub use hash_index::*;
pub use key_hasher::*;
