use factfs_rs::Engine;

use crate::fs::inodes::InodeMap;

/// The FUSE-facing wrapper: one engine, one inode map, no shared state. The
/// session dispatches one operation at a time, which is exactly the engine's
/// single-mutator contract.
pub struct FactFuse {
    pub(crate) engine: Engine,
    pub(crate) inodes: InodeMap,
}

impl FactFuse {
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            inodes: InodeMap::new(),
        }
    }
}
