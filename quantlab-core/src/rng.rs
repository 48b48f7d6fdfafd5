//! Per-run randomness.
//!
//! Sub-seeds are BLAKE3 hashes of `(master_seed, run_id, scope, index)`, so a
//! strategy's stream depends only on what it asks for, never on thread
//! scheduling or on which other streams were drawn first.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::domain::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn sub_seed(&self, run_id: &RunId, scope: &str, index: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(run_id.0.as_bytes());
        hasher.update(&[0]);
        hasher.update(scope.as_bytes());
        hasher.update(&index.to_le_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    pub fn rng_for(&self, run_id: &RunId, scope: &str, index: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(run_id, scope, index))
    }
}
