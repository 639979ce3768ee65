// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT
use std::cell::RefCell;
use std::collections::HashMap;

use anyhow::Result;
use cid::Cid;

use fvm_ipld_blockstore::Blockstore;

/// Stats for a [MemoryBlockstore] this indicates the amount of read and written data
/// to the wrapped store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BSStats {
    /// Number of reads
    pub r: usize,
    /// Number of writes
    pub w: usize,
    /// Bytes Read
    pub br: usize,
    /// Bytes Written
    pub bw: usize,
}

/// In-memory content-addressed store which tracks reads and writes.
/// Backs the in-memory VM and every test in the workspace.
#[derive(Debug, Default)]
pub struct MemoryBlockstore {
    blocks: RefCell<HashMap<Cid, Vec<u8>>>,
    stats: RefCell<BSStats>,
}

impl MemoryBlockstore {
    pub fn new() -> Self {
        Self { blocks: Default::default(), stats: Default::default() }
    }

    /// Read and write counters accumulated since creation.
    pub fn stats(&self) -> BSStats {
        *self.stats.borrow()
    }

    /// Number of distinct blocks held.
    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Drops a block, so that later reads of `cid` find nothing.
    /// Used to simulate a damaged store.
    pub fn forget(&self, cid: &Cid) -> bool {
        self.blocks.borrow_mut().remove(cid).is_some()
    }
}

impl Blockstore for MemoryBlockstore {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        let mut stats = self.stats.borrow_mut();
        stats.r += 1;

        let bytes = self.blocks.borrow().get(cid).cloned();

        if let Some(bytes) = &bytes {
            stats.br += bytes.len();
        }
        Ok(bytes)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        self.stats.borrow_mut().r += 1;

        Ok(self.blocks.borrow().contains_key(cid))
    }

    fn put_keyed(&self, k: &Cid, block: &[u8]) -> Result<()> {
        let mut stats = self.stats.borrow_mut();
        stats.w += 1;
        stats.bw += block.len();

        self.blocks.borrow_mut().insert(*k, block.into());
        Ok(())
    }
}
