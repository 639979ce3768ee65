// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::anyhow;
use cid::Cid;
use fvm_ipld_amt as amt;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::error::ExitCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{ActorError, AsActorError};

/// Wraps an AMT to provide an array API indexed by integer, with errors
/// reported as actor errors. The name adorns error messages only.
pub struct Array<BS, V>
where
    BS: Blockstore,
    V: DeserializeOwned + Serialize,
{
    amt: amt::Amt<V, BS>,
    name: &'static str,
}

impl<BS, V> Array<BS, V>
where
    BS: Blockstore,
    V: DeserializeOwned + Serialize,
{
    pub fn empty(store: BS, bit_width: u32, name: &'static str) -> Self {
        Self { amt: amt::Amt::new_with_bit_width(store, bit_width), name }
    }

    pub fn load(store: BS, root: &Cid, name: &'static str) -> Result<Self, ActorError> {
        let amt = amt::Amt::load(root, store)
            .with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
                format!("failed to load AMT '{}'", name)
            })?;
        Ok(Self { amt, name })
    }

    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.amt.flush().with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to flush AMT '{}'", self.name)
        })
    }

    pub fn count(&self) -> u64 {
        self.amt.count()
    }

    pub fn get(&self, index: u64) -> Result<Option<&V>, ActorError> {
        self.amt.get(index).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to get index {} from AMT '{}'", index, self.name)
        })
    }

    pub fn set(&mut self, index: u64, value: V) -> Result<(), ActorError> {
        self.amt.set(index, value).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to set index {} in AMT '{}'", index, self.name)
        })
    }

    pub fn delete(&mut self, index: u64) -> Result<Option<V>, ActorError> {
        self.amt.delete(index).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to delete index {} from AMT '{}'", index, self.name)
        })
    }

    /// Visits every element once, in ascending index order.
    /// The first error returned by the callback stops iteration and is returned unchanged.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        F: FnMut(u64, &V) -> Result<(), ActorError>,
    {
        let mut callback_err: Option<ActorError> = None;
        let res = self.amt.for_each(|i, v| {
            f(i, v).map_err(|e| {
                let msg = e.to_string();
                callback_err = Some(e);
                anyhow!(msg)
            })
        });
        if let Some(e) = callback_err {
            return Err(e);
        }
        res.with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("error traversing AMT {}", self.name)
        })
    }
}
