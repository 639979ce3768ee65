// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;

use crate::{ActorError, Config, Map2, MapKey};

/// A HAMT with unit values, used as a persistent set of keys.
pub struct Set<BS, K>(Map2<BS, K, ()>)
where
    BS: Blockstore,
    K: MapKey;

impl<BS, K> Set<BS, K>
where
    BS: Blockstore,
    K: MapKey,
{
    pub fn empty(bs: BS, config: Config, name: &'static str) -> Self {
        Self(Map2::empty(bs, config, name))
    }

    pub fn load(
        bs: BS,
        root: &Cid,
        config: Config,
        name: &'static str,
    ) -> Result<Self, ActorError> {
        Ok(Self(Map2::load(bs, root, config, name)?))
    }

    #[inline]
    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.0.flush()
    }

    /// Adds a key, returning whether it was newly inserted.
    #[inline]
    pub fn put(&mut self, key: &K) -> Result<bool, ActorError> {
        self.0.set_if_absent(key, ())
    }

    #[inline]
    pub fn has(&self, key: &K) -> Result<bool, ActorError> {
        self.0.contains_key(key)
    }

    /// Removes a key, returning whether it was present.
    #[inline]
    pub fn delete(&mut self, key: &K) -> Result<bool, ActorError> {
        Ok(self.0.delete(key)?.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Visits every key once.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        F: FnMut(K) -> Result<(), ActorError>,
    {
        self.0.for_each(|k, _| f(k))
    }

    pub fn collect_keys(&self) -> Result<Vec<K>, ActorError> {
        let mut keys = Vec::new();
        self.for_each(|k| {
            keys.push(k);
            Ok(())
        })?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_blockstores::MemoryBlockstore;
    use crate::DEFAULT_HAMT_CONFIG;

    #[test]
    fn put_is_idempotent() {
        let bs = MemoryBlockstore::new();
        let mut set = Set::<_, u64>::empty(&bs, DEFAULT_HAMT_CONFIG, "ids");
        assert!(set.put(&3).unwrap());
        assert!(!set.put(&3).unwrap());
        assert!(set.has(&3).unwrap());
        assert!(set.delete(&3).unwrap());
        assert!(!set.delete(&3).unwrap());
        assert!(set.is_empty());
    }

    #[test]
    fn collects_all_keys() {
        let bs = MemoryBlockstore::new();
        let mut set = Set::<_, u64>::empty(&bs, DEFAULT_HAMT_CONFIG, "ids");
        for k in [9u64, 1, 5] {
            set.put(&k).unwrap();
        }
        let root = set.flush().unwrap();
        let set = Set::<_, u64>::load(&bs, &root, DEFAULT_HAMT_CONFIG, "ids").unwrap();
        let mut keys = set.collect_keys().unwrap();
        keys.sort_unstable();
        assert_eq!(vec![1, 5, 9], keys);
    }
}
