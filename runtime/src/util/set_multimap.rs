// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::marker::PhantomData;

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;

use crate::{ActorError, Config, Map2, MapKey};

use super::Set;

#[derive(Clone, Debug)]
pub struct SetMultimapConfig {
    pub outer: Config,
    pub inner: Config,
}

/// A HAMT whose values are the roots of HAMT sets, mapping each key to a set of values.
pub struct SetMultimap<BS, K, V>
where
    BS: Blockstore,
    K: MapKey,
    V: MapKey,
{
    outer: Map2<BS, K, Cid>,
    inner_config: Config,
    value_type: PhantomData<V>,
}

impl<BS, K, V> SetMultimap<BS, K, V>
where
    BS: Blockstore + Clone,
    K: MapKey,
    V: MapKey,
{
    pub fn empty(bs: BS, config: SetMultimapConfig, name: &'static str) -> Self {
        Self {
            outer: Map2::empty(bs, config.outer, name),
            inner_config: config.inner,
            value_type: Default::default(),
        }
    }

    pub fn load(
        bs: BS,
        root: &Cid,
        config: SetMultimapConfig,
        name: &'static str,
    ) -> Result<Self, ActorError> {
        Ok(Self {
            outer: Map2::load(bs, root, config.outer, name)?,
            inner_config: config.inner,
            value_type: Default::default(),
        })
    }

    #[inline]
    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.outer.flush()
    }

    /// Adds each value to the set at `key`, creating the set if needed.
    pub fn put_many(&mut self, key: &K, values: &[V]) -> Result<(), ActorError> {
        let mut set = match self.get(key)? {
            Some(set) => set,
            None => Set::empty(self.outer.store().clone(), self.inner_config.clone(), "multimap inner"),
        };
        for v in values {
            set.put(v)?;
        }
        let new_root = set.flush()?;
        self.outer.set(key, new_root)?;
        Ok(())
    }

    #[inline]
    pub fn put(&mut self, key: &K, value: V) -> Result<(), ActorError> {
        self.put_many(key, std::slice::from_ref(&value))
    }

    /// Loads the set stored at `key`, if any.
    pub fn get(&self, key: &K) -> Result<Option<Set<BS, V>>, ActorError> {
        match self.outer.get(key)? {
            Some(root) => Ok(Some(self.load_inner(root)?)),
            None => Ok(None),
        }
    }

    /// Removes a single value from the set at `key`. Empty sets are dropped.
    pub fn remove(&mut self, key: &K, v: &V) -> Result<(), ActorError> {
        let mut set = match self.get(key)? {
            Some(s) => s,
            None => return Ok(()),
        };
        set.delete(v)?;
        if set.is_empty() {
            self.outer.delete(key)?;
        } else {
            let new_root = set.flush()?;
            self.outer.set(key, new_root)?;
        }
        Ok(())
    }

    #[inline]
    pub fn remove_all(&mut self, key: &K) -> Result<(), ActorError> {
        self.outer.delete(key)?;
        Ok(())
    }

    /// Visits every key with its set of values.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        F: FnMut(K, &Set<BS, V>) -> Result<(), ActorError>,
    {
        self.outer.for_each(|k, root| {
            let set = self.load_inner(root)?;
            f(k, &set)
        })
    }

    /// Visits the values stored at a single key.
    pub fn for_each_in<F>(&self, key: &K, f: F) -> Result<(), ActorError>
    where
        F: FnMut(V) -> Result<(), ActorError>,
    {
        match self.get(key)? {
            Some(set) => set.for_each(f),
            None => Ok(()),
        }
    }

    fn load_inner(&self, root: &Cid) -> Result<Set<BS, V>, ActorError> {
        Set::load(self.outer.store().clone(), root, self.inner_config.clone(), "multimap inner")
    }
}
