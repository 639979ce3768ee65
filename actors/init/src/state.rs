// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fil_core_runtime::{actor_error, ActorError, Map2, DEFAULT_HAMT_CONFIG, FIRST_NON_SINGLETON_ADDR};
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::ActorID;

pub type AddressMap<BS> = Map2<BS, Address, ActorID>;

/// State is reponsible for allocating actor IDs and remembering which robust
/// address each ID was allocated to.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct State {
    pub address_map: Cid,
    pub next_id: ActorID,
    pub network_name: String,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS, network_name: String) -> Result<Self, ActorError> {
        let address_map = AddressMap::flush_empty(store, DEFAULT_HAMT_CONFIG)?;
        Ok(Self { address_map, next_id: FIRST_NON_SINGLETON_ADDR, network_name })
    }

    pub fn load_address_map<'bs, BS: Blockstore>(
        &self,
        store: &'bs BS,
    ) -> Result<AddressMap<&'bs BS>, ActorError> {
        AddressMap::load(store, &self.address_map, DEFAULT_HAMT_CONFIG, "addresses")
    }

    /// Allocates a new ID address and stores a mapping of the argument address to it.
    /// Fails if the argument address is already present in the map, so that a robust
    /// address can never be rebound to a second ID.
    ///
    /// Returns the newly-allocated actor ID.
    pub fn map_address_to_new_id<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
    ) -> Result<ActorID, ActorError> {
        let id = self.next_id;
        self.next_id += 1;

        let mut map = self.load_address_map(store)?;
        if !map.set_if_absent(addr, id)? {
            return Err(actor_error!(
                forbidden,
                "robust address {} is already allocated in the address map",
                addr
            ));
        }
        self.address_map = map.flush()?;

        Ok(id)
    }

    /// Resolves an address to an ID-address, if possible.
    /// If the provided address is an ID address, it is returned as-is.
    /// This means that mapped ID-addresses (which should only appear as values, not keys) and
    /// singleton actor addresses (which are not in the map) pass through unchanged.
    ///
    /// Returns None if the address was not an ID-address and not found in the mapping.
    /// Returns an error only if state was inconsistent.
    pub fn resolve_address<BS: Blockstore>(
        &self,
        store: &BS,
        addr: &Address,
    ) -> Result<Option<Address>, ActorError> {
        if addr.protocol() == Protocol::ID {
            return Ok(Some(*addr));
        }
        let map = self.load_address_map(store)?;
        Ok(map.get(addr)?.copied().map(Address::new_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fil_core_runtime::test_blockstores::MemoryBlockstore;
    use fvm_shared::error::ExitCode;

    #[test]
    fn allocates_sequential_ids() {
        let store = MemoryBlockstore::new();
        let mut st = State::new(&store, "test".to_string()).unwrap();
        let a = Address::new_actor(b"a");
        let b = Address::new_actor(b"b");

        assert_eq!(100, st.map_address_to_new_id(&store, &a).unwrap());
        assert_eq!(101, st.map_address_to_new_id(&store, &b).unwrap());
        assert_eq!(102, st.next_id);

        assert_eq!(Some(Address::new_id(100)), st.resolve_address(&store, &a).unwrap());
        assert_eq!(Some(Address::new_id(101)), st.resolve_address(&store, &b).unwrap());
        assert_eq!(None, st.resolve_address(&store, &Address::new_actor(b"c")).unwrap());
        assert_eq!(
            Some(Address::new_id(7)),
            st.resolve_address(&store, &Address::new_id(7)).unwrap()
        );
    }

    #[test]
    fn rejects_rebinding() {
        let store = MemoryBlockstore::new();
        let mut st = State::new(&store, "test".to_string()).unwrap();
        let a = Address::new_actor(b"a");
        st.map_address_to_new_id(&store, &a).unwrap();
        let err = st.map_address_to_new_id(&store, &a).unwrap_err();
        assert_eq!(ExitCode::USR_FORBIDDEN, err.exit_code());
    }
}
