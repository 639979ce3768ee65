use std::collections::HashMap;

use fil_core_runtime::{ActorError, MessageAccumulator, FIRST_NON_SINGLETON_ADDR};
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::ActorID;

use crate::State;

pub struct StateSummary {
    pub ids_by_address: HashMap<Address, ActorID>,
    pub next_id: ActorID,
}

/// Checks internal invariants of init state.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    acc.require(!state.network_name.is_empty(), "network name is empty");
    acc.require(
        state.next_id >= FIRST_NON_SINGLETON_ADDR,
        format!("next id {} is too low", state.next_id),
    );

    let mut init_summary = StateSummary { ids_by_address: HashMap::new(), next_id: state.next_id };

    let mut address_by_id = HashMap::<ActorID, Address>::new();
    match state.load_address_map(store) {
        Ok(address_map) => {
            let ret = address_map.for_each(|key_address, actor_id| {
                acc.require(
                    key_address.protocol() != Protocol::ID,
                    format!("key {key_address} is an ID address"),
                );
                acc.require(
                    actor_id >= &FIRST_NON_SINGLETON_ADDR,
                    format!("unexpected singleton ID value {actor_id}"),
                );
                acc.require(
                    actor_id < &state.next_id,
                    format!("ID {actor_id} for {key_address} not below next id {}", state.next_id),
                );

                if let Some(duplicate) = address_by_id.insert(*actor_id, key_address) {
                    acc.add(format!(
                        "duplicate mapping to ID {actor_id}: {key_address} {duplicate}"
                    ));
                }
                init_summary.ids_by_address.insert(key_address, *actor_id);

                Ok::<(), ActorError>(())
            });

            acc.require_no_error(ret, "error iterating address map");
        }
        Err(e) => acc.add(format!("error loading address map: {e}")),
    }

    (init_summary, acc)
}
