// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::rc::Rc;

use anyhow::anyhow;
use fil_core_actor_cron::{built_in_entries, Entry, State as CronState};
use fil_core_actor_init::ConstructorParams as InitConstructorParams;
use fil_core_runtime::runtime::Primitives;
use fil_core_runtime::test_blockstores::MemoryBlockstore;
use fil_core_runtime::{
    Type, CRON_ACTOR_ADDR, EMPTY_ARR_CID, GENESIS_SINGLETONS, INIT_ACTOR_ADDR, REWARD_ACTOR_ADDR,
    STORAGE_MARKET_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::CborStore;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::{METHOD_CONSTRUCTOR, METHOD_SEND};
use multihash::Code;

use crate::actors::account::State as AccountState;
use crate::{actor, TEST_VM_RAND_ARRAY, VM};

/// Everything that distinguishes one network's genesis from another's.
#[derive(Clone, Debug)]
pub struct GenesisConfig {
    pub network_name: String,
    /// Callbacks the Cron actor makes at the end of every epoch.
    pub cron_entries: Vec<Entry>,
    pub seed: [u8; RANDOMNESS_LENGTH],
    pub block_winner: Address,
    /// Funds held by the reward actor, from which test accounts are paid.
    pub reward_balance: TokenAmount,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        GenesisConfig {
            network_name: "localnet".to_string(),
            cron_entries: built_in_entries(),
            seed: TEST_VM_RAND_ARRAY,
            block_winner: SYSTEM_ACTOR_ADDR,
            reward_balance: TokenAmount::from_whole(1_000_000_000),
        }
    }
}

impl VM {
    /// Creates a VM whose state tree holds the singleton actors, each constructed by the
    /// system actor in the order they are listed.
    pub fn new_with_genesis(
        store: Rc<MemoryBlockstore>,
        config: GenesisConfig,
    ) -> anyhow::Result<VM> {
        let v = VM::new(store, config.seed)?;
        v.set_block_winner(config.block_winner);

        for (id, typ) in GENESIS_SINGLETONS {
            let addr = Address::new_id(*id);
            let (state, balance) = match typ {
                // Account singletons are never constructed, as their addresses are not keys.
                Type::Account => {
                    let state = v.store.put_cbor(&AccountState { address: addr }, Code::Blake2b256)?;
                    let balance = if addr == REWARD_ACTOR_ADDR {
                        config.reward_balance.clone()
                    } else {
                        TokenAmount::default()
                    };
                    (state, balance)
                }
                Type::Cron => {
                    let st = CronState { entries: config.cron_entries.clone() };
                    (v.store.put_cbor(&st, Code::Blake2b256)?, TokenAmount::default())
                }
                _ => (*EMPTY_ARR_CID, TokenAmount::default()),
            };
            v.set_actor(&addr, actor(typ.code_cid(), state, 0, balance))?;
        }

        let init_params =
            IpldBlock::serialize_cbor(&InitConstructorParams { network_name: config.network_name })?;
        v.construct(&SYSTEM_ACTOR_ADDR, None)?;
        v.construct(&INIT_ACTOR_ADDR, init_params)?;
        v.construct(&CRON_ACTOR_ADDR, None)?;
        v.construct(&STORAGE_POWER_ACTOR_ADDR, None)?;
        v.construct(&STORAGE_MARKET_ACTOR_ADDR, None)?;

        v.checkpoint()?;
        Ok(v)
    }

    fn construct(&self, addr: &Address, params: Option<IpldBlock>) -> anyhow::Result<()> {
        let res = self.execute_message_implicit(
            &SYSTEM_ACTOR_ADDR,
            addr,
            TokenAmount::default(),
            METHOD_CONSTRUCTOR,
            params,
        )?;
        if !res.code.is_success() {
            return Err(anyhow!("failed to construct {}: {} {}", addr, res.code, res.message));
        }
        Ok(())
    }
}

/// Creates `count` BLS accounts, each funded with `balance` from the reward actor, and
/// returns their ID addresses.
pub fn create_accounts(v: &VM, count: u64, balance: &TokenAmount) -> anyhow::Result<Vec<Address>> {
    let mut ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = new_bls_address(v)?;
        let res = v.apply_message(&REWARD_ACTOR_ADDR, &key, balance.clone(), METHOD_SEND, None::<()>)?;
        if !res.code.is_success() {
            return Err(anyhow!("failed to fund {}: {} {}", key, res.code, res.message));
        }
        let id = v
            .resolve_id_address(&key)?
            .ok_or_else(|| anyhow!("account {} was not created", key))?;
        ids.push(id);
    }
    Ok(ids)
}

/// A BLS address not yet known to the VM, derived from the reward actor's call sequence.
fn new_bls_address(v: &VM) -> anyhow::Result<Address> {
    let seq = v
        .actor(&REWARD_ACTOR_ADDR)?
        .ok_or_else(|| anyhow!("no reward actor"))?
        .call_seq;
    let mut key = [0u8; fvm_shared::address::BLS_PUB_LEN];
    key[..8].copy_from_slice(&seq.to_be_bytes());
    key[8..40].copy_from_slice(&v.primitives.hash_blake2b(&seq.to_be_bytes()));
    Ok(Address::new_bls(&key)?)
}
