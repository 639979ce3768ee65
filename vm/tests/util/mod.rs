// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

#![allow(dead_code)]

use std::rc::Rc;

use fil_core_runtime::test_blockstores::MemoryBlockstore;
use fil_core_runtime::CHAOS_ACTOR_ADDR;
use fil_core_vm::{check_state_invariants, create_accounts, GenesisConfig, MessageResult, VM};
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::MethodNum;
use serde::Serialize;

pub fn setup_with(config: GenesisConfig) -> VM {
    let _ = pretty_env_logger::try_init();
    VM::new_with_genesis(Rc::new(MemoryBlockstore::new()), config).unwrap()
}

pub fn setup() -> VM {
    setup_with(GenesisConfig::default())
}

/// A genesis VM with the chaos actor installed and `count` funded accounts.
pub fn setup_chaos(count: u64) -> (VM, Vec<Address>) {
    let v = setup();
    v.install_chaos().unwrap();
    let accounts = create_accounts(&v, count, &TokenAmount::from_whole(10_000)).unwrap();
    (v, accounts)
}

pub fn apply_ok<S: Serialize>(
    v: &VM,
    from: &Address,
    to: &Address,
    value: &TokenAmount,
    method: MethodNum,
    params: Option<S>,
) -> MessageResult {
    apply_code(v, from, to, value, method, params, ExitCode::OK)
}

pub fn apply_code<S: Serialize>(
    v: &VM,
    from: &Address,
    to: &Address,
    value: &TokenAmount,
    method: MethodNum,
    params: Option<S>,
    code: ExitCode,
) -> MessageResult {
    let res = v.apply_message(from, to, value.clone(), method, params).unwrap();
    assert_eq!(code, res.code, "unexpected exit code, message: {}", res.message);
    res
}

pub fn chaos_value(v: &VM) -> String {
    v.get_state::<fil_core_vm::actors::chaos::State>(&CHAOS_ACTOR_ADDR).unwrap().value
}

pub fn assert_invariants(v: &VM) {
    check_state_invariants(v, None).unwrap().assert_empty();
}
