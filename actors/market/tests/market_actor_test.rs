// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_core_actor_market::testing::check_state_invariants;
use fil_core_actor_market::{Actor as MarketActor, BalanceTable, Method, State};
use fil_core_runtime::test_utils::*;
use fil_core_runtime::{
    Type, CRON_ACTOR_ADDR, STORAGE_MARKET_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::Address;
use fvm_shared::clock::EPOCH_UNDEFINED;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::METHOD_CONSTRUCTOR;
use test_case::test_case;

const OWNER: Address = Address::new_id(101);

fn check_state(rt: &MockRuntime) {
    let (_, acc) = check_state_invariants(&rt.get_state(), &*rt.store).unwrap();
    acc.assert_empty();
}

fn setup() -> MockRuntime {
    let rt = MockRuntime::new(STORAGE_MARKET_ACTOR_ADDR);
    rt.set_caller(Type::System.code_cid(), SYSTEM_ACTOR_ADDR);
    rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
    let ret = rt.call::<MarketActor>(METHOD_CONSTRUCTOR, None).unwrap();
    expect_empty(ret);
    rt.verify();
    rt
}

fn add_balance(rt: &MockRuntime, who: &Address, amount: u64) -> Result<(), fil_core_runtime::ActorError> {
    rt.set_caller(Type::Account.code_cid(), OWNER);
    rt.set_received(TokenAmount::from_atto(amount));
    rt.expect_validate_caller_any();
    let ret = rt.call::<MarketActor>(
        Method::AddBalance as u64,
        IpldBlock::serialize_cbor(who).unwrap(),
    );
    rt.verify();
    ret.map(expect_empty)
}

fn escrow_balance(rt: &MockRuntime, who: &Address) -> TokenAmount {
    let st: State = rt.get_state();
    BalanceTable::from_root(&*rt.store, &st.escrow_table, "escrow table")
        .unwrap()
        .get(who)
        .unwrap()
}

#[test]
fn constructor_starts_empty() {
    let rt = setup();
    let st: State = rt.get_state();
    assert_eq!(0, st.next_id);
    assert_eq!(EPOCH_UNDEFINED, st.last_cron);
    assert_eq!(st.escrow_table, st.locked_table);
    check_state(&rt);
}

#[test]
fn constructor_rejects_non_system_caller() {
    let rt = MockRuntime::new(STORAGE_MARKET_ACTOR_ADDR);
    rt.set_caller(Type::Account.code_cid(), OWNER);
    rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
    expect_abort(ExitCode::USR_FORBIDDEN, rt.call::<MarketActor>(METHOD_CONSTRUCTOR, None));
    assert!(rt.get_state_root().is_none());
}

#[test]
fn add_balance_accumulates_escrow() {
    let rt = setup();
    add_balance(&rt, &OWNER, 10).unwrap();
    add_balance(&rt, &OWNER, 5).unwrap();
    assert_eq!(TokenAmount::from_atto(15), escrow_balance(&rt, &OWNER));
    check_state(&rt);
}

#[test]
fn add_balance_resolves_robust_address() {
    let rt = setup();
    let robust = new_bls_addr(1);
    rt.add_id_address(robust, OWNER);

    add_balance(&rt, &robust, 7).unwrap();
    assert_eq!(TokenAmount::from_atto(7), escrow_balance(&rt, &OWNER));
}

#[test]
fn add_balance_to_unknown_address() {
    let rt = setup();
    let err = add_balance(&rt, &new_bls_addr(2), 7).unwrap_err();
    assert_eq!(ExitCode::USR_NOT_FOUND, err.exit_code());
}

#[test]
fn add_balance_requires_value() {
    let rt = setup();
    let before = rt.get_state_root();
    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        "balance to add must be greater than zero",
        add_balance(&rt, &OWNER, 0),
    );
    assert_eq!(before, rt.get_state_root());
}

#[test]
fn cron_tick_clears_due_deal_ops() {
    let rt = setup();
    let mut st: State = rt.get_state();
    st.put_deal_op(&*rt.store, 5, 0).unwrap();
    st.put_deal_op(&*rt.store, 50, 1).unwrap();
    rt.replace_state(&st);

    rt.set_epoch(10);
    rt.set_caller(Type::Cron.code_cid(), CRON_ACTOR_ADDR);
    rt.expect_validate_caller_addr(vec![CRON_ACTOR_ADDR]);
    expect_empty(rt.call::<MarketActor>(Method::CronTick as u64, None).unwrap());
    rt.verify();

    let st: State = rt.get_state();
    assert_eq!(10, st.last_cron);
    let ops = st.load_deal_ops(&*rt.store).unwrap();
    assert!(ops.get(&fil_core_actor_market::EpochKey(5)).unwrap().is_none());
    assert!(ops.get(&fil_core_actor_market::EpochKey(50)).unwrap().is_some());
}

#[test_case(SYSTEM_ACTOR_ADDR, Type::System; "system")]
#[test_case(OWNER, Type::Account; "account")]
fn cron_tick_rejects_other_callers(caller: Address, caller_type: Type) {
    let rt = setup();
    rt.set_caller(caller_type.code_cid(), caller);
    rt.expect_validate_caller_addr(vec![CRON_ACTOR_ADDR]);
    expect_abort(ExitCode::USR_FORBIDDEN, rt.call::<MarketActor>(Method::CronTick as u64, None));
}

#[test]
fn unknown_method() {
    let rt = setup();
    expect_abort(ExitCode::USR_UNHANDLED_MESSAGE, rt.call::<MarketActor>(77, None));
}
