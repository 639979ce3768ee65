// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_core_actor_init::testing::check_state_invariants;
use fil_core_actor_init::{Actor as InitActor, ConstructorParams, ExecParams, ExecReturn, Method, State};
use fil_core_runtime::test_utils::*;
use fil_core_runtime::{
    ActorError, Type, INIT_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::METHOD_CONSTRUCTOR;
use serde::Serialize;
use test_case::test_case;

fn check_state(rt: &MockRuntime) {
    let (_, acc) = check_state_invariants(&rt.get_state(), &*rt.store);
    acc.assert_empty();
}

fn construct_runtime() -> MockRuntime {
    let rt = MockRuntime::new(INIT_ACTOR_ADDR);
    rt.set_caller(Type::System.code_cid(), SYSTEM_ACTOR_ADDR);
    rt
}

fn construct_and_verify(rt: &MockRuntime) {
    rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
    let params = ConstructorParams { network_name: "mock".to_string() };
    let ret = rt
        .call::<InitActor>(
            METHOD_CONSTRUCTOR,
            IpldBlock::serialize_cbor(&params).unwrap(),
        )
        .unwrap();
    assert!(ret.is_none());
    rt.verify();

    let state: State = rt.get_state();
    assert_eq!(100, state.next_id);
    assert_eq!("mock", state.network_name);
    check_state(rt);
}

fn exec_and_verify<S: Serialize>(
    rt: &MockRuntime,
    code_id: cid::Cid,
    params: &S,
) -> Result<ExecReturn, ActorError> {
    rt.expect_validate_caller_any();
    let exec_params = ExecParams {
        code_cid: code_id,
        constructor_params: RawBytes::serialize(params).unwrap(),
    };
    let ret = rt.call::<InitActor>(
        Method::Exec as u64,
        IpldBlock::serialize_cbor(&exec_params).unwrap(),
    );
    rt.verify();
    ret.map(|r| r.unwrap().deserialize().unwrap())
}

fn fake_params() -> ConstructorParams {
    ConstructorParams { network_name: String::from("fake_param") }
}

#[test]
fn constructor_sets_first_id() {
    let rt = construct_runtime();
    construct_and_verify(&rt);
}

#[test]
fn constructor_rejects_non_system_caller() {
    let rt = construct_runtime();
    rt.set_caller(Type::Account.code_cid(), Address::new_id(1000));
    rt.expect_validate_caller_addr(vec![SYSTEM_ACTOR_ADDR]);
    let params = ConstructorParams { network_name: "mock".to_string() };
    expect_abort(
        ExitCode::USR_FORBIDDEN,
        rt.call::<InitActor>(METHOD_CONSTRUCTOR, IpldBlock::serialize_cbor(&params).unwrap()),
    );
    rt.verify();
    assert!(rt.get_state_root().is_none());
}

#[test_case(Type::Account; "account caller")]
#[test_case(Type::Power; "power caller")]
#[test_case(Type::Miner; "miner caller")]
#[test_case(Type::System; "system caller")]
fn exec_never_creates_accounts(caller_type: Type) {
    let rt = construct_runtime();
    construct_and_verify(&rt);
    rt.set_caller(caller_type.code_cid(), Address::new_id(1001));

    expect_abort(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        exec_and_verify(&rt, Type::Account.code_cid(), &fake_params()),
    );
    assert_eq!(100, rt.get_state::<State>().next_id);
}

#[test_case(Type::Account; "account caller")]
#[test_case(Type::Miner; "miner caller")]
#[test_case(Type::Init; "init caller")]
fn only_power_creates_miners(caller_type: Type) {
    let rt = construct_runtime();
    construct_and_verify(&rt);
    rt.set_caller(caller_type.code_cid(), Address::new_id(1001));

    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        "cannot exec actor type",
        exec_and_verify(&rt, Type::Miner.code_cid(), &fake_params()),
    );
    check_state(&rt);
}

#[test_case(Type::Cron; "cron")]
#[test_case(Type::Market; "market")]
#[test_case(Type::Init; "init")]
fn exec_rejects_other_types(exec_type: Type) {
    let rt = construct_runtime();
    construct_and_verify(&rt);
    rt.set_caller(Type::Power.code_cid(), STORAGE_POWER_ACTOR_ADDR);

    expect_abort(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        exec_and_verify(&rt, exec_type.code_cid(), &fake_params()),
    );
}

#[test]
fn create_2_payment_channels() {
    let rt = construct_runtime();
    construct_and_verify(&rt);
    let anne = Address::new_id(1001);
    rt.set_caller(Type::Account.code_cid(), anne);

    for n in 0..2 {
        let paych = format!("paych_{}", n);

        rt.set_balance(TokenAmount::from_atto(100));
        rt.set_received(TokenAmount::from_atto(100));

        let unique_address = Address::new_actor(paych.as_bytes());
        rt.new_actor_addr.replace(Some(unique_address));

        let expected_id_addr = Address::new_id(100 + n);
        rt.expect_create_actor(Type::PaymentChannel.code_cid(), expected_id_addr);

        // the value received by exec is forwarded to the new actor's constructor
        rt.expect_send(
            expected_id_addr,
            METHOD_CONSTRUCTOR,
            IpldBlock::serialize_cbor(&fake_params()).unwrap(),
            TokenAmount::from_atto(100),
            None,
            ExitCode::OK,
        );

        let exec_ret =
            exec_and_verify(&rt, Type::PaymentChannel.code_cid(), &fake_params()).unwrap();
        assert_eq!(unique_address, exec_ret.robust_address, "Robust Address does not match");
        assert_eq!(expected_id_addr, exec_ret.id_address, "Id address does not match");

        let state: State = rt.get_state();
        let returned_address = state
            .resolve_address(&*rt.store, &unique_address)
            .expect("Resolve should not error")
            .expect("Address should be able to be resolved");
        assert_eq!(returned_address, expected_id_addr, "Wrong Address returned");
        check_state(&rt);
    }
}

#[test]
fn create_storage_miner() {
    let rt = construct_runtime();
    construct_and_verify(&rt);

    // only the storage power actor can create a miner
    rt.set_caller(Type::Power.code_cid(), STORAGE_POWER_ACTOR_ADDR);

    let unique_address = Address::new_actor(b"miner");
    rt.new_actor_addr.replace(Some(unique_address));

    let expected_id_addr = Address::new_id(100);
    rt.expect_create_actor(Type::Miner.code_cid(), expected_id_addr);
    rt.expect_send(
        expected_id_addr,
        METHOD_CONSTRUCTOR,
        IpldBlock::serialize_cbor(&fake_params()).unwrap(),
        TokenAmount::default(),
        None,
        ExitCode::OK,
    );

    let exec_ret = exec_and_verify(&rt, Type::Miner.code_cid(), &fake_params()).unwrap();
    assert_eq!(unique_address, exec_ret.robust_address);
    assert_eq!(expected_id_addr, exec_ret.id_address);

    let state: State = rt.get_state();
    let returned_address = state
        .resolve_address(&*rt.store, &unique_address)
        .expect("Resolve should not error")
        .expect("Address should be able to be resolved");
    assert_eq!(expected_id_addr, returned_address);

    // an address that was never mapped does not resolve
    let unknown_addr = Address::new_actor(b"flurbo");
    assert!(state.resolve_address(&*rt.store, &unknown_addr).unwrap().is_none());
    check_state(&rt);
}

#[test]
fn empty_constructor_params_send_nothing() {
    let rt = construct_runtime();
    construct_and_verify(&rt);
    rt.set_caller(Type::Account.code_cid(), Address::new_id(1001));
    rt.new_actor_addr.replace(Some(Address::new_actor(b"paych")));

    rt.expect_create_actor(Type::PaymentChannel.code_cid(), Address::new_id(100));
    rt.expect_send(
        Address::new_id(100),
        METHOD_CONSTRUCTOR,
        None,
        TokenAmount::default(),
        None,
        ExitCode::OK,
    );

    rt.expect_validate_caller_any();
    let exec_params =
        ExecParams { code_cid: Type::PaymentChannel.code_cid(), constructor_params: RawBytes::default() };
    rt.call::<InitActor>(Method::Exec as u64, IpldBlock::serialize_cbor(&exec_params).unwrap())
        .unwrap();
    rt.verify();
}

#[test]
fn ids_are_strictly_increasing() {
    let rt = construct_runtime();
    construct_and_verify(&rt);
    rt.set_caller(Type::Account.code_cid(), Address::new_id(1001));

    let mut allocated = Vec::new();
    for n in 0..5u8 {
        let robust = Address::new_actor(&[n]);
        rt.new_actor_addr.replace(Some(robust));
        let id_addr = Address::new_id(100 + n as u64);
        rt.expect_create_actor(Type::PaymentChannel.code_cid(), id_addr);
        rt.expect_send(id_addr, METHOD_CONSTRUCTOR, None, TokenAmount::default(), None, ExitCode::OK);

        rt.expect_validate_caller_any();
        let exec_params = ExecParams {
            code_cid: Type::PaymentChannel.code_cid(),
            constructor_params: RawBytes::default(),
        };
        let ret: ExecReturn = rt
            .call::<InitActor>(
                Method::Exec as u64,
                IpldBlock::serialize_cbor(&exec_params).unwrap(),
            )
            .unwrap()
            .unwrap()
            .deserialize()
            .unwrap();
        rt.verify();
        allocated.push((robust, ret.id_address.id().unwrap()));
    }

    assert!(allocated.windows(2).all(|w| w[0].1 < w[1].1));

    // earlier mappings still resolve to the same IDs
    let state: State = rt.get_state();
    for (robust, id) in allocated {
        assert_eq!(
            Some(Address::new_id(id)),
            state.resolve_address(&*rt.store, &robust).unwrap()
        );
    }
    check_state(&rt);
}

#[test]
fn sending_constructor_failure() {
    let rt = construct_runtime();
    construct_and_verify(&rt);

    // Only the storage power actor can create a miner
    rt.set_caller(Type::Power.code_cid(), STORAGE_POWER_ACTOR_ADDR);

    let unique_address = Address::new_actor(b"miner");
    rt.new_actor_addr.replace(Some(unique_address));

    let expected_id_addr = Address::new_id(100);
    rt.expect_create_actor(Type::Miner.code_cid(), expected_id_addr);
    rt.expect_send(
        expected_id_addr,
        METHOD_CONSTRUCTOR,
        IpldBlock::serialize_cbor(&fake_params()).unwrap(),
        TokenAmount::default(),
        None,
        ExitCode::USR_ILLEGAL_STATE,
    );

    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_STATE,
        "constructor failed",
        exec_and_verify(&rt, Type::Miner.code_cid(), &fake_params()),
    );

    // the ID allocation was rolled back with the abort
    let state: State = rt.get_state();
    assert_eq!(100, state.next_id);
    assert!(state.resolve_address(&*rt.store, &unique_address).unwrap().is_none());
    check_state(&rt);
}

#[test]
fn repeated_robust_address() {
    let rt = construct_runtime();
    construct_and_verify(&rt);
    rt.set_caller(Type::Account.code_cid(), Address::new_id(1234));

    let unique_address = Address::new_actor(b"paych");
    rt.new_actor_addr.replace(Some(unique_address));
    rt.expect_create_actor(Type::PaymentChannel.code_cid(), Address::new_id(100));
    rt.expect_send(
        Address::new_id(100),
        METHOD_CONSTRUCTOR,
        IpldBlock::serialize_cbor(&fake_params()).unwrap(),
        TokenAmount::default(),
        None,
        ExitCode::OK,
    );
    exec_and_verify(&rt, Type::PaymentChannel.code_cid(), &fake_params()).unwrap();

    // Simulate repeated robust address, as it could be a case with predictable address generation
    rt.new_actor_addr.replace(Some(unique_address));
    expect_abort(
        ExitCode::USR_FORBIDDEN,
        exec_and_verify(&rt, Type::PaymentChannel.code_cid(), &fake_params()),
    );
    assert_eq!(101, rt.get_state::<State>().next_id);
}

#[test]
fn unknown_method() {
    let rt = construct_runtime();
    construct_and_verify(&rt);
    expect_abort(ExitCode::USR_UNHANDLED_MESSAGE, rt.call::<InitActor>(99, None));
}

#[test]
fn exec_requires_params() {
    let rt = construct_runtime();
    construct_and_verify(&rt);
    rt.set_caller(Type::Account.code_cid(), Address::new_id(1001));
    rt.expect_validate_caller_any();
    expect_abort(ExitCode::USR_ILLEGAL_ARGUMENT, rt.call::<InitActor>(Method::Exec as u64, None));
    rt.verify();
}
