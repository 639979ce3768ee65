// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_core_runtime::{Type, CHAOS_ACTOR_ADDR, CRON_ACTOR_ADDR, INIT_ACTOR_ADDR, SYSTEM_ACTOR_ADDR};
use fil_core_vm::actors::chaos::{
    AbortWithArgs, CallerValidationArgs, CallerValidationBranch, CreateActorArgs,
    InspectRuntimeReturn, Method as ChaosMethod, MutateStateArgs, MutateStateBranch,
    ResolveAddressResponse, SendArgs,
};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::{METHOD_CONSTRUCTOR, METHOD_SEND};
use num_traits::Zero;
use test_case::test_case;

mod util;
use util::*;

fn mutate(value: &str, branch: MutateStateBranch) -> Option<MutateStateArgs> {
    Some(MutateStateArgs { value: value.to_string(), branch })
}

#[test]
fn mutation_in_transaction_persists() {
    let (v, accts) = setup_chaos(1);
    apply_ok(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::MutateState as u64,
        mutate("persisted", MutateStateBranch::InTransaction),
    );
    assert_eq!("persisted", chaos_value(&v));
}

#[test_case(MutateStateBranch::TransactionThenAbort, ExitCode::USR_ILLEGAL_ARGUMENT; "abort inside transaction")]
#[test_case(MutateStateBranch::AcquireThenAbort, ExitCode::USR_ILLEGAL_STATE; "abort holding handle")]
#[test_case(MutateStateBranch::ReleaseChanged, ExitCode::SYS_ASSERTION_FAILED; "release with changed root")]
#[test_case(MutateStateBranch::LeaveUnresolved, ExitCode::SYS_ASSERTION_FAILED; "handle left unresolved")]
#[test_case(MutateStateBranch::SendWhileHeld, ExitCode::SYS_ASSERTION_FAILED; "send holding handle")]
fn failed_mutation_leaves_state(branch: MutateStateBranch, code: ExitCode) {
    let (v, accts) = setup_chaos(1);
    apply_ok(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::MutateState as u64,
        mutate("before", MutateStateBranch::InTransaction),
    );

    let value = TokenAmount::from_atto(500);
    let balance = v.balance(&accts[0]).unwrap();
    apply_code(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &value,
        ChaosMethod::MutateState as u64,
        mutate("after", branch),
        code,
    );
    assert_eq!("before", chaos_value(&v));
    assert_eq!(balance, v.balance(&accts[0]).unwrap());
    assert_eq!(TokenAmount::zero(), v.balance(&CHAOS_ACTOR_ADDR).unwrap());
}

#[test]
fn method_must_validate_caller() {
    let (v, accts) = setup_chaos(1);
    let res = apply_code(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::CallerValidation as u64,
        Some(CallerValidationArgs {
            branch: CallerValidationBranch::None,
            addrs: vec![],
            types: vec![],
        }),
        ExitCode::SYS_ASSERTION_FAILED,
    );
    assert!(res.message.contains("without validating caller"), "{}", res.message);
}

#[test]
fn caller_validated_at_most_once() {
    let (v, accts) = setup_chaos(1);
    apply_code(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::CallerValidation as u64,
        Some(CallerValidationArgs {
            branch: CallerValidationBranch::Twice,
            addrs: vec![],
            types: vec![],
        }),
        ExitCode::SYS_ASSERTION_FAILED,
    );
}

#[test]
fn caller_validation_by_address() {
    let (v, accts) = setup_chaos(2);
    let validate = |addrs: Vec<Address>, code| {
        apply_code(
            &v,
            &accts[0],
            &CHAOS_ACTOR_ADDR,
            &TokenAmount::zero(),
            ChaosMethod::CallerValidation as u64,
            Some(CallerValidationArgs { branch: CallerValidationBranch::IsAddress, addrs, types: vec![] }),
            code,
        );
    };
    validate(vec![], ExitCode::USR_FORBIDDEN);
    validate(vec![accts[1]], ExitCode::USR_FORBIDDEN);
    validate(vec![accts[1], accts[0]], ExitCode::OK);
}

#[test_case(vec![Type::Account], ExitCode::OK; "account caller accepted")]
#[test_case(vec![Type::Miner, Type::Power], ExitCode::USR_FORBIDDEN; "other types rejected")]
#[test_case(vec![], ExitCode::USR_FORBIDDEN; "empty set rejects all")]
fn caller_validation_by_type(types: Vec<Type>, code: ExitCode) {
    let (v, accts) = setup_chaos(1);
    apply_code(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::CallerValidation as u64,
        Some(CallerValidationArgs { branch: CallerValidationBranch::IsType, addrs: vec![], types }),
        code,
    );
}

#[test]
fn nested_send_commits_with_caller() {
    let (v, accts) = setup_chaos(2);
    let value = TokenAmount::from_atto(1_000);
    let before = v.balance(&accts[1]).unwrap();
    apply_ok(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &value,
        ChaosMethod::Send as u64,
        Some(SendArgs { to: accts[1], method: METHOD_SEND, params: None, value: value.clone() }),
    );
    assert_eq!(before + &value, v.balance(&accts[1]).unwrap());
    assert_eq!(TokenAmount::zero(), v.balance(&CHAOS_ACTOR_ADDR).unwrap());
}

#[test]
fn nested_abort_unwinds_every_effect() {
    let (v, accts) = setup_chaos(1);
    let value = TokenAmount::from_atto(1_000);
    let balance = v.balance(&accts[0]).unwrap();
    let root = v.state_root().unwrap();

    // The nested call records a mutation and then aborts on its own.
    let inner = IpldBlock::serialize_cbor(&AbortWithArgs {
        code: ExitCode::USR_ILLEGAL_STATE,
        message: "inner abort".to_string(),
    })
    .unwrap();
    let res = apply_code(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &value,
        ChaosMethod::Send as u64,
        Some(SendArgs {
            to: CHAOS_ACTOR_ADDR,
            method: ChaosMethod::AbortWith as u64,
            params: inner,
            value: value.clone(),
        }),
        ExitCode::USR_ILLEGAL_STATE,
    );
    assert_eq!("inner abort", res.message);
    assert_eq!(balance, v.balance(&accts[0]).unwrap());
    // Only the sender's call sequence moved.
    let seq = v.actor(&accts[0]).unwrap().unwrap().call_seq;
    assert_eq!(1, seq);
    assert_ne!(root, v.state_root().unwrap());
}

#[test]
fn only_cron_may_catch_send_errors() {
    let (v, accts) = setup_chaos(1);
    let res = apply_code(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::SendCatching as u64,
        Some(SendArgs {
            to: CHAOS_ACTOR_ADDR,
            method: ChaosMethod::AbortWith as u64,
            params: IpldBlock::serialize_cbor(&AbortWithArgs {
                code: ExitCode::USR_ILLEGAL_STATE,
                message: "caught?".to_string(),
            })
            .unwrap(),
            value: TokenAmount::zero(),
        }),
        ExitCode::USR_FORBIDDEN,
    );
    assert!(res.message.contains("only the cron actor"), "{}", res.message);
}

#[test]
fn only_init_may_create_actors() {
    let (v, accts) = setup_chaos(1);
    apply_code(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::CreateActor as u64,
        Some(CreateActorArgs {
            code: Type::Account.code_cid(),
            address: Address::new_id(5_000),
        }),
        ExitCode::USR_FORBIDDEN,
    );
    assert!(v.actor(&Address::new_id(5_000)).unwrap().is_none());
}

#[test]
fn actor_may_not_delete_another() {
    let (v, accts) = setup_chaos(1);
    apply_code(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::DeleteActor as u64,
        Some(accts[0]),
        ExitCode::USR_FORBIDDEN,
    );
    assert!(v.actor(&accts[0]).unwrap().is_some());
}

#[test]
fn actor_may_delete_itself() {
    let (v, accts) = setup_chaos(1);
    apply_ok(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::DeleteActor as u64,
        Some(CHAOS_ACTOR_ADDR),
    );
    assert!(v.actor(&CHAOS_ACTOR_ADDR).unwrap().is_none());
}

#[test]
fn resolve_address_through_init() {
    let (v, accts) = setup_chaos(1);
    let key = v.get_state::<fil_core_vm::actors::account::State>(&accts[0]).unwrap().address;

    let res = apply_ok(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::ResolveAddress as u64,
        Some(key),
    );
    let resolved: ResolveAddressResponse = res.ret.unwrap().deserialize().unwrap();
    assert_eq!(ResolveAddressResponse { id: accts[0].id().unwrap(), success: true }, resolved);

    let unknown = Address::new_secp256k1(&[7u8; 65]).unwrap();
    let res = apply_ok(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::ResolveAddress as u64,
        Some(unknown),
    );
    let resolved: ResolveAddressResponse = res.ret.unwrap().deserialize().unwrap();
    assert_eq!(ResolveAddressResponse { id: 0, success: false }, resolved);
}

#[test]
fn inspect_runtime() {
    let (v, accts) = setup_chaos(1);
    v.set_epoch(42);
    v.set_block_winner(accts[0]);
    let value = TokenAmount::from_atto(3);
    let res = apply_ok(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &value,
        ChaosMethod::InspectRuntime as u64,
        None::<()>,
    );
    let ret: InspectRuntimeReturn = res.ret.unwrap().deserialize().unwrap();
    assert_eq!(accts[0], ret.caller);
    assert_eq!(CHAOS_ACTOR_ADDR, ret.receiver);
    assert_eq!(value, ret.value_received);
    assert_eq!(value, ret.current_balance);
    assert_eq!(42, ret.curr_epoch);
    assert_eq!(accts[0], ret.block_winner);
    assert_eq!("", ret.state.value);

    // Randomness depends only on the seed and the epoch.
    let again = apply_ok(
        &v,
        &accts[0],
        &CHAOS_ACTOR_ADDR,
        &TokenAmount::zero(),
        ChaosMethod::InspectRuntime as u64,
        None::<()>,
    );
    let again: InspectRuntimeReturn = again.ret.unwrap().deserialize().unwrap();
    assert_eq!(ret.randomness, again.randomness);
}

#[test]
fn constructors_only_from_system() {
    let (v, accts) = setup_chaos(1);
    for target in [INIT_ACTOR_ADDR, CRON_ACTOR_ADDR, CHAOS_ACTOR_ADDR] {
        apply_code(
            &v,
            &accts[0],
            &target,
            &TokenAmount::zero(),
            METHOD_CONSTRUCTOR,
            None::<()>,
            ExitCode::USR_FORBIDDEN,
        );
    }
    // The system actor constructing again finds state already present.
    let res = v
        .execute_message_implicit(
            &SYSTEM_ACTOR_ADDR,
            &CHAOS_ACTOR_ADDR,
            TokenAmount::zero(),
            METHOD_CONSTRUCTOR,
            None,
        )
        .unwrap();
    assert_eq!(ExitCode::USR_ILLEGAL_STATE, res.code);
}
