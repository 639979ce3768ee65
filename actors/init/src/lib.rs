// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fil_core_runtime::runtime::{ActorCode, Runtime};
use fil_core_runtime::{actor_error, decode_params, ActorError, Type, SYSTEM_ACTOR_ADDR};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::{RawBytes, DAG_CBOR};
use fvm_shared::address::Address;
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub use self::state::State;
pub use self::types::*;

mod state;
pub mod testing;
mod types;

/// Init actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    Exec = 2,
}

/// Init actor
pub struct Actor;

impl Actor {
    /// Init actor constructor
    pub fn constructor(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;
        let params: ConstructorParams = decode_params!(args);
        let state = State::new(rt.store(), params.network_name)?;
        rt.create(&state)?;
        Ok(())
    }

    /// Exec init actor
    pub fn exec(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<ExecReturn, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: ExecParams = decode_params!(args);

        log::trace!("called exec; params.code_cid: {:?}", &params.code_cid);

        let caller = rt.message().caller();
        let caller_code = rt.get_actor_code_cid(&caller).ok_or_else(|| {
            actor_error!(assertion_failed; "no code for caller at {}", caller)
        })?;
        if !can_exec(rt, &caller_code, &params.code_cid) {
            return Err(actor_error!(illegal_argument;
                    "called type {} cannot exec actor type {}",
                    &caller_code, &params.code_cid
            ));
        }

        // Compute a re-org-stable address.
        // This address exists for use by messages coming from outside the system, in order to
        // stably address the newly created actor even if a chain re-org causes it to end up with
        // a different ID.
        let robust_address = rt.new_actor_address()?;

        // Allocate an ID for this actor.
        // Store mapping of pubkey or actor address to actor ID
        let id = rt.transaction(|s: &mut State, rt| {
            s.map_address_to_new_id(rt.store(), &robust_address)
        })?;
        let id_address = Address::new_id(id);

        // Create an empty actor
        rt.create_actor(params.code_cid, &id_address)?;

        log::debug!("created actor {} at {} with code {}", robust_address, id_address, params.code_cid);

        // Invoke constructor. An abort here aborts the exec too.
        rt.send(
            &id_address,
            METHOD_CONSTRUCTOR,
            constructor_block(params.constructor_params),
            rt.message().value_received(),
        )
        .map_err(|err| err.wrap("constructor failed"))?;

        Ok(ExecReturn { id_address, robust_address })
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "Init"
    }

    fn invoke_method<RT>(
        rt: &RT,
        method: MethodNum,
        args: Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError>
    where
        RT: Runtime,
        RT::Blockstore: Clone,
    {
        match FromPrimitive::from_u64(method) {
            Some(Method::Constructor) => {
                Self::constructor(rt, args)?;
                Ok(None)
            }
            Some(Method::Exec) => {
                let res = Self::exec(rt, args)?;
                Ok(IpldBlock::serialize_cbor(&res)?)
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}

/// Account actors are created implicitly by value transfer and never through exec.
/// Payment channels may be created by anyone, miners only by the storage power actor.
fn can_exec(rt: &impl Runtime, caller: &Cid, exec: &Cid) -> bool {
    rt.resolve_builtin_actor_type(exec)
        .map(|typ| match typ {
            Type::PaymentChannel => true,
            Type::Miner if rt.resolve_builtin_actor_type(caller) == Some(Type::Power) => true,
            _ => false,
        })
        .unwrap_or(false)
}

fn constructor_block(params: RawBytes) -> Option<IpldBlock> {
    if params.bytes().is_empty() {
        None
    } else {
        Some(IpldBlock { codec: DAG_CBOR, data: params.bytes().to_vec() })
    }
}
