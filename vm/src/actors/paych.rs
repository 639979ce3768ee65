// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_core_runtime::runtime::{ActorCode, Runtime};
use fil_core_runtime::{actor_error, decode_params, ActorError, Type};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Payment Channel actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    Collect = 4,
}

/// Constructor parameters for payment channel actor
#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct ConstructorParams {
    pub from: Address,
    pub to: Address,
}

/// A given payment channel actor is established by `from`
/// to enable off-chain micro-transactions to `to` address
/// to be reconciled and tallied on chain.
#[derive(Debug, Serialize_tuple, Deserialize_tuple, Clone)]
pub struct State {
    pub from: Address,
    pub to: Address,
}

/// Payment Channel actor
pub struct Actor;

impl Actor {
    /// Constructor for Payment channel actor
    pub fn constructor(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        // Only InitActor can create a payment channel actor. It creates the actor on
        // behalf of the payer/payee.
        rt.validate_immediate_caller_type(std::iter::once(&Type::Init))?;
        let params: ConstructorParams = decode_params!(args);

        let from = resolve_account(rt, &params.from)?;
        let to = resolve_account(rt, &params.to)?;
        rt.create(&State { from, to })?;
        Ok(())
    }

    /// Pays the whole balance out to the payee and deletes the channel.
    pub fn collect(rt: &impl Runtime) -> Result<(), ActorError> {
        let st: State = rt.state()?;
        rt.validate_immediate_caller_is([&st.from, &st.to])?;

        rt.send_funds(&st.to, rt.current_balance())?;
        rt.delete_actor(&rt.message().receiver())?;
        Ok(())
    }
}

/// Resolves an address to the ID address of an existing account actor.
fn resolve_account(rt: &impl Runtime, raw: &Address) -> Result<Address, ActorError> {
    let resolved = rt
        .resolve_address(raw)
        .map(Address::new_id)
        .ok_or_else(|| actor_error!(illegal_argument; "failed to resolve address {}", raw))?;
    let code_cid = rt
        .get_actor_code_cid(&resolved)
        .ok_or_else(|| actor_error!(illegal_argument; "no code for address {}", resolved))?;
    if rt.resolve_builtin_actor_type(&code_cid) != Some(Type::Account) {
        return Err(actor_error!(forbidden; "actor {} must be an account, was {}", raw, code_cid));
    }
    Ok(resolved)
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "PaymentChannel"
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
            Some(Method::Collect) => {
                Self::collect(rt)?;
                Ok(None)
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
