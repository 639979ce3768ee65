// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_core_runtime::runtime::{ActorCode, Runtime};
use fil_core_runtime::{actor_error, decode_params, ActorError, INIT_ACTOR_ADDR};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Storage miner actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    ControlAddresses = 2,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct ConstructorParams {
    pub owner: Address,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct State {
    pub owner: Address,
}

/// Storage miner actor. Only tracks its owner.
pub struct Actor;

impl Actor {
    pub fn constructor(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&INIT_ACTOR_ADDR))?;
        let params: ConstructorParams = decode_params!(args);
        let owner = rt
            .resolve_address(&params.owner)
            .map(Address::new_id)
            .ok_or_else(|| actor_error!(illegal_argument; "unable to resolve owner {}", params.owner))?;
        rt.create(&State { owner })
    }

    pub fn control_addresses(rt: &impl Runtime) -> Result<Address, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let st: State = rt.state()?;
        Ok(st.owner)
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "StorageMiner"
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
            Some(Method::ControlAddresses) => {
                let owner = Self::control_addresses(rt)?;
                Ok(IpldBlock::serialize_cbor(&owner)?)
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
