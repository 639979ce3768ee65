// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_core_actor_init::{ExecParams, ExecReturn, Method as InitMethod};
use fil_core_runtime::runtime::{ActorCode, Runtime};
use fil_core_runtime::{
    actor_error, decode_params, ActorError, Type, CRON_ACTOR_ADDR, INIT_ACTOR_ADDR,
    SYSTEM_ACTOR_ADDR,
};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::clock::{ChainEpoch, EPOCH_UNDEFINED};
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::miner;

/// Storage power actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    CreateMiner = 2,
    OnEpochTickEnd = 5,
    DeleteMiner = 7,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct State {
    pub miner_count: u64,
    pub miners: Vec<Address>,
    pub last_processed_cron_epoch: ChainEpoch,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct CreateMinerParams {
    pub owner: Address,
}

pub type CreateMinerReturn = ExecReturn;

/// Storage Power Actor
pub struct Actor;

impl Actor {
    /// Constructor for StoragePower actor
    fn constructor(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;
        rt.create(&State {
            miner_count: 0,
            miners: vec![],
            last_processed_cron_epoch: EPOCH_UNDEFINED,
        })?;
        Ok(())
    }

    /// Creates a storage miner through the init actor, forwarding the value received.
    fn create_miner(
        rt: &impl Runtime,
        args: Option<IpldBlock>,
    ) -> Result<CreateMinerReturn, ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Account))?;
        let params: CreateMinerParams = decode_params!(args);

        let ctor_params = RawBytes::serialize(miner::ConstructorParams { owner: params.owner })?;
        let ret: ExecReturn = rt
            .send(
                &INIT_ACTOR_ADDR,
                InitMethod::Exec as u64,
                IpldBlock::serialize_cbor(&ExecParams {
                    code_cid: rt.get_code_cid_for_type(Type::Miner),
                    constructor_params: ctor_params,
                })?,
                rt.message().value_received(),
            )?
            .ok_or_else(|| actor_error!(illegal_state; "init exec returned nothing"))?
            .deserialize()?;

        rt.transaction(|st: &mut State, _| {
            st.miner_count += 1;
            st.miners.push(ret.id_address);
            Ok(())
        })?;
        Ok(ret)
    }

    fn on_epoch_tick_end(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&CRON_ACTOR_ADDR))?;
        let epoch = rt.curr_epoch();
        rt.transaction(|st: &mut State, _| {
            st.last_processed_cron_epoch = epoch;
            Ok(())
        })
    }

    /// Removes a miner from the power table and deletes the miner actor.
    fn delete_miner(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        rt.validate_immediate_caller_type(std::iter::once(&Type::Account))?;
        let miner: Address = decode_params!(args);
        let miner = rt
            .resolve_address(&miner)
            .map(Address::new_id)
            .ok_or_else(|| actor_error!(not_found; "unknown miner {}", miner))?;

        rt.transaction(|st: &mut State, _| {
            let before = st.miners.len();
            st.miners.retain(|m| *m != miner);
            if st.miners.len() == before {
                return Err(actor_error!(not_found; "miner {} is not registered", miner));
            }
            st.miner_count -= 1;
            Ok(())
        })?;
        rt.delete_actor(&miner)
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "StoragePower"
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
                Self::constructor(rt)?;
                Ok(None)
            }
            Some(Method::CreateMiner) => {
                let res = Self::create_miner(rt, args)?;
                Ok(IpldBlock::serialize_cbor(&res)?)
            }
            Some(Method::OnEpochTickEnd) => {
                Self::on_epoch_tick_end(rt)?;
                Ok(None)
            }
            Some(Method::DeleteMiner) => {
                Self::delete_miner(rt, args)?;
                Ok(None)
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
