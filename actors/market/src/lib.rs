// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_core_runtime::runtime::{ActorCode, Runtime};
use fil_core_runtime::{
    actor_error, decode_params, resolve_to_actor_id, ActorError, CRON_ACTOR_ADDR,
    SYSTEM_ACTOR_ADDR,
};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR};
use num_derive::FromPrimitive;
use num_traits::{FromPrimitive, Zero};

pub use self::balance_table::BalanceTable;
pub use self::deal::*;
pub use self::state::*;

mod balance_table;
mod deal;
mod state;
pub mod testing;

/// Market actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    AddBalance = 2,
    CronTick = 9,
}

/// Market Actor
pub struct Actor;

impl Actor {
    fn constructor(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;
        let st = State::new(rt.store())?;
        rt.create(&st)?;
        Ok(())
    }

    /// Deposits the received funds into the escrow account for `provider_or_client`.
    fn add_balance(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let provider_or_client: Address = decode_params!(args);

        let msg_value = rt.message().value_received();
        if msg_value <= TokenAmount::zero() {
            return Err(actor_error!(
                illegal_argument,
                "balance to add must be greater than zero was: {}",
                msg_value
            ));
        }

        let nominal = Address::new_id(resolve_to_actor_id(rt, &provider_or_client)?);
        rt.transaction(|st: &mut State, rt| {
            st.add_balance_to_escrow_table(rt.store(), &nominal, &msg_value)
        })?;
        Ok(())
    }

    /// Drops the deal ops that have fallen due since the last tick.
    fn cron_tick(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&CRON_ACTOR_ADDR))?;
        let curr_epoch = rt.curr_epoch();
        rt.transaction(|st: &mut State, rt| st.clear_deal_ops_through(rt.store(), curr_epoch))?;
        Ok(())
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "StorageMarket"
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
            Some(Method::AddBalance) => {
                Self::add_balance(rt, args)?;
                Ok(None)
            }
            Some(Method::CronTick) => {
                Self::cron_tick(rt)?;
                Ok(None)
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
