// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_core_runtime::runtime::{ActorCode, Runtime};
use fil_core_runtime::{
    actor_error, ActorError, InvocInput, STORAGE_MARKET_ACTOR_ADDR, STORAGE_POWER_ACTOR_ADDR,
    SYSTEM_ACTOR_ADDR,
};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::econ::TokenAmount;
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub use self::state::{Entry, State};

mod state;
pub mod testing;

/// Storage power method run at the end of every epoch.
pub const POWER_ON_EPOCH_TICK_END_METHOD: MethodNum = 5;
/// Storage market method processing deal ops that fall due.
pub const MARKET_CRON_TICK_METHOD: MethodNum = 9;

/// Cron actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    EpochTick = 2,
}

/// The entry table installed at genesis when no other is configured.
pub fn built_in_entries() -> Vec<Entry> {
    vec![
        Entry { receiver: STORAGE_POWER_ACTOR_ADDR, method_num: POWER_ON_EPOCH_TICK_END_METHOD },
        Entry { receiver: STORAGE_MARKET_ACTOR_ADDR, method_num: MARKET_CRON_TICK_METHOD },
    ]
}

/// Cron actor
pub struct Actor;

impl Actor {
    /// Constructor for Cron actor.
    /// The entry table is written into state at genesis, so there is nothing to initialize.
    fn constructor(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;
        Ok(())
    }

    /// Executes built-in periodic actions, run at every Epoch.
    /// epoch_tick(r) is called after all other messages in the epoch have been applied.
    /// This can be seen as an implicit last message.
    fn epoch_tick(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;

        let st: State = rt.state()?;
        for entry in st.entries {
            // A failing entry must not stop the entries after it.
            let outcome = rt.send_catching_errors(InvocInput {
                to: entry.receiver,
                method: entry.method_num,
                params: None,
                value: TokenAmount::default(),
            })?;
            if !outcome.is_success() {
                log::error!(
                    "cron failed to send entry to {}, send error code {}",
                    entry.receiver,
                    outcome.exit_code
                );
            }
        }
        Ok(())
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "Cron"
    }

    fn invoke_method<RT>(
        rt: &RT,
        method: MethodNum,
        _args: Option<IpldBlock>,
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
            Some(Method::EpochTick) => {
                Self::epoch_tick(rt)?;
                Ok(None)
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
