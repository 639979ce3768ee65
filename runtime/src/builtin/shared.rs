// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::address::Address;
use fvm_shared::ActorID;

use crate::runtime::Runtime;
use crate::{actor_error, ActorError};

pub const HAMT_BIT_WIDTH: u32 = 5;

/// Resolves an address to an actor ID, aborting with not-found when no actor is bound to it.
pub fn resolve_to_actor_id(rt: &impl Runtime, address: &Address) -> Result<ActorID, ActorError> {
    rt.resolve_address(address)
        .ok_or_else(|| actor_error!(not_found; "failed to resolve address {} to an actor id", address))
}
