// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::actor_error::*;
pub use self::builtin::*;
pub use self::runtime::builtins::Type;
pub use self::runtime::{
    ActorCode, ActorStateHandle, ComputeFunctionID, InvocInput, MessageInfo, Primitives,
    Runtime, SendOutcome, Verifier, EMPTY_ARR_CID,
};
pub use self::util::*;

pub mod actor_error;
pub mod builtin;
pub mod runtime;
pub mod util;

pub mod test_blockstores;
#[cfg(feature = "test_utils")]
pub mod test_utils;

/// The hasher used for every HAMT in actor state.
pub type Hasher = fvm_ipld_hamt::Sha256;
