// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;

use super::Runtime;
use crate::{actor_error, ActorError};

/// Transaction guard over the receiver's persisted state for one invocation.
///
/// Obtained from [`Runtime::acquire_state`] and consumed by exactly one of
/// [`ActorStateHandle::release`] or [`ActorStateHandle::update_release`]. A handle dropped
/// without being resolved is treated as released unchanged when the invocation aborts, and as
/// a runtime API violation when it returns successfully.
#[must_use = "state handles must be resolved with release or update_release"]
#[derive(Debug, PartialEq, Eq)]
pub struct ActorStateHandle {
    observed: Cid,
}

impl ActorStateHandle {
    /// Binds a handle to the state root observed at acquisition.
    /// Only runtime implementations construct handles.
    pub fn new(observed: Cid) -> Self {
        Self { observed }
    }

    /// The state root this handle observed when it was acquired.
    pub fn take(&self) -> Cid {
        self.observed
    }

    /// Resolves the handle without changing state.
    pub fn release<RT: Runtime + ?Sized>(self, rt: &RT, unchanged: &Cid) -> Result<(), ActorError> {
        rt.release_state(self, unchanged)
    }

    /// Resolves the handle, committing `new_root` as the receiver's state.
    pub fn update_release<RT: Runtime + ?Sized>(
        self,
        rt: &RT,
        new_root: &Cid,
    ) -> Result<(), ActorError> {
        rt.update_release_state(self, new_root)
    }

    /// Checks the root passed to a release is the one observed at acquisition.
    /// A mismatch means state changed under the handle, which cannot happen in a correct actor.
    pub fn check_unchanged(&self, unchanged: &Cid) -> Result<(), ActorError> {
        if *unchanged != self.observed {
            return Err(actor_error!(runtime_api;
                "state released with root {} but {} was acquired", unchanged, self.observed));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EMPTY_ARR_CID;
    use fvm_shared::error::ExitCode;

    #[test]
    fn unchanged_check() {
        let handle = ActorStateHandle::new(*EMPTY_ARR_CID);
        assert_eq!(*EMPTY_ARR_CID, handle.take());
        assert!(handle.check_unchanged(&EMPTY_ARR_CID).is_ok());

        let other = Cid::new_v1(fvm_ipld_encoding::IPLD_RAW, *EMPTY_ARR_CID.hash());
        let err = handle.check_unchanged(&other).unwrap_err();
        assert_eq!(ExitCode::SYS_ASSERTION_FAILED, err.exit_code());
    }
}
