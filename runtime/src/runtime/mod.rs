// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::{strict_bytes, CborStore, DAG_CBOR};
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::sector::{RegisteredSealProof, SealVerifyInfo, WindowPoStVerifyInfo};
use fvm_shared::{ActorID, MethodNum, METHOD_SEND};
use lazy_static::lazy_static;
use multihash::{Code, MultihashDigest};
use num_derive::FromPrimitive;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use self::actor_code::*;
pub use self::randomness::draw_randomness;
pub use self::state_handle::ActorStateHandle;
use crate::runtime::builtins::Type;
use crate::{actor_error, decode_params, ActorError};

mod actor_code;
pub mod builtins;
mod randomness;
mod state_handle;

lazy_static! {
    /// The state root of an actor that has been created but not constructed:
    /// the CBOR encoding of an empty array.
    pub static ref EMPTY_ARR_CID: Cid = Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&[0x80]));
}

/// Runtime is the VM's internal runtime object.
/// this is everything that is accessible to actors, beyond parameters.
///
/// Every exported method must begin with exactly one of the `validate_immediate_caller_*`
/// calls. Runtimes reject a second validation and a method that returns without one.
pub trait Runtime: Primitives + Verifier {
    type Blockstore: Blockstore;

    /// Information related to the current message being executed.
    fn message(&self) -> &dyn MessageInfo;

    /// The current chain epoch number. The genesis block has epoch zero.
    fn curr_epoch(&self) -> ChainEpoch;

    /// The miner of the block containing the top-level message.
    fn toplevel_block_winner(&self) -> Address;

    /// The balance of the receiver, including any value received with this message.
    fn current_balance(&self) -> TokenAmount;

    /// Pseudo-random bytes determined by `rand_epoch` and the chain seed.
    fn get_randomness(&self, rand_epoch: ChainEpoch)
        -> Result<[u8; RANDOMNESS_LENGTH], ActorError>;

    /// Validates the caller against some predicate.
    /// Exported actor methods must invoke exactly one caller validation before any effect.
    fn validate_immediate_caller_accept_any(&self) -> Result<(), ActorError>;
    fn validate_immediate_caller_is<'a, I>(&self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>;
    fn validate_immediate_caller_type<'a, I>(&self, types: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Type>;

    /// Resolves an address of any protocol to an actor ID via the Init actor's table.
    /// If the argument is an ID address it is returned directly.
    fn resolve_address(&self, address: &Address) -> Option<ActorID>;

    /// Look up the code ID at an actor address. Returns None for unknown addresses.
    fn get_actor_code_cid(&self, addr: &Address) -> Option<Cid>;

    /// Returns the built-in actor type of a code CID, if any.
    fn resolve_builtin_actor_type(&self, code_id: &Cid) -> Option<Type> {
        Type::from_code_cid(code_id)
    }

    /// Returns the code CID for a built-in actor type.
    fn get_code_cid_for_type(&self, typ: Type) -> Cid {
        typ.code_cid()
    }

    /// Acquires the receiver's state for this invocation. At most one handle may be
    /// outstanding; a second acquisition before resolving the first is a runtime API violation.
    fn acquire_state(&self) -> Result<ActorStateHandle, ActorError>;

    /// Resolves a handle with no change. `unchanged` must equal the acquired root.
    fn release_state(&self, handle: ActorStateHandle, unchanged: &Cid) -> Result<(), ActorError>;

    /// Resolves a handle, committing `new_root` as the receiver's state.
    fn update_release_state(
        &self,
        handle: ActorStateHandle,
        new_root: &Cid,
    ) -> Result<(), ActorError>;

    /// Returns reference to blockstore
    fn store(&self) -> &Self::Blockstore;

    /// Reads an object from the store. Absence is not an error.
    fn ipld_get<T: DeserializeOwned>(&self, cid: &Cid) -> Result<Option<T>, ActorError> {
        self.store()
            .get_cbor(cid)
            .map_err(|e| actor_error!(illegal_state; "failed to read object {}: {}", cid, e))
    }

    /// Writes an object to the store, returning its content identifier.
    fn ipld_put<T: Serialize>(&self, obj: &T) -> Result<Cid, ActorError> {
        self.store()
            .put_cbor(obj, Code::Blake2b256)
            .map_err(|e| actor_error!(illegal_state; "failed to write object: {}", e))
    }

    /// Initializes the state object.
    /// This is only valid when the state has not yet been initialized.
    fn create<T: Serialize>(&self, obj: &T) -> Result<(), ActorError> {
        let handle = self.acquire_state()?;
        let root = handle.take();
        if root != *EMPTY_ARR_CID {
            self.release_state(handle, &root)?;
            return Err(
                actor_error!(illegal_state; "failed to create state; expected empty array CID, got: {}", root),
            );
        }
        let new_root = self.ipld_put(obj)?;
        self.update_release_state(handle, &new_root)
    }

    /// Loads a readonly copy of the state of the receiver.
    fn state<T: DeserializeOwned>(&self) -> Result<T, ActorError> {
        let handle = self.acquire_state()?;
        let root = handle.take();
        self.release_state(handle, &root)?;
        self.ipld_get(&root)?
            .ok_or_else(|| actor_error!(runtime_api; "state not found at root {}", root))
    }

    /// Loads a mutable copy of the state of the receiver, passes it to `f`,
    /// and after `f` completes puts the state object back to the store and commits it
    /// as the receiver's state root. If `f` fails the handle is released unchanged.
    ///
    /// During the call to `f`, execution is protected from side-effects (including message send).
    ///
    /// Returns the result of `f`.
    fn transaction<S, RT, F>(&self, f: F) -> Result<RT, ActorError>
    where
        S: Serialize + DeserializeOwned,
        F: FnOnce(&mut S, &Self) -> Result<RT, ActorError>,
    {
        let handle = self.acquire_state()?;
        let root = handle.take();
        let mut st: S = self
            .ipld_get(&root)?
            .ok_or_else(|| actor_error!(runtime_api; "state not found at root {}", root))?;
        match f(&mut st, self) {
            Ok(ret) => {
                let new_root = self.ipld_put(&st)?;
                self.update_release_state(handle, &new_root)?;
                Ok(ret)
            }
            Err(e) => {
                self.release_state(handle, &root)?;
                Err(e)
            }
        }
    }

    /// Sends a message to another actor and returns its return value.
    /// If the callee aborts, its state changes (and those of any messages it sent in turn)
    /// are rolled back, along with the value transfer, and the abort propagates to the caller.
    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
    ) -> Result<Option<IpldBlock>, ActorError>;

    /// Like [`Runtime::send`], but a callee abort is returned as an exit code instead of
    /// propagating, whatever its code. The callee's state changes are still rolled back.
    /// Only the Cron actor may call this.
    fn send_catching_errors(&self, input: InvocInput) -> Result<SendOutcome, ActorError>;

    /// Sends a message carrying no value.
    fn send_query(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError> {
        self.send(to, method, params, TokenAmount::default())
    }

    /// Transfers value to another actor without invoking a method.
    fn send_funds(&self, to: &Address, value: TokenAmount) -> Result<(), ActorError> {
        self.send(to, METHOD_SEND, None, value).map(|_| ())
    }

    /// Computes an address for a new actor. The returned address is intended to uniquely refer to
    /// the actor even in the event of a chain re-org (whereas an ID-address might refer to a
    /// different actor after messages are re-ordered).
    /// Always an ActorExec address.
    fn new_actor_address(&self) -> Result<Address, ActorError>;

    /// Creates an actor with code `code_id` and an empty state at the ID address `address`.
    /// May only be called by the Init actor.
    fn create_actor(&self, code_id: Cid, address: &Address) -> Result<(), ActorError>;

    /// Deletes an actor from the state tree. An actor may delete itself, and the storage
    /// power actor may delete a storage miner.
    fn delete_actor(&self, address: &Address) -> Result<(), ActorError>;

    /// Invokes a registered native function.
    fn compute(
        &self,
        func: ComputeFunctionID,
        args: Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError> {
        match func {
            ComputeFunctionID::VerifySignature => {
                let params: VerifySignatureParams = decode_params!(args);
                let valid = self
                    .verify_signature(&params.signature, &params.signer, &params.plaintext)
                    .is_ok();
                Ok(IpldBlock::serialize_cbor(&valid)?)
            }
        }
    }
}

/// Message information available to the actor about executing message.
pub trait MessageInfo {
    /// The nonce of the currently executing message.
    fn nonce(&self) -> u64;

    /// The address of the immediate calling actor. Always an ID-address.
    fn caller(&self) -> Address;

    /// The address of the origin of the current invocation. Always an ID-address
    fn origin(&self) -> Address;

    /// The address of the actor receiving the message. Always an ID-address.
    fn receiver(&self) -> Address;

    /// The value attached to the message being processed, implicitly
    /// added to current_balance() before method invocation.
    fn value_received(&self) -> TokenAmount;
}

/// Pure functions implemented as primitives by the runtime.
pub trait Primitives {
    /// Hashes input data using blake2b with 256 bit output.
    fn hash_blake2b(&self, data: &[u8]) -> [u8; 32];

    /// Computes an unsealed sector CID (CommD) from its constituent piece CIDs (CommPs) and sizes.
    fn compute_unsealed_sector_cid(
        &self,
        proof_type: RegisteredSealProof,
        pieces: &[PieceInfo],
    ) -> Result<Cid, anyhow::Error>;

    /// Verifies that a signature is valid for an address and plaintext.
    fn verify_signature(
        &self,
        signature: &Signature,
        signer: &Address,
        plaintext: &[u8],
    ) -> Result<(), anyhow::Error>;
}

/// filcrypto verification primitives provided by the runtime
pub trait Verifier {
    /// Verifies a sector seal proof.
    fn verify_seal(&self, vi: &SealVerifyInfo) -> Result<(), anyhow::Error>;

    /// Verifies a window proof of spacetime.
    fn verify_post(&self, verify_info: &WindowPoStVerifyInfo) -> Result<(), anyhow::Error>;
}

/// A message to be dispatched by [`Runtime::send_catching_errors`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocInput {
    pub to: Address,
    pub method: MethodNum,
    pub params: Option<IpldBlock>,
    pub value: TokenAmount,
}

/// The result of a send whose abort was caught.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendOutcome {
    pub exit_code: ExitCode,
    pub return_data: Option<IpldBlock>,
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code.is_success()
    }
}

/// Native functions reachable through [`Runtime::compute`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u64)]
pub enum ComputeFunctionID {
    VerifySignature = 1,
}

#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct VerifySignatureParams {
    pub signature: Signature,
    pub signer: Address,
    #[serde(with = "strict_bytes")]
    pub plaintext: Vec<u8>,
}
