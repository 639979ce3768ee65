// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fil_core_runtime::runtime::{ActorCode, InvocInput, Runtime};
use fil_core_runtime::{actor_error, decode_params, ActorError, Type, SYSTEM_ACTOR_ADDR};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::sector::{RegisteredSealProof, SealVerifyInfo, WindowPoStVerifyInfo};
use fvm_shared::{ActorID, MethodNum, METHOD_CONSTRUCTOR, METHOD_SEND};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Chaos actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    CallerValidation = 2,
    CreateActor = 3,
    ResolveAddress = 4,
    DeleteActor = 5,
    Send = 6,
    MutateState = 7,
    AbortWith = 8,
    InspectRuntime = 9,
    SendCatching = 10,
    VerifyProofs = 11,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CallerValidationBranch {
    None = 0,
    Twice = 1,
    IsAddress = 2,
    IsType = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MutateStateBranch {
    InTransaction = 0,
    TransactionThenAbort = 1,
    AcquireThenAbort = 2,
    ReleaseChanged = 3,
    LeaveUnresolved = 4,
    SendWhileHeld = 5,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, Default, PartialEq, Eq)]
pub struct State {
    /// Mutated by MutateState so tests can observe which writes survived.
    pub value: String,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct CallerValidationArgs {
    pub branch: CallerValidationBranch,
    pub addrs: Vec<Address>,
    pub types: Vec<Type>,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct CreateActorArgs {
    pub code: Cid,
    pub address: Address,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct ResolveAddressResponse {
    pub id: ActorID,
    pub success: bool,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct SendArgs {
    pub to: Address,
    pub method: MethodNum,
    pub params: Option<IpldBlock>,
    pub value: TokenAmount,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct MutateStateArgs {
    pub value: String,
    pub branch: MutateStateBranch,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct AbortWithArgs {
    pub code: ExitCode,
    pub message: String,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct InspectRuntimeReturn {
    pub caller: Address,
    pub receiver: Address,
    pub value_received: TokenAmount,
    pub curr_epoch: ChainEpoch,
    pub current_balance: TokenAmount,
    pub block_winner: Address,
    pub randomness: [u8; RANDOMNESS_LENGTH],
    pub state: State,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct SendCatchingReturn {
    pub code: ExitCode,
    pub return_value: Option<IpldBlock>,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct VerifyProofsArgs {
    pub seal: SealVerifyInfo,
    pub post: WindowPoStVerifyInfo,
    pub proof_type: RegisteredSealProof,
    pub pieces: Vec<PieceInfo>,
}

/// Chaos Actor
///
/// Exercises the runtime in ways a well-behaved actor never would, so the VM's enforcement of
/// the runtime contract can be observed from outside.
pub struct Actor;

impl Actor {
    pub fn constructor(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;
        rt.create(&State::default())
    }

    /// Violates caller validation constraints depending on the branch.
    ///
    /// `None` performs no validation and `Twice` validates twice. `IsAddress` and `IsType`
    /// validate against the supplied sets.
    pub fn caller_validation(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        let params: CallerValidationArgs = decode_params!(args);
        match params.branch {
            CallerValidationBranch::None => {}
            CallerValidationBranch::Twice => {
                rt.validate_immediate_caller_accept_any()?;
                rt.validate_immediate_caller_accept_any()?;
            }
            CallerValidationBranch::IsAddress => {
                rt.validate_immediate_caller_is(&params.addrs)?;
            }
            CallerValidationBranch::IsType => {
                rt.validate_immediate_caller_type(&params.types)?;
            }
        }
        Ok(())
    }

    pub fn create_actor(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: CreateActorArgs = decode_params!(args);
        rt.create_actor(params.code, &params.address)
    }

    /// Resolves an address, returning ID 0 and `false` when it is unknown.
    pub fn resolve_address(
        rt: &impl Runtime,
        args: Option<IpldBlock>,
    ) -> Result<ResolveAddressResponse, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: Address = decode_params!(args);
        let resolved = rt.resolve_address(&params);
        Ok(ResolveAddressResponse { id: resolved.unwrap_or(0), success: resolved.is_some() })
    }

    pub fn delete_actor(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: Address = decode_params!(args);
        rt.delete_actor(&params)
    }

    pub fn send(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<Option<IpldBlock>, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: SendArgs = decode_params!(args);
        rt.send(&params.to, params.method, params.params, params.value)
    }

    pub fn mutate_state(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: MutateStateArgs = decode_params!(args);

        match params.branch {
            MutateStateBranch::InTransaction => rt.transaction(|st: &mut State, _| {
                st.value = params.value;
                Ok(())
            }),
            MutateStateBranch::TransactionThenAbort => rt.transaction(|st: &mut State, _| {
                st.value = params.value;
                Err(actor_error!(illegal_argument; "aborting after mutation"))
            }),
            MutateStateBranch::AcquireThenAbort => {
                let _handle = rt.acquire_state()?;
                Err(actor_error!(illegal_state; "aborting with state acquired"))
            }
            MutateStateBranch::ReleaseChanged => {
                let handle = rt.acquire_state()?;
                let root = handle.take();
                let mut st: State = rt
                    .ipld_get(&root)?
                    .ok_or_else(|| actor_error!(illegal_state; "no state at {}", root))?;
                st.value = params.value;
                let changed = rt.ipld_put(&st)?;
                handle.release(rt, &changed)
            }
            MutateStateBranch::LeaveUnresolved => {
                let _handle = rt.acquire_state()?;
                Ok(())
            }
            MutateStateBranch::SendWhileHeld => {
                let handle = rt.acquire_state()?;
                let root = handle.take();
                rt.send(&SYSTEM_ACTOR_ADDR, METHOD_SEND, None, TokenAmount::default())?;
                handle.release(rt, &root)
            }
        }
    }

    pub fn abort_with(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: AbortWithArgs = decode_params!(args);
        Err(ActorError::unchecked(params.code, params.message))
    }

    pub fn inspect_runtime(rt: &impl Runtime) -> Result<InspectRuntimeReturn, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let epoch = rt.curr_epoch();
        Ok(InspectRuntimeReturn {
            caller: rt.message().caller(),
            receiver: rt.message().receiver(),
            value_received: rt.message().value_received(),
            curr_epoch: epoch,
            current_balance: rt.current_balance(),
            block_winner: rt.toplevel_block_winner(),
            randomness: rt.get_randomness(epoch)?,
            state: rt.state()?,
        })
    }

    /// Attempts a send that catches the callee's abort. Only Cron may do this, so the
    /// attempt itself fails.
    pub fn send_catching(
        rt: &impl Runtime,
        args: Option<IpldBlock>,
    ) -> Result<SendCatchingReturn, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: SendArgs = decode_params!(args);
        let outcome = rt.send_catching_errors(InvocInput {
            to: params.to,
            method: params.method,
            params: params.params,
            value: params.value,
        })?;
        Ok(SendCatchingReturn { code: outcome.exit_code, return_value: outcome.return_data })
    }

    /// Checks a seal and a window PoSt, then returns the unsealed sector CID of the pieces.
    pub fn verify_proofs(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<Cid, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: VerifyProofsArgs = decode_params!(args);
        rt.verify_seal(&params.seal)
            .map_err(|e| actor_error!(illegal_argument; "invalid seal proof: {}", e))?;
        rt.verify_post(&params.post)
            .map_err(|e| actor_error!(illegal_argument; "invalid window PoSt: {}", e))?;
        rt.compute_unsealed_sector_cid(params.proof_type, &params.pieces)
            .map_err(|e| actor_error!(illegal_argument; "failed to compute unsealed CID: {}", e))
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "Chaos"
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
            Some(Method::CallerValidation) => {
                Self::caller_validation(rt, args)?;
                Ok(None)
            }
            Some(Method::CreateActor) => {
                Self::create_actor(rt, args)?;
                Ok(None)
            }
            Some(Method::ResolveAddress) => {
                let res = Self::resolve_address(rt, args)?;
                Ok(IpldBlock::serialize_cbor(&res)?)
            }
            Some(Method::DeleteActor) => {
                Self::delete_actor(rt, args)?;
                Ok(None)
            }
            Some(Method::Send) => Self::send(rt, args),
            Some(Method::MutateState) => {
                Self::mutate_state(rt, args)?;
                Ok(None)
            }
            Some(Method::AbortWith) => {
                Self::abort_with(rt, args)?;
                Ok(None)
            }
            Some(Method::InspectRuntime) => {
                let inspect = Self::inspect_runtime(rt)?;
                Ok(IpldBlock::serialize_cbor(&inspect)?)
            }
            Some(Method::SendCatching) => {
                let res = Self::send_catching(rt, args)?;
                Ok(IpldBlock::serialize_cbor(&res)?)
            }
            Some(Method::VerifyProofs) => {
                let cid = Self::verify_proofs(rt, args)?;
                Ok(IpldBlock::serialize_cbor(&cid)?)
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
