// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cell::RefCell;
use std::rc::Rc;

use cid::Cid;
use fil_core_actor_cron::Actor as CronActor;
use fil_core_actor_init::{Actor as InitActor, State as InitState};
use fil_core_actor_market::Actor as MarketActor;
use fil_core_runtime::runtime::{
    draw_randomness, ActorCode, ActorStateHandle, InvocInput, MessageInfo, Primitives, Runtime,
    SendOutcome, Verifier, EMPTY_ARR_CID,
};
use fil_core_runtime::test_blockstores::MemoryBlockstore;
use fil_core_runtime::{
    actor_error, ActorError, Type, BURNT_FUNDS_ACTOR_ADDR, CRON_ACTOR_ADDR, INIT_ACTOR_ADDR,
    STORAGE_POWER_ACTOR_ADDR, SYSTEM_ACTOR_ID,
};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::CborStore;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::sector::{RegisteredSealProof, SealVerifyInfo, WindowPoStVerifyInfo};
use fvm_shared::{ActorID, MethodNum, METHOD_CONSTRUCTOR, METHOD_SEND};
use multihash::Code;

use crate::actors::{
    AccountActor, ChaosActor, MinerActor, PaychActor, PowerActor, SystemActor,
};
use crate::{actor, ActorState, InvocationTrace, VM};

/// Context shared by every invocation made on behalf of one top-level message.
pub struct TopCtx {
    pub originator_stable_addr: Address,
    pub originator_id: Address,
    pub originator_call_seq: u64,
    pub new_actor_addr_count: RefCell<u64>,
}

#[derive(Clone, Debug)]
pub struct InternalMessage {
    pub from: ActorID,
    pub to: Address,
    pub value: TokenAmount,
    pub method: MethodNum,
    pub params: Option<IpldBlock>,
}

/// The runtime handed to one actor method invocation.
///
/// Nested sends build a fresh context over the same VM and top-level context. Every
/// invocation checkpoints the state tree first and rolls back to that checkpoint if it
/// aborts, so the value transfer, state changes and actor creations of an aborted invocation
/// (and of everything it sent) are all discarded together.
pub struct InvocationCtx<'invocation> {
    v: &'invocation VM,
    top: &'invocation TopCtx,
    msg: InternalMessage,
    caller_validated: RefCell<bool>,
    acquired: RefCell<Option<Cid>>,
    subinvocations: RefCell<Vec<InvocationTrace>>,
}

impl MessageInfo for InvocationCtx<'_> {
    fn nonce(&self) -> u64 {
        self.top.originator_call_seq
    }
    fn caller(&self) -> Address {
        Address::new_id(self.msg.from)
    }
    fn origin(&self) -> Address {
        self.top.originator_id
    }
    fn receiver(&self) -> Address {
        self.msg.to
    }
    fn value_received(&self) -> TokenAmount {
        self.msg.value.clone()
    }
}

impl<'invocation> InvocationCtx<'invocation> {
    pub fn new(v: &'invocation VM, top: &'invocation TopCtx, msg: InternalMessage) -> Self {
        Self {
            v,
            top,
            msg,
            caller_validated: RefCell::new(false),
            acquired: RefCell::new(None),
            subinvocations: RefCell::new(vec![]),
        }
    }

    pub fn gather_trace(
        &mut self,
        invoke_result: &Result<Option<IpldBlock>, ActorError>,
    ) -> InvocationTrace {
        let (return_value, exit_code) = match invoke_result {
            Ok(ret) => (ret.clone(), ExitCode::OK),
            Err(e) => (None, e.exit_code()),
        };
        InvocationTrace {
            from: self.msg.from,
            to: self.msg.to,
            value: self.msg.value.clone(),
            method: self.msg.method,
            params: self.msg.params.clone(),
            exit_code,
            return_value,
            subinvocations: self.subinvocations.take(),
        }
    }

    /// Runs the message, rolling the state tree back if it aborts.
    pub fn invoke(&mut self) -> Result<Option<IpldBlock>, ActorError> {
        let prior_root = self.v.checkpoint()?;
        let res = self.invoke_inner();
        if res.is_err() {
            self.v.rollback(&prior_root)?;
        }
        res
    }

    fn invoke_inner(&mut self) -> Result<Option<IpldBlock>, ActorError> {
        let from = Address::new_id(self.msg.from);
        let value = self.msg.value.clone();

        // Load, deduct, store the sender before loading the receiver to handle self-sends.
        let mut from_actor = self.v.actor(&from)?.ok_or_else(|| {
            ActorError::unchecked(ExitCode::SYS_SENDER_INVALID, format!("no sender {}", from))
        })?;
        if value.is_negative() {
            return Err(ActorError::unchecked(
                ExitCode::SYS_ASSERTION_FAILED,
                "attempt to transfer negative value".to_string(),
            ));
        }
        if from_actor.balance < value {
            return Err(ActorError::unchecked(
                ExitCode::SYS_INSUFFICIENT_FUNDS,
                format!("insufficient balance {} to transfer {}", from_actor.balance, value),
            ));
        }
        from_actor.balance -= &value;
        self.v.set_actor(&from, from_actor)?;

        let (mut to_actor, to_addr) = self.resolve_target(&self.msg.to)?;
        to_actor.balance += &value;
        self.v.set_actor(&to_addr, to_actor.clone())?;
        self.msg.to = to_addr;

        if self.msg.method == METHOD_SEND {
            return Ok(None);
        }

        log::trace!(
            "invoke {} method {} from {} value {}",
            self.msg.to,
            self.msg.method,
            from,
            self.msg.value
        );

        let method = self.msg.method;
        let params = self.msg.params.clone();
        let rt: &Self = self;
        let res = match Type::from_code_cid(&to_actor.code) {
            Some(Type::System) => SystemActor::invoke_method(rt, method, params),
            Some(Type::Init) => InitActor::invoke_method(rt, method, params),
            Some(Type::Cron) => CronActor::invoke_method(rt, method, params),
            Some(Type::Account) => AccountActor::invoke_method(rt, method, params),
            Some(Type::Power) => PowerActor::invoke_method(rt, method, params),
            Some(Type::Miner) => MinerActor::invoke_method(rt, method, params),
            Some(Type::Market) => MarketActor::invoke_method(rt, method, params),
            Some(Type::PaymentChannel) => PaychActor::invoke_method(rt, method, params),
            Some(Type::Chaos) => ChaosActor::invoke_method(rt, method, params),
            None => Err(ActorError::unchecked(
                ExitCode::SYS_INVALID_RECEIVER,
                format!("actor {} has unknown code {}", to_addr, to_actor.code),
            )),
        };

        res.and_then(|ret| {
            if rt.acquired.borrow().is_some() {
                return Err(actor_error!(runtime_api; "method returned with unresolved state handle"));
            }
            if !*rt.caller_validated.borrow() {
                return Err(actor_error!(runtime_api; "method returned without validating caller"));
            }
            Ok(ret)
        })
    }

    /// Finds the receiver, creating an account actor for an unknown key address.
    fn resolve_target(&self, target: &Address) -> Result<(ActorState, Address), ActorError> {
        if let Some(a) = self.v.resolve_id_address(target)? {
            if let Some(act) = self.v.actor(&a)? {
                return Ok((act, a));
            }
        }

        match target.protocol() {
            Protocol::Secp256k1 | Protocol::BLS => {}
            _ => {
                return Err(ActorError::unchecked(
                    ExitCode::SYS_INVALID_RECEIVER,
                    format!("cannot create account for address {} type {}", target, target.protocol()),
                ));
            }
        }

        let mut init_actor = self
            .v
            .actor(&INIT_ACTOR_ADDR)?
            .ok_or_else(|| actor_error!(runtime_api; "no init actor"))?;
        let mut st: InitState = self
            .v
            .store
            .get_cbor(&init_actor.state)
            .map_err(|e| actor_error!(illegal_state; "failed to load init state: {}", e))?
            .ok_or_else(|| actor_error!(illegal_state; "init actor has no state"))?;
        let target_id = st.map_address_to_new_id(&*self.v.store, target)?;
        init_actor.state = self
            .v
            .store
            .put_cbor(&st, Code::Blake2b256)
            .map_err(|e| actor_error!(illegal_state; "failed to store init state: {}", e))?;
        self.v.set_actor(&INIT_ACTOR_ADDR, init_actor)?;

        let target_id_addr = Address::new_id(target_id);
        self.v.set_actor(
            &target_id_addr,
            actor(Type::Account.code_cid(), *EMPTY_ARR_CID, 0, TokenAmount::default()),
        )?;

        let new_actor_msg = InternalMessage {
            from: SYSTEM_ACTOR_ID,
            to: target_id_addr,
            value: TokenAmount::default(),
            method: METHOD_CONSTRUCTOR,
            params: IpldBlock::serialize_cbor(target)?,
        };
        let mut new_ctx = InvocationCtx::new(self.v, self.top, new_actor_msg);
        let res = new_ctx.invoke();
        let trace = new_ctx.gather_trace(&res);
        self.subinvocations.borrow_mut().push(trace);
        res?;

        let act = self
            .v
            .actor(&target_id_addr)?
            .ok_or_else(|| actor_error!(runtime_api; "account {} vanished", target_id_addr))?;
        Ok((act, target_id_addr))
    }

    fn receiver_actor(&self) -> Result<ActorState, ActorError> {
        self.v
            .actor(&self.msg.to)?
            .ok_or_else(|| actor_error!(runtime_api; "receiver {} does not exist", self.msg.to))
    }

    fn mark_caller_validated(&self) -> Result<(), ActorError> {
        if self.caller_validated.replace(true) {
            return Err(actor_error!(runtime_api; "caller validated more than once"));
        }
        Ok(())
    }

    fn require_no_handle(&self, op: &str) -> Result<(), ActorError> {
        if self.acquired.borrow().is_some() {
            return Err(actor_error!(runtime_api; "{} while holding a state handle", op));
        }
        Ok(())
    }

    fn dispatch(&self, msg: InternalMessage) -> Result<Option<IpldBlock>, ActorError> {
        let mut new_ctx = InvocationCtx::new(self.v, self.top, msg);
        let res = new_ctx.invoke();
        let trace = new_ctx.gather_trace(&res);
        self.subinvocations.borrow_mut().push(trace);
        res
    }
}

impl Runtime for InvocationCtx<'_> {
    type Blockstore = Rc<MemoryBlockstore>;

    fn message(&self) -> &dyn MessageInfo {
        self
    }

    fn curr_epoch(&self) -> ChainEpoch {
        self.v.epoch()
    }

    fn toplevel_block_winner(&self) -> Address {
        self.v.block_winner()
    }

    fn current_balance(&self) -> TokenAmount {
        self.receiver_actor().map(|a| a.balance).unwrap_or_default()
    }

    fn get_randomness(
        &self,
        rand_epoch: ChainEpoch,
    ) -> Result<[u8; RANDOMNESS_LENGTH], ActorError> {
        if rand_epoch > self.curr_epoch() {
            return Err(actor_error!(illegal_argument;
                "cannot draw randomness from future epoch {} at {}", rand_epoch, self.curr_epoch()));
        }
        Ok(draw_randomness(|data| self.hash_blake2b(data), self.v.seed(), rand_epoch, &[]))
    }

    fn validate_immediate_caller_accept_any(&self) -> Result<(), ActorError> {
        self.mark_caller_validated()
    }

    fn validate_immediate_caller_is<'a, I>(&self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        self.mark_caller_validated()?;

        let caller = self.message().caller();
        let addrs: Vec<Address> = addresses.into_iter().cloned().collect();
        if addrs.contains(&caller) {
            return Ok(());
        }
        Err(actor_error!(forbidden;
            "caller {} is not one of supported", caller
        ))
    }

    fn validate_immediate_caller_type<'a, I>(&self, types: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Type>,
    {
        self.mark_caller_validated()?;

        let caller = self.message().caller();
        let caller_type = self
            .get_actor_code_cid(&caller)
            .and_then(|code| self.resolve_builtin_actor_type(&code));
        let types: Vec<Type> = types.into_iter().cloned().collect();
        if caller_type.map_or(false, |t| types.contains(&t)) {
            return Ok(());
        }
        Err(actor_error!(forbidden;
            "caller type {:?} forbidden, allowed: {:?}", caller_type, types))
    }

    fn resolve_address(&self, address: &Address) -> Option<ActorID> {
        match self.v.resolve_id_address(address) {
            Ok(id) => id.and_then(|a| a.id().ok()),
            Err(e) => {
                log::warn!("failed to resolve address {}: {}", address, e);
                None
            }
        }
    }

    fn get_actor_code_cid(&self, addr: &Address) -> Option<Cid> {
        let id = Address::new_id(self.resolve_address(addr)?);
        match self.v.actor(&id) {
            Ok(a) => a.map(|a| a.code),
            Err(e) => {
                log::warn!("failed to load actor {}: {}", id, e);
                None
            }
        }
    }

    fn acquire_state(&self) -> Result<ActorStateHandle, ActorError> {
        self.require_no_handle("state acquired")?;
        let root = self.receiver_actor()?.state;
        self.acquired.replace(Some(root));
        Ok(ActorStateHandle::new(root))
    }

    fn release_state(&self, handle: ActorStateHandle, unchanged: &Cid) -> Result<(), ActorError> {
        let acquired = self
            .acquired
            .take()
            .ok_or_else(|| actor_error!(runtime_api; "release of state that was not acquired"))?;
        ActorStateHandle::new(acquired).check_unchanged(&handle.take())?;
        handle.check_unchanged(unchanged)
    }

    fn update_release_state(
        &self,
        handle: ActorStateHandle,
        new_root: &Cid,
    ) -> Result<(), ActorError> {
        let acquired = self
            .acquired
            .take()
            .ok_or_else(|| actor_error!(runtime_api; "update of state that was not acquired"))?;
        handle.check_unchanged(&acquired)?;

        let mut act = self.receiver_actor()?;
        act.state = *new_root;
        self.v.set_actor(&self.msg.to, act)
    }

    fn store(&self) -> &Rc<MemoryBlockstore> {
        &self.v.store
    }

    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
    ) -> Result<Option<IpldBlock>, ActorError> {
        self.require_no_handle("send")?;
        let from = self.msg.to.id().map_err(|e| actor_error!(runtime_api; "receiver {}", e))?;
        self.dispatch(InternalMessage { from, to: *to, value, method, params })
    }

    fn send_catching_errors(&self, input: InvocInput) -> Result<SendOutcome, ActorError> {
        if self.msg.to != CRON_ACTOR_ADDR {
            return Err(actor_error!(forbidden; "only the cron actor may catch send errors"));
        }
        match self.send(&input.to, input.method, input.params, input.value) {
            Ok(return_data) => Ok(SendOutcome { exit_code: ExitCode::OK, return_data }),
            Err(e) => Ok(SendOutcome { exit_code: e.exit_code(), return_data: None }),
        }
    }

    fn new_actor_address(&self) -> Result<Address, ActorError> {
        let count = self.top.new_actor_addr_count.replace_with(|old| *old + 1);
        let mut b = self.top.originator_stable_addr.to_bytes();
        b.extend_from_slice(&self.top.originator_call_seq.to_be_bytes());
        b.extend_from_slice(&count.to_be_bytes());
        Ok(Address::new_actor(&b))
    }

    fn create_actor(&self, code_id: Cid, address: &Address) -> Result<(), ActorError> {
        self.require_no_handle("create actor")?;
        if self.msg.to != INIT_ACTOR_ADDR {
            return Err(actor_error!(forbidden; "only the init actor may create actors"));
        }
        match Type::from_code_cid(&code_id) {
            Some(t) if !t.is_singleton_actor() => {}
            _ => {
                return Err(ActorError::unchecked(
                    ExitCode::SYS_ASSERTION_FAILED,
                    format!("create_actor called with singleton or unknown code {}", code_id),
                ));
            }
        }
        if address.protocol() != Protocol::ID {
            return Err(actor_error!(illegal_argument; "new actor address {} is not an ID address", address));
        }
        if self.v.actor(address)?.is_some() {
            return Err(actor_error!(forbidden;
                "attempt to create new actor at existing address {}", address));
        }
        self.v.set_actor(address, actor(code_id, *EMPTY_ARR_CID, 0, TokenAmount::default()))
    }

    fn delete_actor(&self, address: &Address) -> Result<(), ActorError> {
        self.require_no_handle("delete actor")?;
        let target = self
            .resolve_address(address)
            .map(Address::new_id)
            .ok_or_else(|| actor_error!(not_found; "cannot resolve actor {} to delete", address))?;
        let target_actor = self
            .v
            .actor(&target)?
            .ok_or_else(|| actor_error!(not_found; "no actor {} to delete", target))?;

        let self_delete = target == self.msg.to;
        let power_deletes_miner = self.msg.to == STORAGE_POWER_ACTOR_ADDR
            && Type::from_code_cid(&target_actor.code) == Some(Type::Miner);
        if !self_delete && !power_deletes_miner {
            return Err(actor_error!(forbidden; "{} may not delete actor {}", self.msg.to, target));
        }

        // Remaining balance is burnt.
        if !target_actor.balance.is_zero() {
            let mut burnt = self
                .v
                .actor(&BURNT_FUNDS_ACTOR_ADDR)?
                .ok_or_else(|| actor_error!(runtime_api; "no burnt funds actor"))?;
            burnt.balance += &target_actor.balance;
            self.v.set_actor(&BURNT_FUNDS_ACTOR_ADDR, burnt)?;
        }
        self.v.delete_actor(&target)?;
        log::debug!("deleted actor {}", target);
        Ok(())
    }
}

impl Primitives for InvocationCtx<'_> {
    fn hash_blake2b(&self, data: &[u8]) -> [u8; 32] {
        self.v.primitives.hash_blake2b(data)
    }

    fn compute_unsealed_sector_cid(
        &self,
        proof_type: RegisteredSealProof,
        pieces: &[PieceInfo],
    ) -> Result<Cid, anyhow::Error> {
        self.v.primitives.compute_unsealed_sector_cid(proof_type, pieces)
    }

    fn verify_signature(
        &self,
        signature: &Signature,
        signer: &Address,
        plaintext: &[u8],
    ) -> Result<(), anyhow::Error> {
        self.v.primitives.verify_signature(signature, signer, plaintext)
    }
}

impl Verifier for InvocationCtx<'_> {
    fn verify_seal(&self, vi: &SealVerifyInfo) -> Result<(), anyhow::Error> {
        self.v.primitives.verify_seal(vi)
    }

    fn verify_post(&self, verify_info: &WindowPoStVerifyInfo) -> Result<(), anyhow::Error> {
        self.v.primitives.verify_post(verify_info)
    }
}
