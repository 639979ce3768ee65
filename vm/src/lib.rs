// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! An in-memory VM that executes the core actors.
//!
//! The VM keeps the state tree as a HAMT of [`ActorState`] keyed by ID address, dispatches
//! messages to actors by code CID, and checkpoints the tree around every invocation so an
//! aborted invocation leaves no trace. Given the same genesis and the same messages it always
//! arrives at the same state root.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::anyhow;
use cid::Cid;
use fil_core_actor_init::State as InitState;
use fil_core_runtime::test_blockstores::MemoryBlockstore;
use fil_core_runtime::{
    ActorError, Map2, Type, CHAOS_ACTOR_ADDR, CRON_ACTOR_ADDR, DEFAULT_HAMT_CONFIG,
    EMPTY_ARR_CID, SYSTEM_ACTOR_ADDR,
};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::CborStore;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR};
use multihash::Code;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use self::check::check_state_invariants;
pub use self::fakes::*;
pub use self::genesis::*;
pub use self::messaging::{InternalMessage, InvocationCtx, TopCtx};
pub use self::trace::InvocationTrace;

pub mod actors;
mod check;
mod fakes;
mod genesis;
mod messaging;
mod trace;

type ActorMap = Map2<Rc<MemoryBlockstore>, Address, ActorState>;

/// An actor's entry in the state tree.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, PartialEq, Eq, Debug)]
pub struct ActorState {
    pub code: Cid,
    pub state: Cid,
    pub call_seq: u64,
    pub balance: TokenAmount,
}

pub fn actor(code: Cid, state: Cid, call_seq: u64, balance: TokenAmount) -> ActorState {
    ActorState { code, state, call_seq, balance }
}

/// The outcome of a top-level message.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageResult {
    pub code: ExitCode,
    pub message: String,
    pub ret: Option<IpldBlock>,
}

pub struct VM {
    pub store: Rc<MemoryBlockstore>,
    pub primitives: FakePrimitives,
    actors: RefCell<ActorMap>,
    epoch: RefCell<ChainEpoch>,
    block_winner: RefCell<Address>,
    seed: [u8; RANDOMNESS_LENGTH],
    invocations: RefCell<Vec<InvocationTrace>>,
}

impl VM {
    /// Creates a VM with an empty state tree.
    pub fn new(store: Rc<MemoryBlockstore>, seed: [u8; RANDOMNESS_LENGTH]) -> anyhow::Result<VM> {
        let mut actors = ActorMap::empty(store.clone(), DEFAULT_HAMT_CONFIG, "actors");
        actors.flush()?;
        Ok(VM {
            store,
            primitives: FakePrimitives::default(),
            actors: RefCell::new(actors),
            epoch: RefCell::new(0),
            block_winner: RefCell::new(SYSTEM_ACTOR_ADDR),
            seed,
            invocations: RefCell::new(vec![]),
        })
    }

    pub fn epoch(&self) -> ChainEpoch {
        *self.epoch.borrow()
    }

    pub fn set_epoch(&self, epoch: ChainEpoch) {
        self.epoch.replace(epoch);
    }

    pub fn block_winner(&self) -> Address {
        *self.block_winner.borrow()
    }

    pub fn set_block_winner(&self, winner: Address) {
        self.block_winner.replace(winner);
    }

    pub fn seed(&self) -> &[u8; RANDOMNESS_LENGTH] {
        &self.seed
    }

    pub fn actor(&self, addr: &Address) -> Result<Option<ActorState>, ActorError> {
        Ok(self.actors.borrow().get(addr)?.cloned())
    }

    /// Blindly overwrites the actor at this address whether it previously existed or not.
    pub fn set_actor(&self, addr: &Address, a: ActorState) -> Result<(), ActorError> {
        self.actors.borrow_mut().set(addr, a)?;
        Ok(())
    }

    pub fn delete_actor(&self, addr: &Address) -> Result<Option<ActorState>, ActorError> {
        self.actors.borrow_mut().delete(addr)
    }

    /// Visits every actor in the state tree.
    pub fn for_each_actor<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        F: FnMut(Address, &ActorState),
    {
        self.actors.borrow().for_each(|addr, a| {
            f(addr, a);
            Ok(())
        })
    }

    /// Flushes the state tree, returning its root.
    pub fn checkpoint(&self) -> Result<Cid, ActorError> {
        self.actors.borrow_mut().flush()
    }

    /// Discards every change made since `root` was checkpointed.
    pub fn rollback(&self, root: &Cid) -> Result<(), ActorError> {
        let actors = ActorMap::load(self.store.clone(), root, DEFAULT_HAMT_CONFIG, "actors")?;
        self.actors.replace(actors);
        Ok(())
    }

    /// The root of the state tree after flushing any pending changes.
    pub fn state_root(&self) -> anyhow::Result<Cid> {
        Ok(self.checkpoint()?)
    }

    /// Resolves an address to its ID address through the Init actor's table.
    pub fn resolve_id_address(&self, addr: &Address) -> Result<Option<Address>, ActorError> {
        if addr.protocol() == Protocol::ID {
            return Ok(Some(*addr));
        }
        let st: InitState = match self.actor_state(&fil_core_runtime::INIT_ACTOR_ADDR)? {
            Some(st) => st,
            None => return Ok(None),
        };
        st.resolve_address(&*self.store, addr)
    }

    fn actor_state<T: DeserializeOwned>(&self, addr: &Address) -> Result<Option<T>, ActorError> {
        let a = match self.actor(addr)? {
            Some(a) => a,
            None => return Ok(None),
        };
        self.store
            .get_cbor(&a.state)
            .map_err(|e| ActorError::illegal_state(format!("failed to load state of {}: {}", addr, e)))
    }

    /// Loads the state object of the actor at `addr`.
    pub fn get_state<T: DeserializeOwned>(&self, addr: &Address) -> anyhow::Result<T> {
        let id = self
            .resolve_id_address(addr)?
            .ok_or_else(|| anyhow!("failed to resolve address {}", addr))?;
        self.actor_state(&id)?.ok_or_else(|| anyhow!("no state for actor {}", addr))
    }

    /// Writes `state` as the state object of the actor at the ID address `addr`.
    pub fn put_state<T: Serialize>(&self, addr: &Address, state: &T) -> anyhow::Result<()> {
        let mut a = self.actor(addr)?.ok_or_else(|| anyhow!("no actor at {}", addr))?;
        a.state = self.store.put_cbor(state, Code::Blake2b256)?;
        self.set_actor(addr, a)?;
        Ok(())
    }

    pub fn balance(&self, addr: &Address) -> anyhow::Result<TokenAmount> {
        let id = self.resolve_id_address(addr)?;
        Ok(match id {
            Some(id) => self.actor(&id)?.map(|a| a.balance).unwrap_or_default(),
            None => TokenAmount::default(),
        })
    }

    /// Sends a signed message, bumping the sender's call sequence.
    pub fn apply_message<S: Serialize>(
        &self,
        from: &Address,
        to: &Address,
        value: TokenAmount,
        method: MethodNum,
        params: Option<S>,
    ) -> anyhow::Result<MessageResult> {
        let params = params.map(|p| IpldBlock::serialize_cbor(&p)).transpose()?.flatten();
        self.execute(from, to, value, method, params, true)
    }

    /// Sends a message on behalf of the system, without touching the sender's call sequence.
    pub fn execute_message_implicit(
        &self,
        from: &Address,
        to: &Address,
        value: TokenAmount,
        method: MethodNum,
        params: Option<IpldBlock>,
    ) -> anyhow::Result<MessageResult> {
        self.execute(from, to, value, method, params, false)
    }

    fn execute(
        &self,
        from: &Address,
        to: &Address,
        value: TokenAmount,
        method: MethodNum,
        params: Option<IpldBlock>,
        bump_seq: bool,
    ) -> anyhow::Result<MessageResult> {
        let from_id = self
            .resolve_id_address(from)?
            .ok_or_else(|| anyhow!("unknown sender {}", from))?;
        let mut from_actor = self.actor(&from_id)?.ok_or_else(|| anyhow!("no actor at {}", from))?;
        let originator_stable_addr = self.stable_origin(from, &from_actor)?;
        let call_seq = from_actor.call_seq;
        if bump_seq {
            from_actor.call_seq += 1;
            self.set_actor(&from_id, from_actor)?;
        }

        let prior_root = self.checkpoint()?;
        let top = TopCtx {
            originator_stable_addr,
            originator_id: from_id,
            originator_call_seq: call_seq,
            new_actor_addr_count: RefCell::new(0),
        };
        let msg = InternalMessage { from: from_id.id()?, to: *to, value, method, params };
        let mut ctx = InvocationCtx::new(self, &top, msg);
        let res = ctx.invoke();
        let trace = ctx.gather_trace(&res);
        self.invocations.borrow_mut().push(trace);

        match res {
            Ok(ret) => {
                self.checkpoint()?;
                Ok(MessageResult { code: ExitCode::OK, message: String::new(), ret })
            }
            Err(e) => {
                log::debug!("message to {} method {} aborted: {}", to, method, e);
                self.rollback(&prior_root)?;
                Ok(MessageResult { code: e.exit_code(), message: e.msg().to_string(), ret: None })
            }
        }
    }

    /// The sender's key address when it is an account, so that robust addresses derived from
    /// the origin do not depend on which of its addresses the message was sent from.
    fn stable_origin(&self, from: &Address, from_actor: &ActorState) -> anyhow::Result<Address> {
        if from.protocol() != Protocol::ID {
            return Ok(*from);
        }
        if Type::from_code_cid(&from_actor.code) == Some(Type::Account) {
            if let Some(st) = self.store.get_cbor::<actors::account::State>(&from_actor.state)? {
                return Ok(st.address);
            }
        }
        Ok(*from)
    }

    /// Runs the implicit end-of-epoch cron message at `epoch`.
    pub fn cron_tick(&self, epoch: ChainEpoch) -> anyhow::Result<MessageResult> {
        self.set_epoch(epoch);
        self.execute_message_implicit(
            &SYSTEM_ACTOR_ADDR,
            &CRON_ACTOR_ADDR,
            TokenAmount::default(),
            fil_core_actor_cron::Method::EpochTick as u64,
            None,
        )
    }

    /// Installs and constructs the chaos actor at its singleton address.
    pub fn install_chaos(&self) -> anyhow::Result<()> {
        self.set_actor(
            &CHAOS_ACTOR_ADDR,
            actor(Type::Chaos.code_cid(), *EMPTY_ARR_CID, 0, TokenAmount::default()),
        )?;
        let res = self.execute_message_implicit(
            &SYSTEM_ACTOR_ADDR,
            &CHAOS_ACTOR_ADDR,
            TokenAmount::default(),
            METHOD_CONSTRUCTOR,
            None,
        )?;
        if !res.code.is_success() {
            return Err(anyhow!("failed to construct chaos actor: {}", res.message));
        }
        Ok(())
    }

    /// Takes the traces of every top-level message applied since the last call.
    pub fn take_invocations(&self) -> Vec<InvocationTrace> {
        self.invocations.take()
    }
}
