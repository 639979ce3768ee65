// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use core::fmt;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use anyhow::anyhow;
use cid::Cid;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::CborStore;
use fvm_shared::address::{Address, Protocol, BLS_PUB_LEN};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PieceInfo;
use fvm_shared::randomness::RANDOMNESS_LENGTH;
use fvm_shared::sector::{RegisteredSealProof, SealVerifyInfo, WindowPoStVerifyInfo};
use fvm_shared::{ActorID, MethodNum};
use multihash::Code;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::runtime::builtins::Type;
use crate::runtime::{
    draw_randomness, ActorCode, ActorStateHandle, InvocInput, MessageInfo, Primitives, Runtime,
    SendOutcome, Verifier, EMPTY_ARR_CID,
};
use crate::test_blockstores::MemoryBlockstore;
use crate::{actor_error, ActorError, CRON_ACTOR_ADDR, INIT_ACTOR_ADDR};

/// A runtime that executes one actor method at a time against scripted expectations.
///
/// Tests set the caller, queue the validations, sends and actor creations they expect the
/// method to perform, invoke it with [`MockRuntime::call`] and finish with
/// [`MockRuntime::verify`].
pub struct MockRuntime {
    pub epoch: RefCell<ChainEpoch>,
    pub miner: Address,
    pub id_addresses: RefCell<HashMap<Address, Address>>,
    pub actor_code_cids: RefCell<HashMap<Address, Cid>>,
    pub new_actor_addr: RefCell<Option<Address>>,
    pub receiver: Address,
    pub caller: RefCell<Address>,
    pub caller_type: RefCell<Cid>,
    pub origin: Address,
    pub seed: [u8; RANDOMNESS_LENGTH],
    pub value_received: RefCell<TokenAmount>,
    pub hash_func: Box<dyn Fn(&[u8]) -> [u8; 32]>,

    // Actor State
    pub state: RefCell<Option<Cid>>,
    pub balance: RefCell<TokenAmount>,

    // VM Impl
    pub in_call: RefCell<bool>,
    pub store: Rc<MemoryBlockstore>,
    pub acquired: RefCell<Option<Cid>>,
    pub caller_validated: RefCell<bool>,

    // Expectations
    pub expectations: RefCell<Expectations>,
}

#[derive(Default)]
pub struct Expectations {
    pub expect_validate_caller_any: bool,
    pub expect_validate_caller_addr: Option<Vec<Address>>,
    pub expect_validate_caller_type: Option<Vec<Type>>,
    pub expect_sends: VecDeque<ExpectedMessage>,
    pub expect_create_actor: Option<ExpectCreateActor>,
}

impl Expectations {
    fn reset(&mut self) {
        *self = Default::default();
    }

    fn verify(&mut self) {
        assert!(!self.expect_validate_caller_any, "expected ValidateCallerAny, not received");
        assert!(
            self.expect_validate_caller_addr.is_none(),
            "expected ValidateCallerAddr {:?}, not received",
            self.expect_validate_caller_addr
        );
        assert!(
            self.expect_validate_caller_type.is_none(),
            "expected ValidateCallerType {:?}, not received",
            self.expect_validate_caller_type
        );
        assert!(
            self.expect_sends.is_empty(),
            "expected all message to be send, unsent messages {:?}",
            self.expect_sends
        );
        assert!(
            self.expect_create_actor.is_none(),
            "expected actor to be created, uncreated actor: {:?}",
            self.expect_create_actor
        );
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self {
            epoch: Default::default(),
            miner: Address::new_id(0),
            id_addresses: Default::default(),
            actor_code_cids: Default::default(),
            new_actor_addr: Default::default(),
            receiver: Address::new_id(0),
            caller: RefCell::new(Address::new_id(0)),
            caller_type: RefCell::new(Type::Account.code_cid()),
            origin: Address::new_id(0),
            seed: [0; RANDOMNESS_LENGTH],
            value_received: Default::default(),
            hash_func: Box::new(blake2b_256),
            state: Default::default(),
            balance: Default::default(),
            in_call: Default::default(),
            store: Default::default(),
            acquired: Default::default(),
            caller_validated: Default::default(),
            expectations: Default::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExpectCreateActor {
    pub code_id: Cid,
    pub address: Address,
}

#[derive(Clone, Debug)]
pub struct ExpectedMessage {
    pub to: Address,
    pub method: MethodNum,
    pub params: Option<IpldBlock>,
    pub value: TokenAmount,

    // returns from applying expectedMessage
    pub send_return: Option<IpldBlock>,
    pub exit_code: ExitCode,
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_simd::Params::new()
        .hash_length(32)
        .to_state()
        .update(data)
        .finalize()
        .as_bytes()
        .try_into()
        .unwrap()
}

/// Installs a logger honouring RUST_LOG. Safe to call from every test.
pub fn init_logging() -> Result<(), log::SetLoggerError> {
    pretty_env_logger::try_init()
}

/// A BLS address whose public key is `seed` repeated.
pub fn new_bls_addr(seed: u8) -> Address {
    Address::new_bls(&[seed; BLS_PUB_LEN]).unwrap()
}

pub fn expect_empty(res: Option<IpldBlock>) {
    assert!(res.is_none(), "expected empty return, got {:?}", res);
}

pub fn expect_abort_contains_message<T: fmt::Debug>(
    expect_exit_code: ExitCode,
    expect_msg: &str,
    res: Result<T, ActorError>,
) {
    let err = res.expect_err(&format!(
        "expected abort with exit code {}, but call succeeded",
        expect_exit_code
    ));
    assert_eq!(
        err.exit_code(),
        expect_exit_code,
        "expected failure with exit code {}, but failed with exit code {}; error message: {}",
        expect_exit_code,
        err.exit_code(),
        err.msg(),
    );
    assert!(
        err.msg().contains(expect_msg),
        "expected err message '{}' to contain '{}'",
        err.msg(),
        expect_msg,
    );
}

pub fn expect_abort<T: fmt::Debug>(exit_code: ExitCode, res: Result<T, ActorError>) {
    expect_abort_contains_message(exit_code, "", res);
}

impl MockRuntime {
    pub fn new(receiver: Address) -> Self {
        Self { receiver, ..Default::default() }
    }

    ///// Runtime access for tests /////

    pub fn get_state<T: DeserializeOwned>(&self) -> T {
        let root = self.state.borrow().expect("actor state not constructed");
        self.store_get(&root)
    }

    pub fn get_state_root(&self) -> Option<Cid> {
        *self.state.borrow()
    }

    pub fn replace_state<T: Serialize>(&self, obj: &T) {
        let root = self.store_put(obj);
        self.state.replace(Some(root));
    }

    pub fn set_balance(&self, amount: TokenAmount) {
        self.balance.replace(amount);
    }

    pub fn set_received(&self, amount: TokenAmount) {
        self.value_received.replace(amount);
    }

    pub fn set_epoch(&self, epoch: ChainEpoch) {
        self.epoch.replace(epoch);
    }

    pub fn set_caller(&self, code_id: Cid, address: Address) {
        self.caller.replace(address);
        self.caller_type.replace(code_id);
        self.actor_code_cids.borrow_mut().insert(address, code_id);
    }

    pub fn add_id_address(&self, source: Address, target: Address) {
        assert_eq!(target.protocol(), Protocol::ID, "target must use ID address protocol");
        self.id_addresses.borrow_mut().insert(source, target);
    }

    /// Invokes a method of actor `A`. State changes are discarded if the method aborts.
    pub fn call<A: ActorCode>(
        &self,
        method_num: MethodNum,
        params: Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError> {
        self.in_call.replace(true);
        self.caller_validated.replace(false);
        let prev_state = *self.state.borrow();
        let prev_balance = self.balance.borrow().clone();

        let res = A::invoke_method(self, method_num, params).and_then(|ret| {
            if self.acquired.borrow().is_some() {
                return Err(actor_error!(runtime_api; "method returned with unresolved state handle"));
            }
            if !*self.caller_validated.borrow() {
                return Err(actor_error!(runtime_api; "method returned without validating caller"));
            }
            Ok(ret)
        });

        if res.is_err() {
            self.state.replace(prev_state);
            self.balance.replace(prev_balance);
        }
        self.acquired.replace(None);
        self.in_call.replace(false);
        res
    }

    /// Verifies that all mock expectations have been met.
    pub fn verify(&self) {
        self.expectations.borrow_mut().verify()
    }

    /// Clears all mock expectations.
    pub fn reset(&self) {
        self.expectations.borrow_mut().reset();
    }

    ///// Mock expectations /////

    pub fn expect_validate_caller_addr(&self, addr: Vec<Address>) {
        assert!(!addr.is_empty(), "addrs must be non-empty");
        self.expectations.borrow_mut().expect_validate_caller_addr = Some(addr);
    }

    pub fn expect_validate_caller_type(&self, types: Vec<Type>) {
        assert!(!types.is_empty(), "types must be non-empty");
        self.expectations.borrow_mut().expect_validate_caller_type = Some(types);
    }

    pub fn expect_validate_caller_any(&self) {
        self.expectations.borrow_mut().expect_validate_caller_any = true;
    }

    pub fn expect_send(
        &self,
        to: Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
        send_return: Option<IpldBlock>,
        exit_code: ExitCode,
    ) {
        self.expectations.borrow_mut().expect_sends.push_back(ExpectedMessage {
            to,
            method,
            params,
            value,
            send_return,
            exit_code,
        })
    }

    pub fn expect_create_actor(&self, code_id: Cid, address: Address) {
        let a = ExpectCreateActor { code_id, address };
        self.expectations.borrow_mut().expect_create_actor = Some(a);
    }

    ///// Private helpers /////

    fn require_in_call(&self) {
        assert!(*self.in_call.borrow(), "invalid runtime invocation outside of method call")
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

    fn store_put<T: Serialize>(&self, o: &T) -> Cid {
        self.store.put_cbor(o, Code::Blake2b256).unwrap()
    }

    fn store_get<T: DeserializeOwned>(&self, cid: &Cid) -> T {
        self.store.get_cbor(cid).unwrap().unwrap()
    }
}

impl MessageInfo for MockRuntime {
    fn nonce(&self) -> u64 {
        0
    }
    fn caller(&self) -> Address {
        *self.caller.borrow()
    }
    fn origin(&self) -> Address {
        self.origin
    }
    fn receiver(&self) -> Address {
        self.receiver
    }
    fn value_received(&self) -> TokenAmount {
        self.value_received.borrow().clone()
    }
}

impl Runtime for MockRuntime {
    type Blockstore = Rc<MemoryBlockstore>;

    fn message(&self) -> &dyn MessageInfo {
        self.require_in_call();
        self
    }

    fn curr_epoch(&self) -> ChainEpoch {
        self.require_in_call();
        *self.epoch.borrow()
    }

    fn toplevel_block_winner(&self) -> Address {
        self.require_in_call();
        self.miner
    }

    fn current_balance(&self) -> TokenAmount {
        self.require_in_call();
        self.balance.borrow().clone()
    }

    fn get_randomness(
        &self,
        rand_epoch: ChainEpoch,
    ) -> Result<[u8; RANDOMNESS_LENGTH], ActorError> {
        self.require_in_call();
        let epoch = *self.epoch.borrow();
        if rand_epoch > epoch {
            return Err(actor_error!(illegal_argument;
                "cannot draw randomness from future epoch {} at {}", rand_epoch, epoch));
        }
        Ok(draw_randomness(|data| self.hash_blake2b(data), &self.seed, rand_epoch, &[]))
    }

    fn validate_immediate_caller_accept_any(&self) -> Result<(), ActorError> {
        self.require_in_call();
        self.mark_caller_validated()?;
        assert!(
            self.expectations.borrow().expect_validate_caller_any,
            "unexpected validate-caller-any"
        );
        self.expectations.borrow_mut().expect_validate_caller_any = false;
        Ok(())
    }

    fn validate_immediate_caller_is<'a, I>(&self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        self.require_in_call();
        self.mark_caller_validated()?;

        let addrs: Vec<Address> = addresses.into_iter().cloned().collect();
        let expected_addrs = self
            .expectations
            .borrow_mut()
            .expect_validate_caller_addr
            .take()
            .expect("unexpected validate caller addrs");
        assert_eq!(
            addrs, expected_addrs,
            "unexpected validate caller addrs {:?}, expected {:?}",
            addrs, expected_addrs
        );

        let caller = self.message().caller();
        if addrs.contains(&caller) {
            return Ok(());
        }
        Err(actor_error!(forbidden;
                "caller address {:?} forbidden, allowed: {:?}",
                caller, &addrs
        ))
    }

    fn validate_immediate_caller_type<'a, I>(&self, types: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Type>,
    {
        self.require_in_call();
        self.mark_caller_validated()?;

        let types: Vec<Type> = types.into_iter().cloned().collect();
        let expected_caller_type = self
            .expectations
            .borrow_mut()
            .expect_validate_caller_type
            .take()
            .expect("unexpected validate caller code");
        assert_eq!(
            types, expected_caller_type,
            "unexpected validate caller code {:?}, expected {:?}",
            types, expected_caller_type,
        );

        let caller_type = Type::from_code_cid(&self.caller_type.borrow());
        if caller_type.map_or(false, |t| types.contains(&t)) {
            return Ok(());
        }
        Err(actor_error!(forbidden; "caller type {:?} forbidden, allowed: {:?}",
                caller_type, types))
    }

    fn resolve_address(&self, address: &Address) -> Option<ActorID> {
        self.require_in_call();
        if let Ok(id) = address.id() {
            return Some(id);
        }
        self.id_addresses.borrow().get(address).and_then(|a| a.id().ok())
    }

    fn get_actor_code_cid(&self, addr: &Address) -> Option<Cid> {
        self.require_in_call();
        self.actor_code_cids.borrow().get(addr).cloned()
    }

    fn acquire_state(&self) -> Result<ActorStateHandle, ActorError> {
        self.require_in_call();
        self.require_no_handle("state acquired")?;
        let root = self.state.borrow().unwrap_or(*EMPTY_ARR_CID);
        self.acquired.replace(Some(root));
        Ok(ActorStateHandle::new(root))
    }

    fn release_state(&self, handle: ActorStateHandle, unchanged: &Cid) -> Result<(), ActorError> {
        self.require_in_call();
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
        self.require_in_call();
        let acquired = self
            .acquired
            .take()
            .ok_or_else(|| actor_error!(runtime_api; "update of state that was not acquired"))?;
        handle.check_unchanged(&acquired)?;
        self.state.replace(Some(*new_root));
        Ok(())
    }

    fn store(&self) -> &Rc<MemoryBlockstore> {
        &self.store
    }

    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
    ) -> Result<Option<IpldBlock>, ActorError> {
        self.require_in_call();
        self.require_no_handle("send")?;

        let expected_msg = self.expectations.borrow_mut().expect_sends.pop_front().unwrap_or_else(
            || {
                panic!(
                    "unexpected message to: {:?} method: {:?}, value: {:?}, params: {:?}",
                    to, method, value, params
                )
            },
        );

        assert!(
            expected_msg.to == *to
                && expected_msg.method == method
                && expected_msg.params == params
                && expected_msg.value == value,
            "message being sent does not match expectation.\n\
             Message  - to: {:?}, method: {:?}, value: {:?}, params: {:?}\n\
             Expected - to: {:?}, method: {:?}, value: {:?}, params: {:?}",
            to,
            method,
            value,
            params,
            expected_msg.to,
            expected_msg.method,
            expected_msg.value,
            expected_msg.params,
        );

        {
            let mut balance = self.balance.borrow_mut();
            if value > *balance {
                return Err(ActorError::unchecked(
                    ExitCode::SYS_INSUFFICIENT_FUNDS,
                    format!("cannot send value: {:?} exceeds balance: {:?}", value, *balance),
                ));
            }
            *balance -= value;
        }

        match expected_msg.exit_code {
            ExitCode::OK => Ok(expected_msg.send_return),
            x => Err(ActorError::unchecked(x, "expected message failure".to_string())),
        }
    }

    fn send_catching_errors(&self, input: InvocInput) -> Result<SendOutcome, ActorError> {
        self.require_in_call();
        if self.receiver != CRON_ACTOR_ADDR {
            return Err(actor_error!(forbidden; "only the cron actor may catch send errors"));
        }
        match self.send(&input.to, input.method, input.params, input.value) {
            Ok(return_data) => Ok(SendOutcome { exit_code: ExitCode::OK, return_data }),
            Err(e) => Ok(SendOutcome { exit_code: e.exit_code(), return_data: None }),
        }
    }

    fn new_actor_address(&self) -> Result<Address, ActorError> {
        self.require_in_call();
        let ret = self.new_actor_addr.take().expect("unexpected call to new actor address");
        Ok(ret)
    }

    fn create_actor(&self, code_id: Cid, address: &Address) -> Result<(), ActorError> {
        self.require_in_call();
        self.require_no_handle("create actor")?;
        if self.receiver != INIT_ACTOR_ADDR {
            return Err(actor_error!(forbidden; "only the init actor may create actors"));
        }
        let expect_create_actor = self
            .expectations
            .borrow_mut()
            .expect_create_actor
            .take()
            .expect("unexpected call to create actor");

        assert!(
            expect_create_actor.code_id == code_id && expect_create_actor.address == *address,
            "unexpected actor being created, expected code: {:?} address: {:?}, actual code: {:?} address: {:?}",
            expect_create_actor.code_id,
            expect_create_actor.address,
            code_id,
            address
        );
        self.actor_code_cids.borrow_mut().insert(*address, code_id);
        Ok(())
    }

    fn delete_actor(&self, addr: &Address) -> Result<(), ActorError> {
        self.require_in_call();
        self.require_no_handle("delete actor")?;
        if self.actor_code_cids.borrow_mut().remove(addr).is_none() {
            return Err(actor_error!(not_found; "actor {} does not exist", addr));
        }
        Ok(())
    }
}

impl Primitives for MockRuntime {
    fn hash_blake2b(&self, data: &[u8]) -> [u8; 32] {
        (*self.hash_func)(data)
    }

    fn compute_unsealed_sector_cid(
        &self,
        reg: RegisteredSealProof,
        pieces: &[PieceInfo],
    ) -> anyhow::Result<Cid> {
        Err(anyhow!("unexpected syscall to compute unsealed sector cid: {:?} {:?}", reg, pieces))
    }

    fn verify_signature(
        &self,
        signature: &Signature,
        signer: &Address,
        plaintext: &[u8],
    ) -> anyhow::Result<()> {
        Err(anyhow!(
            "unexpected signature verification sig: {:?}, signer: {}, plaintext: {}",
            signature,
            signer,
            hex::encode(plaintext)
        ))
    }
}

impl Verifier for MockRuntime {
    fn verify_seal(&self, seal: &SealVerifyInfo) -> anyhow::Result<()> {
        Err(anyhow!("unexpected syscall to verify seal for sector {}", seal.sector_id.number))
    }

    fn verify_post(&self, post: &WindowPoStVerifyInfo) -> anyhow::Result<()> {
        let sectors = post.challenged_sectors.len();
        Err(anyhow!("unexpected syscall to verify PoSt over {} sectors", sectors))
    }
}
