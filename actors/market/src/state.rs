// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::clock::{ChainEpoch, EPOCH_UNDEFINED};
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;

use fil_core_runtime::{
    actor_error, ActorError, Array, Config, Map2, MapKey, SetMultimap, SetMultimapConfig,
    DEFAULT_HAMT_CONFIG,
};

use crate::balance_table::BalanceTable;
use crate::deal::{deal_cid, DealProposal, DealState};

pub const PROPOSALS_AMT_BITWIDTH: u32 = 5;
pub const STATES_AMT_BITWIDTH: u32 = 6;

pub type DealArray<BS> = Array<BS, DealProposal>;
pub type DealMetaArray<BS> = Array<BS, DealState>;

pub type PendingProposalsMap<BS> = Map2<BS, Cid, DealProposal>;
pub const PENDING_PROPOSALS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type DealOpsByEpoch<BS> = SetMultimap<BS, EpochKey, DealID>;
pub const DEAL_OPS_BY_EPOCH_CONFIG: SetMultimapConfig =
    SetMultimapConfig { outer: DEFAULT_HAMT_CONFIG, inner: DEFAULT_HAMT_CONFIG };

pub enum Reason {
    ClientCollateral,
    ClientStorageFee,
    ProviderCollateral,
}

/// Deal-op schedule key: an epoch, stored as its decimal ASCII representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct EpochKey(pub ChainEpoch);

impl MapKey for EpochKey {
    fn from_bytes(b: &[u8]) -> Result<Self, String> {
        let s = std::str::from_utf8(b).map_err(|e| e.to_string())?;
        s.parse::<ChainEpoch>().map(EpochKey).map_err(|e| format!("epoch key {:?}: {}", s, e))
    }

    fn to_bytes(&self) -> Result<Vec<u8>, String> {
        Ok(self.0.to_string().into_bytes())
    }
}

/// Market actor state
#[derive(Clone, Serialize_tuple, Deserialize_tuple, Debug, PartialEq, Eq)]
pub struct State {
    /// Proposals are deals that have been proposed and not yet cleaned up after expiry or termination.
    /// Array<DealID, DealProposal>
    pub proposals: Cid,

    // States contains state for deals that have been activated and not yet cleaned up after expiry or termination.
    // After expiration, the state exists until the proposal is cleaned up too.
    // Invariant: keys(States) ⊆ keys(Proposals).
    /// Array<DealID, DealState>
    pub states: Cid,

    /// PendingProposals tracks dealProposals that have not yet reached their deal start date.
    /// We track them here to ensure that miners can't publish the same deal proposal twice
    /// Map<CID, DealProposal>
    pub pending_proposals: Cid,

    /// Total amount held in escrow, indexed by actor address (including both locked and unlocked amounts).
    pub escrow_table: Cid,

    /// Amount locked, indexed by actor address.
    /// Note: the amounts in this table do not affect the overall amount in escrow:
    /// only the _portion_ of the total escrow amount that is locked.
    pub locked_table: Cid,

    /// Deal id state sequential incrementer
    pub next_id: DealID,

    /// Metadata cached for efficient iteration over deals.
    /// SetMultimap<Epoch, DealID>
    pub deal_ops_by_epoch: Cid,
    pub last_cron: ChainEpoch,

    /// Total Client Collateral that is locked -> unlocked when deal is terminated
    pub total_client_locked_collateral: TokenAmount,
    /// Total Provider Collateral that is locked -> unlocked when deal is terminated
    pub total_provider_locked_collateral: TokenAmount,
    /// Total storage fee that is locked in escrow -> unlocked when payments are made
    pub total_client_storage_fee: TokenAmount,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS) -> Result<Self, ActorError> {
        let empty_proposals_array =
            DealArray::empty(store, PROPOSALS_AMT_BITWIDTH, "proposals").flush()?;
        let empty_states_array = DealMetaArray::empty(store, STATES_AMT_BITWIDTH, "states").flush()?;
        let empty_pending_proposals =
            PendingProposalsMap::empty(store, PENDING_PROPOSALS_CONFIG, "pending proposals")
                .flush()?;
        let empty_balance_table = BalanceTable::new(store, "balance table").root()?;
        let empty_deal_ops =
            DealOpsByEpoch::empty(store, DEAL_OPS_BY_EPOCH_CONFIG, "deal ops").flush()?;

        Ok(Self {
            proposals: empty_proposals_array,
            states: empty_states_array,
            pending_proposals: empty_pending_proposals,
            escrow_table: empty_balance_table,
            locked_table: empty_balance_table,
            next_id: 0,
            deal_ops_by_epoch: empty_deal_ops,
            last_cron: EPOCH_UNDEFINED,
            total_client_locked_collateral: TokenAmount::default(),
            total_provider_locked_collateral: TokenAmount::default(),
            total_client_storage_fee: TokenAmount::default(),
        })
    }

    pub fn get_total_locked(&self) -> TokenAmount {
        &self.total_client_locked_collateral
            + &self.total_provider_locked_collateral
            + &self.total_client_storage_fee
    }

    pub fn load_proposals<'bs, BS>(&self, store: &'bs BS) -> Result<DealArray<&'bs BS>, ActorError>
    where
        BS: Blockstore,
    {
        DealArray::load(store, &self.proposals, "proposals")
    }

    pub fn load_deal_states<'bs, BS>(
        &self,
        store: &'bs BS,
    ) -> Result<DealMetaArray<&'bs BS>, ActorError>
    where
        BS: Blockstore,
    {
        DealMetaArray::load(store, &self.states, "states")
    }

    pub fn load_pending_proposals<'bs, BS>(
        &self,
        store: &'bs BS,
    ) -> Result<PendingProposalsMap<&'bs BS>, ActorError>
    where
        BS: Blockstore,
    {
        PendingProposalsMap::load(
            store,
            &self.pending_proposals,
            PENDING_PROPOSALS_CONFIG,
            "pending proposals",
        )
    }

    pub fn load_deal_ops<'bs, BS>(
        &self,
        store: &'bs BS,
    ) -> Result<DealOpsByEpoch<&'bs BS>, ActorError>
    where
        BS: Blockstore,
    {
        DealOpsByEpoch::load(store, &self.deal_ops_by_epoch, DEAL_OPS_BY_EPOCH_CONFIG, "deal ops")
    }

    pub fn generate_storage_deal_id(&mut self) -> DealID {
        let ret = self.next_id;
        self.next_id += 1;
        ret
    }

    /// Stores a proposal under a freshly allocated deal ID, returning the ID.
    pub fn put_proposal<BS: Blockstore>(
        &mut self,
        store: &BS,
        proposal: DealProposal,
    ) -> Result<DealID, ActorError> {
        let id = self.generate_storage_deal_id();
        let mut proposals = self.load_proposals(store)?;
        proposals.set(id, proposal)?;
        self.proposals = proposals.flush()?;
        Ok(id)
    }

    pub fn put_deal_state<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_id: DealID,
        deal_state: DealState,
    ) -> Result<(), ActorError> {
        let mut states = self.load_deal_states(store)?;
        states.set(deal_id, deal_state)?;
        self.states = states.flush()?;
        Ok(())
    }

    /// Records a proposal as pending under its own CID, which is returned.
    pub fn put_pending_proposal<BS: Blockstore>(
        &mut self,
        store: &BS,
        proposal: DealProposal,
    ) -> Result<Cid, ActorError> {
        let cid = deal_cid(&proposal)?;
        let mut pending = self.load_pending_proposals(store)?;
        if !pending.set_if_absent(&cid, proposal)? {
            return Err(actor_error!(illegal_argument, "deal proposal {} is already pending", cid));
        }
        self.pending_proposals = pending.flush()?;
        Ok(cid)
    }

    pub fn has_pending_proposal<BS: Blockstore>(
        &self,
        store: &BS,
        key: &Cid,
    ) -> Result<bool, ActorError> {
        self.load_pending_proposals(store)?.contains_key(key)
    }

    /// Schedules `deal_id` for processing at `epoch`.
    pub fn put_deal_op<BS: Blockstore>(
        &mut self,
        store: &BS,
        epoch: ChainEpoch,
        deal_id: DealID,
    ) -> Result<(), ActorError> {
        let mut deal_ops = self.load_deal_ops(store)?;
        deal_ops.put(&EpochKey(epoch), deal_id)?;
        self.deal_ops_by_epoch = deal_ops.flush()?;
        Ok(())
    }

    /// Drops the deal-op schedule of every epoch after `last_cron` up to and including `epoch`,
    /// then records `epoch` as processed.
    pub fn clear_deal_ops_through<BS: Blockstore>(
        &mut self,
        store: &BS,
        epoch: ChainEpoch,
    ) -> Result<(), ActorError> {
        let mut deal_ops = self.load_deal_ops(store)?;
        for e in (self.last_cron + 1).max(0)..=epoch {
            deal_ops.remove_all(&EpochKey(e))?;
        }
        self.deal_ops_by_epoch = deal_ops.flush()?;
        self.last_cron = self.last_cron.max(epoch);
        Ok(())
    }

    pub fn add_balance_to_escrow_table<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
        amount: &TokenAmount,
    ) -> Result<(), ActorError> {
        let mut escrow_table = BalanceTable::from_root(store, &self.escrow_table, "escrow table")?;
        escrow_table.add(addr, amount)?;
        self.escrow_table = escrow_table.root()?;
        Ok(())
    }

    /// Locks `amount` of `addr`'s escrow for `lock_reason`, updating the matching aggregate.
    pub fn lock_balance<BS: Blockstore>(
        &mut self,
        store: &BS,
        addr: &Address,
        amount: &TokenAmount,
        lock_reason: Reason,
    ) -> Result<(), ActorError> {
        if amount.is_negative() {
            return Err(actor_error!(illegal_state, "cannot lock negative amount {}", amount));
        }

        let escrow_table = BalanceTable::from_root(store, &self.escrow_table, "escrow table")?;
        let mut locked_table = BalanceTable::from_root(store, &self.locked_table, "locked table")?;

        let prev_locked = locked_table.get(addr)?;
        let escrow_balance = escrow_table.get(addr)?;
        if &prev_locked + amount > escrow_balance {
            return Err(actor_error!(insufficient_funds;
                    "not enough balance to lock for addr{}: \
                    escrow balance {} < prev locked {} + amount {}",
                    addr, escrow_balance, prev_locked, amount));
        }

        locked_table.add(addr, amount)?;
        self.locked_table = locked_table.root()?;

        match lock_reason {
            Reason::ClientCollateral => self.total_client_locked_collateral += amount,
            Reason::ClientStorageFee => self.total_client_storage_fee += amount,
            Reason::ProviderCollateral => self.total_provider_locked_collateral += amount,
        };
        Ok(())
    }
}
