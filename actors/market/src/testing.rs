use std::collections::{BTreeSet, HashSet};

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::clock::{ChainEpoch, EPOCH_UNDEFINED};
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use fil_core_runtime::{ActorContext, ActorError, MessageAccumulator, SetMultimap};

use crate::balance_table::BalanceTable;
use crate::{deal_cid, State, DEAL_OPS_BY_EPOCH_CONFIG};

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct StateSummary {
    pub proposal_count: u64,
    pub pending_proposal_count: u64,
    pub deal_state_count: u64,
    pub lock_table_count: u64,
    pub deal_op_epoch_count: u64,
    pub deal_op_count: u64,
}

/// Checks internal invariants of market state.
///
/// Violations are collected in the returned accumulator and checking carries on past them.
/// An error is returned only when the state cannot be read from the store at all.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
) -> Result<(StateSummary, MessageAccumulator), ActorError> {
    let acc = MessageAccumulator::default();

    acc.require(
        !state.total_client_locked_collateral.is_negative(),
        format!(
            "negative total client locked collateral: {}",
            state.total_client_locked_collateral
        ),
    );
    acc.require(
        !state.total_provider_locked_collateral.is_negative(),
        format!(
            "negative total provider locked collateral: {}",
            state.total_provider_locked_collateral
        ),
    );
    acc.require(
        !state.total_client_storage_fee.is_negative(),
        format!("negative total client storage fee: {}", state.total_client_storage_fee),
    );

    // Proposals
    let mut all_ids = BTreeSet::<DealID>::new();
    let mut proposal_cids = HashSet::<Cid>::new();
    let mut max_deal_id: Option<DealID> = None;
    let mut proposal_count = 0;

    let proposals = state.load_proposals(store).context("loading proposals")?;
    proposals
        .for_each(|deal_id, proposal| {
            all_ids.insert(deal_id);
            let proposal_cid = deal_cid(proposal)?;

            acc.require(
                proposal_cids.insert(proposal_cid),
                format!("duplicate DealProposal {deal_id} found in proposals"),
            );

            max_deal_id = max_deal_id.max(Some(deal_id));
            proposal_count += 1;
            Ok(())
        })
        .context("iterating proposals")?;

    // next id should be higher than any existing deal
    if let Some(max_deal_id) = max_deal_id {
        acc.require(
            state.next_id > max_deal_id,
            format!(
                "next id, {}, is not greater than highest id in proposals, {max_deal_id}",
                state.next_id
            ),
        );
    }

    // deal states
    let mut deal_state_count = 0;
    let deal_states = state.load_deal_states(store).context("loading deal states")?;
    deal_states
        .for_each(|deal_id, deal_state| {
            acc.require(
                deal_state.sector_start_epoch >= 0,
                format!("deal state start epoch undefined {deal_id}: {deal_state:?}"),
            );
            acc.require(
                deal_state.last_updated_epoch == EPOCH_UNDEFINED
                    || deal_state.last_updated_epoch >= deal_state.sector_start_epoch,
                format!("deal state last updated before sector start {deal_id}: {deal_state:?}"),
            );
            acc.require(
                deal_state.slash_epoch == EPOCH_UNDEFINED
                    || deal_state.slash_epoch >= deal_state.sector_start_epoch,
                format!("deal state slashed before sector start {deal_id}: {deal_state:?}"),
            );
            acc.require(
                all_ids.contains(&deal_id),
                format!("deal state references deal {deal_id} not found in proposals"),
            );

            deal_state_count += 1;
            Ok(())
        })
        .context("iterating deal states")?;

    // pending proposals
    let mut pending_proposal_count = 0;
    let pending_proposals =
        state.load_pending_proposals(store).context("loading pending proposals")?;
    pending_proposals
        .for_each(|proposal_cid, pending_proposal| {
            let pcid = deal_cid(pending_proposal)?;
            acc.require(
                pcid == proposal_cid,
                format!("pending proposal's key does not match its CID {pcid} != {proposal_cid}"),
            );
            acc.require(
                proposal_cids.contains(&pcid),
                format!("pending proposal with cid {pcid} not found within proposals"),
            );

            pending_proposal_count += 1;
            Ok(())
        })
        .context("iterating pending proposals")?;

    // escrow table and locked table
    let mut lock_table_count = 0;
    let escrow_table = BalanceTable::from_root(store, &state.escrow_table, "escrow table")
        .context("loading escrow table")?;
    let lock_table = BalanceTable::from_root(store, &state.locked_table, "locked table")
        .context("loading locked table")?;

    let mut locked_total = TokenAmount::zero();
    lock_table
        .0
        .for_each(|address, locked_amount| {
            locked_total += locked_amount;

            // every entry in locked table should have a corresponding entry in escrow table that is at least as high
            let escrow_amount = escrow_table.get(&address)?;
            acc.require(
                &escrow_amount >= locked_amount,
                format!(
                    "locked funds for {address}, {locked_amount}, greater than escrow amount, {escrow_amount}"
                ),
            );

            lock_table_count += 1;
            Ok(())
        })
        .context("iterating locked table")?;

    // lockTable total should be sum of client and provider locked plus client storage fee
    let expected_lock_total = state.get_total_locked();
    acc.require(
        locked_total == expected_lock_total,
        format!(
            "locked total, {locked_total}, does not sum to provider locked, {}, client locked, {}, and client storage fee, {}",
            state.total_provider_locked_collateral,
            state.total_client_locked_collateral,
            state.total_client_storage_fee
        ),
    );

    // deal ops by epoch, with outer keys read raw so malformed epochs are reported, not fatal
    let (mut deal_op_epoch_count, mut deal_op_count) = (0, 0);
    let deal_ops = SetMultimap::<_, Vec<u8>, DealID>::load(
        store,
        &state.deal_ops_by_epoch,
        DEAL_OPS_BY_EPOCH_CONFIG,
        "deal ops",
    )
    .context("loading deal ops")?;
    deal_ops
        .for_each(|key, deal_ids| {
            let epoch = parse_epoch_key(&key);
            acc.require(
                epoch.is_some(),
                format!(
                    "deal ops has key that is not a natural number: {}",
                    String::from_utf8_lossy(&key)
                ),
            );
            let epoch = epoch.unwrap_or_default();

            deal_op_epoch_count += 1;
            deal_ids.for_each(|deal_id| {
                acc.require(
                    all_ids.contains(&deal_id),
                    format!("deal op found for deal id {deal_id} with missing proposal at epoch {epoch}"),
                );
                deal_op_count += 1;
                Ok(())
            })
        })
        .context("iterating deal ops")?;

    Ok((
        StateSummary {
            proposal_count,
            pending_proposal_count,
            deal_state_count,
            lock_table_count,
            deal_op_epoch_count,
            deal_op_count,
        },
        acc,
    ))
}

/// Parses a deal-op schedule key as a non-negative decimal epoch.
fn parse_epoch_key(key: &[u8]) -> Option<ChainEpoch> {
    std::str::from_utf8(key)
        .ok()
        .and_then(|s| s.parse::<ChainEpoch>().ok())
        .filter(|epoch| *epoch >= 0)
}
