// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::{anyhow, bail};
use fil_core_actor_cron::State as CronState;
use fil_core_actor_init::State as InitState;
use fil_core_actor_market::State as MarketState;
use fil_core_runtime::{MessageAccumulator, Type, FIRST_NON_SINGLETON_ADDR};
use fvm_ipld_encoding::CborStore;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::econ::TokenAmount;

use fil_core_actor_cron::testing as cron;
use fil_core_actor_init::testing as init;
use fil_core_actor_market::testing as market;

use crate::{ActorState, VM};

macro_rules! get_state {
    ($store:expr, $actor:ident, $state:ty) => {
        $store
            .get_cbor::<$state>(&$actor.state)?
            .ok_or_else(|| anyhow!("{} is empty", stringify!($state)))?
    };
}

/// Runs the state checkers of every Init, Cron and Market actor in the tree, then checks
/// the tree as a whole against their summaries.
///
/// Violations are accumulated. An error is returned only when state cannot be read at all.
pub fn check_state_invariants(
    v: &VM,
    expected_balance_total: Option<TokenAmount>,
) -> anyhow::Result<MessageAccumulator> {
    let acc = MessageAccumulator::default();
    let mut total_fil = TokenAmount::default();
    let mut ids = Vec::<Address>::new();

    let mut init_summary: Option<init::StateSummary> = None;
    let mut cron_state: Option<CronState> = None;

    let mut actors = Vec::<(Address, ActorState)>::new();
    v.for_each_actor(|addr, actor| actors.push((addr, actor.clone())))?;

    for (key, actor) in actors {
        let acc = acc.with_prefix(format!("{key} "));
        if key.protocol() != Protocol::ID {
            acc.add(format!("unexpected address protocol in state tree root: {key}"));
        }
        total_fil += &actor.balance;
        ids.push(key);

        match Type::from_code_cid(&actor.code) {
            Some(Type::Init) => {
                let state = get_state!(v.store, actor, InitState);
                let (summary, msgs) = init::check_state_invariants(&state, &*v.store);
                acc.with_prefix("init: ").add_all(&msgs);
                init_summary = Some(summary);
            }
            Some(Type::Cron) => {
                let state = get_state!(v.store, actor, CronState);
                let (_, msgs) = cron::check_state_invariants(&state);
                acc.with_prefix("cron: ").add_all(&msgs);
                cron_state = Some(state);
            }
            Some(Type::Market) => {
                let state = get_state!(v.store, actor, MarketState);
                let (_, msgs) = market::check_state_invariants(&state, &*v.store)?;
                acc.with_prefix("market: ").add_all(&msgs);
            }
            Some(_) => {}
            None => bail!("unexpected actor code CID {} for address {}", actor.code, key),
        }
    }

    if let Some(summary) = init_summary {
        check_ids_against_init(&acc, &ids, &summary);
    }
    if let Some(state) = cron_state {
        check_cron_against_tree(&acc, &ids, &state);
    }
    if let Some(expected_balance_total) = expected_balance_total {
        acc.require(
            total_fil == expected_balance_total,
            format!("total token balance is {total_fil}, expected {expected_balance_total}"),
        );
    }

    Ok(acc)
}

fn check_ids_against_init(acc: &MessageAccumulator, ids: &[Address], summary: &init::StateSummary) {
    let acc = acc.with_prefix("init: ");
    for addr in ids {
        if let Ok(id) = addr.id() {
            acc.require(
                id < FIRST_NON_SINGLETON_ADDR || id < summary.next_id,
                format!("actor {addr} has an ID not yet allocated, next id is {}", summary.next_id),
            );
        }
    }
}

fn check_cron_against_tree(acc: &MessageAccumulator, ids: &[Address], state: &CronState) {
    let acc = acc.with_prefix("cron: ");
    for entry in &state.entries {
        acc.require(
            ids.contains(&entry.receiver),
            format!("entry receiver {} is not in the state tree", entry.receiver),
        );
    }
}
