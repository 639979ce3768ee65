// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::rc::Rc;

use anyhow::anyhow;
use clap::Parser;
use fil_core_actor_init::State as InitState;
use fil_core_runtime::runtime::Primitives;
use fil_core_runtime::test_blockstores::MemoryBlockstore;
use fil_core_runtime::INIT_ACTOR_ADDR;
use fil_core_vm::{
    check_state_invariants, create_accounts, FakePrimitives, GenesisConfig, TEST_VM_RAND_ARRAY, VM,
};
use fvm_shared::econ::TokenAmount;

#[derive(Parser)]
#[clap(name = env!("CARGO_PKG_NAME"))]
#[clap(version = env!("CARGO_PKG_VERSION"))]
#[clap(about = "Boots a genesis state, advances it through Cron and checks its invariants.", long_about = None)]
struct Cli {
    /// Network name recorded by the Init actor
    #[clap(short, long, default_value = "localnet")]
    network_name: String,

    /// Number of epochs to tick
    #[clap(short, long, default_value_t = 10)]
    epochs: i64,

    /// Chain randomness seed. The fixed test seed is used when absent.
    #[clap(short, long)]
    seed: Option<u64>,

    /// Number of funded accounts to create before ticking
    #[clap(short, long, default_value_t = 3)]
    accounts: u64,
}

fn seed_bytes(seed: Option<u64>) -> [u8; 32] {
    match seed {
        Some(seed) => FakePrimitives.hash_blake2b(&seed.to_be_bytes()),
        None => TEST_VM_RAND_ARRAY,
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = GenesisConfig {
        network_name: cli.network_name.clone(),
        seed: seed_bytes(cli.seed),
        ..Default::default()
    };
    let total = config.reward_balance.clone();
    let v = VM::new_with_genesis(Rc::new(MemoryBlockstore::new()), config)?;
    log::info!("genesis state root {}", v.state_root()?);

    let accounts = create_accounts(&v, cli.accounts, &TokenAmount::from_whole(100))?;
    log::info!("created accounts {:?}", accounts);

    for epoch in 1..=cli.epochs {
        let res = v.cron_tick(epoch)?;
        if !res.code.is_success() {
            return Err(anyhow!("cron tick at epoch {} failed: {} {}", epoch, res.code, res.message));
        }
        log::debug!("epoch {} state root {}", epoch, v.state_root()?);
    }

    let init: InitState = v.get_state(&INIT_ACTOR_ADDR)?;
    println!("network:    {}", init.network_name);
    println!("epochs:     {}", cli.epochs);
    println!("next id:    {}", init.next_id);
    println!("state root: {}", v.state_root()?);

    let acc = check_state_invariants(&v, Some(total))?;
    if acc.is_empty() {
        println!("invariants: ok");
        return Ok(());
    }
    for msg in acc.messages() {
        println!("violation:  {}", msg);
    }
    Err(anyhow!("{} invariant violations", acc.len()))
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    run(&cli)
}
