// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Actors at the boundary of the core.
//!
//! These implement only the methods Init, Cron and the tests call on them, with the same
//! caller validation and state discipline as the core actors.

pub use self::account::Actor as AccountActor;
pub use self::chaos::Actor as ChaosActor;
pub use self::miner::Actor as MinerActor;
pub use self::paych::Actor as PaychActor;
pub use self::power::Actor as PowerActor;
pub use self::system::Actor as SystemActor;

pub mod account;
pub mod chaos;
pub mod miner;
pub mod paych;
pub mod power;
pub mod system;
