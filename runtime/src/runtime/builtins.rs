// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_encoding::IPLD_RAW;
use multihash::{Code, MultihashDigest};
use num_derive::FromPrimitive;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// The closed set of actor types this core executes.
///
/// Each type is identified on chain by a code CID derived from its name, so the set can be
/// resolved in both directions without a manifest.
#[derive(
    PartialEq,
    Eq,
    Clone,
    Copy,
    PartialOrd,
    Ord,
    FromPrimitive,
    Debug,
    Deserialize_repr,
    Hash,
    Serialize_repr,
)]
#[repr(i32)]
pub enum Type {
    System = 1,
    Init = 2,
    Cron = 3,
    Account = 4,
    Power = 5,
    Miner = 6,
    Market = 7,
    PaymentChannel = 8,
    Chaos = 9,
}

pub const ALL_TYPES: &[Type] = &[
    Type::System,
    Type::Init,
    Type::Cron,
    Type::Account,
    Type::Power,
    Type::Miner,
    Type::Market,
    Type::PaymentChannel,
    Type::Chaos,
];

impl Type {
    pub fn name(&self) -> &'static str {
        match *self {
            Type::System => "system",
            Type::Init => "init",
            Type::Cron => "cron",
            Type::Account => "account",
            Type::Power => "storagepower",
            Type::Miner => "storageminer",
            Type::Market => "storagemarket",
            Type::PaymentChannel => "paymentchannel",
            Type::Chaos => "chaos",
        }
    }

    /// The code CID under which actors of this type are installed.
    pub fn code_cid(&self) -> Cid {
        let tag = format!("fil/core/{}", self.name());
        Cid::new_v1(IPLD_RAW, Code::Identity.digest(tag.as_bytes()))
    }

    /// Resolves a code CID back to its actor type, if it is one of ours.
    pub fn from_code_cid(code: &Cid) -> Option<Type> {
        ALL_TYPES.iter().copied().find(|t| t.code_cid() == *code)
    }

    /// Singleton actors exist once, at a fixed ID assigned at genesis.
    pub fn is_singleton_actor(&self) -> bool {
        matches!(self, Type::System | Type::Init | Type::Cron | Type::Power | Type::Market)
    }
}

impl TryFrom<&str> for Type {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ALL_TYPES
            .iter()
            .copied()
            .find(|t| t.name() == value)
            .ok_or_else(|| format!("unrecognized actor type {}", value))
    }
}
