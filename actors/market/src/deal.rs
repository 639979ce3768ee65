// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fil_core_runtime::ActorError;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::DAG_CBOR;
use fvm_shared::address::Address;
use fvm_shared::clock::{ChainEpoch, EPOCH_UNDEFINED};
use fvm_shared::econ::TokenAmount;
use fvm_shared::piece::PaddedPieceSize;
use multihash::{Code, MultihashDigest};

/// Note: Deal Collateral is only released and returned to clients and miners
/// when the storage deal stops counting towards power. In the current iteration,
/// it will be released when the sector containing the storage deals expires,
/// even though some storage deals can expire earlier than the sector does.
/// Collaterals are denominated in PerEpoch to incur a cost for self dealing or
/// minimal deals that last for a long time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct DealProposal {
    pub piece_cid: Cid,
    pub piece_size: PaddedPieceSize,
    pub verified_deal: bool,
    pub client: Address,
    pub provider: Address,

    /// Arbitrary client chosen label to apply to the deal
    pub label: String,

    // Nominal start epoch. Deal payment is linear between StartEpoch and EndEpoch,
    // with total amount StoragePricePerEpoch * (EndEpoch - StartEpoch).
    // Storage deal must appear in a sealed (proven) sector no later than StartEpoch,
    // otherwise it is invalid.
    pub start_epoch: ChainEpoch,
    pub end_epoch: ChainEpoch,
    pub storage_price_per_epoch: TokenAmount,

    pub provider_collateral: TokenAmount,
    pub client_collateral: TokenAmount,
}

impl DealProposal {
    pub fn duration(&self) -> ChainEpoch {
        self.end_epoch - self.start_epoch
    }

    pub fn total_storage_fee(&self) -> TokenAmount {
        TokenAmount::from_atto(self.storage_price_per_epoch.atto() * self.duration())
    }

    pub fn client_balance_requirement(&self) -> TokenAmount {
        self.client_collateral.clone() + self.total_storage_fee()
    }

    pub fn provider_balance_requirement(&self) -> &TokenAmount {
        &self.provider_collateral
    }

    /// The content identifier of this proposal, which pending proposals are keyed by.
    pub fn cid(&self) -> Result<Cid, ActorError> {
        deal_cid(self)
    }
}

/// DealState records the lifecycle of a deal once its sector is committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct DealState {
    // -1 if not yet included in proven sector
    pub sector_start_epoch: ChainEpoch,
    // -1 if deal state never updated
    pub last_updated_epoch: ChainEpoch,
    // -1 if deal never slashed
    pub slash_epoch: ChainEpoch,
}

impl Default for DealState {
    fn default() -> Self {
        Self {
            sector_start_epoch: EPOCH_UNDEFINED,
            last_updated_epoch: EPOCH_UNDEFINED,
            slash_epoch: EPOCH_UNDEFINED,
        }
    }
}

/// Computes a deal proposal's CID: Blake2b-256 over its CBOR encoding, as DAG-CBOR CIDv1.
pub fn deal_cid(proposal: &DealProposal) -> Result<Cid, ActorError> {
    let data = fvm_ipld_encoding::to_vec(proposal).map_err(|e| {
        ActorError::serialization(format!("failed to serialize deal proposal: {}", e))
    })?;
    let hash = Code::Blake2b256.digest(&data);
    Ok(Cid::new_v1(DAG_CBOR, hash))
}
