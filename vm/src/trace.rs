// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::{ActorID, MethodNum};

/// A trace of an actor method invocation.
#[derive(Clone, Debug)]
pub struct InvocationTrace {
    pub from: ActorID,
    pub to: Address,
    pub value: TokenAmount,
    pub method: MethodNum,
    pub params: Option<IpldBlock>,
    pub exit_code: ExitCode,
    pub return_value: Option<IpldBlock>,
    pub subinvocations: Vec<InvocationTrace>,
}

impl InvocationTrace {
    /// The (receiver, method, exit code) of each direct subinvocation, in call order.
    pub fn calls(&self) -> Vec<(Address, MethodNum, ExitCode)> {
        self.subinvocations.iter().map(|s| (s.to, s.method, s.exit_code)).collect()
    }
}
