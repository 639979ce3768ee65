use fil_core_runtime::MessageAccumulator;
use fvm_shared::address::Protocol;
use fvm_shared::METHOD_CONSTRUCTOR;

use crate::State;

pub struct StateSummary {
    pub entry_count: usize,
}

/// Checks internal invariants of cron state.
pub fn check_state_invariants(state: &State) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();
    state.entries.iter().enumerate().for_each(|(i, e)| {
        acc.require(
            e.receiver.protocol() == Protocol::ID,
            format!("entry {i} receiver address {} must be ID protocol", e.receiver),
        );
        acc.require(
            e.method_num != METHOD_CONSTRUCTOR,
            format!("entry {i} calls the constructor of {}", e.receiver),
        );
    });
    (StateSummary { entry_count: state.entries.len() }, acc)
}
