use itertools::Itertools;
use std::{cell::RefCell, fmt::Display, rc::Rc};

use regex::Regex;

/// Collects invariant violations without stopping at the first one.
///
/// Accumulators derived with [`MessageAccumulator::with_prefix`] share the same underlying
/// list, so nested checks report into the caller's accumulator.
#[derive(Clone, Debug, Default)]
pub struct MessageAccumulator {
    msgs: Rc<RefCell<Vec<String>>>,
    prefix: String,
}

impl MessageAccumulator {
    /// Returns an accumulator sharing this one's messages, prefixing everything it adds.
    pub fn with_prefix<S: AsRef<str>>(&self, prefix: S) -> Self {
        MessageAccumulator { msgs: self.msgs.clone(), prefix: self.prefix.clone() + prefix.as_ref() }
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.borrow().is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.msgs.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.msgs.borrow().len()
    }

    pub fn add<S: AsRef<str>>(&self, msg: S) {
        self.msgs.borrow_mut().push(format!("{}{}", self.prefix, msg.as_ref()));
    }

    /// Copies every message from `other`, under this accumulator's prefix.
    pub fn add_all(&self, other: &MessageAccumulator) {
        other.messages().iter().for_each(|msg| self.add(msg))
    }

    /// Records `msg` unless `predicate` holds.
    pub fn require<S: AsRef<str>>(&self, predicate: bool, msg: S) {
        if !predicate {
            self.add(msg);
        }
    }

    /// Records `msg` with the error appended if `result` is an error.
    pub fn require_no_error<V, E: Display, S: AsRef<str>>(&self, result: Result<V, E>, msg: S) {
        if let Err(e) = result {
            self.add(format!("{}: {e}", msg.as_ref()));
        }
    }

    /// Panics listing every message if any were recorded.
    #[track_caller]
    pub fn assert_empty(&self) {
        assert!(self.is_empty(), "{}", self.messages().join("\n"))
    }

    /// Asserts the messages match `expected_patterns` one to one, in order.
    #[track_caller]
    pub fn assert_expected(&self, expected_patterns: &[Regex]) {
        let messages = self.messages();
        assert!(
            messages.len() == expected_patterns.len(),
            "Incorrect number of accumulator messages. Actual: {}.\nExpected: {}",
            messages.join("\n"),
            expected_patterns.iter().map(|regex| regex.as_str()).join("\n")
        );

        for (message, pattern) in messages.iter().zip(expected_patterns) {
            assert!(
                pattern.is_match(message),
                "message does not match. Actual: {}, expected: {}",
                message,
                pattern.as_str()
            );
        }
    }
}
