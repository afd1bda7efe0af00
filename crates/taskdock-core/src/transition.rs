//! Status-transition reducer.
//!
//! A task's status only moves forward along the `Closed -> Loading ->
//! Running -> Served` order; the single backward edge is to `Closed`.
//! Every delta from every source (command result, probe result, push
//! event) passes through [`admit`] before it touches the registry, so the
//! merge policy is testable without any I/O.

use crate::Status;

/// Verdict on a proposed status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The status moves forward (or resets to `Closed`).
    Advance,
    /// Same status as before; applying it is an idempotent no-op.
    Same,
    /// A backward move to a non-`Closed` status; must be ignored.
    Rejected,
}

fn rank(status: Status) -> u8 {
    match status {
        Status::Closed => 0,
        Status::Loading => 1,
        Status::Running => 2,
        Status::Served => 3,
    }
}

/// Decide whether `proposed` may replace `current`.
pub fn admit(current: Status, proposed: Status) -> Admission {
    if proposed == current {
        Admission::Same
    } else if proposed == Status::Closed || rank(proposed) > rank(current) {
        Admission::Advance
    } else {
        Admission::Rejected
    }
}
