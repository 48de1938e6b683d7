//! Audit result statuses.
//!
//! Each result node settles on one status from a small closed set. The
//! set forms a ladder: a parent's status is decided by which rung every
//! one of its children has reached, so the tier sets below are what the
//! count-rule status logic actually consumes.

use serde::{Deserialize, Serialize};

/// The outcome of auditing one rule node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    /// Satisfied by an administrative waiver, not by coursework.
    Waived,
    /// Fully satisfied by completed coursework.
    Done,
    /// Satisfied only if currently-enrolled coursework completes.
    PendingCurrent,
    /// Satisfied only if registered future coursework completes.
    PendingRegistered,
    /// Some progress made, but more matching items are required.
    NeedsMoreItems,
    /// A claim or limit invariant was violated; cannot be satisfied as-is.
    FailedInvariant,
    /// No progress at all.
    Empty,
    /// Awaiting departmental sign-off.
    PendingApproval,
}

impl ResultStatus {
    /// Statuses that count as passing for a parent's child tally.
    pub const PASSING: &'static [ResultStatus] = &[
        ResultStatus::Waived,
        ResultStatus::Done,
        ResultStatus::PendingCurrent,
        ResultStatus::PendingRegistered,
    ];

    pub fn is_passing(self) -> bool {
        Self::PASSING.contains(&self)
    }

    /// Statuses that contribute nothing a parent can build on.
    pub fn is_empty_ish(self) -> bool {
        matches!(self, ResultStatus::Empty | ResultStatus::PendingApproval)
    }
}

/// Cumulative tiers of the status ladder, used when a parent decides its
/// own status from its children's. Each tier includes all tiers above it.
pub mod tiers {
    use super::ResultStatus;
    use super::ResultStatus::*;

    pub const WAIVED_ONLY: &[ResultStatus] = &[Waived];
    pub const WAIVED_AND_DONE: &[ResultStatus] = &[Waived, Done];
    pub const WAIVED_DONE_CURRENT: &[ResultStatus] = &[Waived, Done, PendingCurrent];
    pub const WAIVED_DONE_CURRENT_PENDING: &[ResultStatus] =
        &[Waived, Done, PendingCurrent, PendingRegistered];
    pub const WAIVED_DONE_CURRENT_PENDING_INCOMPLETE: &[ResultStatus] =
        &[Waived, Done, PendingCurrent, PendingRegistered, NeedsMoreItems];

    /// True when every status in `statuses` belongs to `tier`.
    pub fn all_within(statuses: &[ResultStatus], tier: &[ResultStatus]) -> bool {
        statuses.iter().all(|s| tier.contains(s))
    }
}
