//! Error types.
//!
//! Validation is the fallible phase: once a rule tree validates, the
//! solve and audit phases are total and never return errors. Claim
//! failures in particular are ordinary data, not errors.

use crate::op::Operator;
use crate::path::Path;
use crate::predicate::FactKey;
use thiserror::Error;

/// Errors raised while validating a rule tree against a transcript.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("course rule at {path} names no course, ap credit, or institution")]
    CourseRuleWithoutTarget { path: Path },

    #[error("count rule at {path} asks for {count} of {available} children")]
    CountExceedsChildren {
        path: Path,
        count: usize,
        available: usize,
    },

    #[error("count rule at {path} has no children")]
    CountWithoutChildren { path: Path },

    #[error("operator {op} cannot compare two multi-valued facts")]
    MultiValuedComparison { op: Operator },

    #[error("requirement {name:?} is referenced but never declared")]
    UnknownRequirement { name: String },

    #[error("requirement {name:?} declares neither a result rule nor an audit")]
    RequirementWithoutResult { name: String },

    #[error("query rule at {path} filters on {key}, which its source does not provide")]
    KeyNotInSource { path: Path, key: FactKey },
}
