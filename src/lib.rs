//! Degree-audit rule solving and claim-allocation engine.
//!
//! Takes an already-loaded area-of-study rule tree plus one student's
//! record and searches for the best way to satisfy the tree:
//!
//! - **Rule tree**: a closed set of rule kinds (count, course, query,
//!   requirement, proficiency, conditional), each moving through the
//!   same three phases: declared rule, candidate solution, audited
//!   result. See [`rule`].
//! - **Claim ledger**: courses are an exclusive resource. Each audit
//!   attempt claims courses against a shared ledger; conflicts are not
//!   errors but unfavorable candidates. See [`claims`].
//! - **Limits**: "at most N courses/credits where ..." caps, applied by
//!   enumerating capped transcript variants before solving. See
//!   [`limit`].
//! - **Assertions**: aggregate checks (count, sum, average, distinct
//!   counts) over matched courses, with input-size pruning for the
//!   query rule's subset search. See [`assertion`].
//! - **Solver**: exhaustive lazy enumeration, best result by rank,
//!   first full pass wins. See [`solve`] and [`area`].
//!
//! Everything is single-threaded and lazy: solution streams are
//! iterators, and an external driver stops pulling whenever it has
//! seen enough.

pub mod area;
pub mod assertion;
pub mod claims;
pub mod context;
pub mod data;
pub mod error;
pub mod exception;
pub mod limit;
pub mod op;
pub mod path;
pub mod predicate;
pub mod rule;
pub mod solve;
pub mod status;
pub mod stream;

pub use area::{Area, AreaResult, AuditOptions, AuditOutcome};
pub use claims::{Claim, ClaimLedger, MulticountableMap};
pub use context::RequirementContext;
pub use data::{AreaKind, AreaPointer, CourseInstance, GradeCode, Student};
pub use error::RuleError;
pub use exception::{ExceptionSet, RuleException};
pub use limit::{AnyLimit, Limit, LimitSet};
pub use path::Path;
pub use rule::{Rule, RuleResult, RuleTree, Solution};
pub use solve::find_best_solution;
pub use status::ResultStatus;
