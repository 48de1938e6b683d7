//! Externally-supplied per-node overrides.
//!
//! Each exception targets one rule-tree node by exact path. Insertions
//! add a course to the node's candidate pool (forced insertions also
//! bypass claim exclusivity and limit probing); overrides waive the
//! node; value exceptions replace an assertion's expected target;
//! blocks remove a course from a query's pool.

use crate::path::Path;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExceptionAction {
    Insert { clbid: String, forced: bool },
    Override,
    Value { value: Decimal },
    Block { clbid: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleException {
    pub path: Path,
    pub action: ExceptionAction,
}

impl RuleException {
    pub fn insert(path: Path, clbid: impl Into<String>) -> RuleException {
        RuleException {
            path,
            action: ExceptionAction::Insert {
                clbid: clbid.into(),
                forced: false,
            },
        }
    }

    pub fn force_insert(path: Path, clbid: impl Into<String>) -> RuleException {
        RuleException {
            path,
            action: ExceptionAction::Insert {
                clbid: clbid.into(),
                forced: true,
            },
        }
    }

    pub fn waive(path: Path) -> RuleException {
        RuleException {
            path,
            action: ExceptionAction::Override,
        }
    }

    pub fn value(path: Path, value: Decimal) -> RuleException {
        RuleException {
            path,
            action: ExceptionAction::Value { value },
        }
    }

    pub fn block(path: Path, clbid: impl Into<String>) -> RuleException {
        RuleException {
            path,
            action: ExceptionAction::Block {
                clbid: clbid.into(),
            },
        }
    }
}

/// All exceptions for one audit, queried by path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionSet {
    exceptions: Vec<RuleException>,
}

impl ExceptionSet {
    pub fn new(exceptions: Vec<RuleException>) -> ExceptionSet {
        ExceptionSet { exceptions }
    }

    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
    }

    /// True when any exception targets `path` or a node beneath it.
    /// Rules use this to skip shortcuts that would hide an overridden
    /// descendant.
    pub fn has_exception_beneath(&self, path: &Path) -> bool {
        self.exceptions.iter().any(|e| e.path.starts_with(path))
    }

    /// Clbids inserted at exactly `path`, forced or not.
    pub fn insertions(&self, path: &Path) -> Vec<String> {
        self.exceptions
            .iter()
            .filter_map(|e| match &e.action {
                ExceptionAction::Insert { clbid, .. } if e.path == *path => Some(clbid.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clbids force-inserted at exactly `path`.
    pub fn forced_insertions(&self, path: &Path) -> BTreeSet<String> {
        self.exceptions
            .iter()
            .filter_map(|e| match &e.action {
                ExceptionAction::Insert {
                    clbid,
                    forced: true,
                } if e.path == *path => Some(clbid.clone()),
                _ => None,
            })
            .collect()
    }

    /// All force-inserted clbids anywhere in the tree; these bypass
    /// limit probing at the transcript level.
    pub fn all_forced_insertions(&self) -> BTreeSet<String> {
        self.exceptions
            .iter()
            .filter_map(|e| match &e.action {
                ExceptionAction::Insert {
                    clbid,
                    forced: true,
                } => Some(clbid.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_waived(&self, path: &Path) -> bool {
        self.exceptions
            .iter()
            .any(|e| e.path == *path && matches!(e.action, ExceptionAction::Override))
    }

    pub fn value_override(&self, path: &Path) -> Option<Decimal> {
        self.exceptions.iter().find_map(|e| match e.action {
            ExceptionAction::Value { value } if e.path == *path => Some(value),
            _ => None,
        })
    }

    pub fn blocked_clbids(&self, path: &Path) -> BTreeSet<String> {
        self.exceptions
            .iter()
            .filter_map(|e| match &e.action {
                ExceptionAction::Block { clbid } if e.path == *path => Some(clbid.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_exact_path_matching() {
        let target = Path::root().append("%Core").append_index(0);
        let set = ExceptionSet::new(vec![RuleException::waive(target.clone())]);

        assert!(set.is_waived(&target));
        assert!(!set.is_waived(&Path::root()));
        assert!(!set.is_waived(&target.append_index(1)));
    }

    #[test]
    fn test_has_exception_beneath() {
        let deep = Path::root().append("%Core").append_index(2);
        let set = ExceptionSet::new(vec![RuleException::insert(deep.clone(), "118")]);

        assert!(set.has_exception_beneath(&Path::root()));
        assert!(set.has_exception_beneath(&Path::root().append("%Core")));
        assert!(set.has_exception_beneath(&deep));
        assert!(!set.has_exception_beneath(&Path::root().append("%Electives")));
    }

    #[test]
    fn test_insertions_and_forced() {
        let path = Path::root().append("%Core");
        let set = ExceptionSet::new(vec![
            RuleException::insert(path.clone(), "1"),
            RuleException::force_insert(path.clone(), "2"),
        ]);

        assert_eq!(set.insertions(&path), vec!["1", "2"]);
        assert_eq!(set.forced_insertions(&path), ["2".to_string()].into());
        assert_eq!(set.all_forced_insertions(), ["2".to_string()].into());
    }

    #[test]
    fn test_value_override_and_block() {
        let path = Path::root().append("%Core").append("assertions").append_index(0);
        let set = ExceptionSet::new(vec![
            RuleException::value(path.clone(), dec!(4)),
            RuleException::block(path.clone(), "99"),
        ]);

        assert_eq!(set.value_override(&path), Some(dec!(4)));
        assert_eq!(set.value_override(&Path::root()), None);
        assert!(set.blocked_clbids(&path).contains("99"));
    }
}
