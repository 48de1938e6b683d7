//! The exclusive-claim ledger.
//!
//! A course may satisfy at most one requirement path unless the
//! multicountable allow-list says otherwise. Claim conflicts are not
//! errors: a failed claim marks the current assignment unfavorable and
//! the search moves on.

use crate::data::CourseInstance;
use crate::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// `course identity -> list of requirement-name paths allowed to share
/// the course`. Each inner path holds only `%`-prefixed segments.
pub type MulticountableMap = BTreeMap<String, Vec<Vec<String>>>;

/// One attempt to spend a course on a requirement path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub clbid: String,
    pub crsid: String,
    pub course: String,
    pub claimed_by: Path,
    pub failed: bool,
}

impl Claim {
    fn new(course: &CourseInstance, claimed_by: Path, failed: bool) -> Claim {
        Claim {
            clbid: course.clbid.clone(),
            crsid: course.crsid.clone(),
            course: course.identity.clone(),
            claimed_by,
            failed,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "clbid": self.clbid,
            "crsid": self.crsid,
            "course": self.course,
            "claimed_by": self.claimed_by,
        })
    }
}

/// Successful claims for one audit attempt, keyed on clbid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimLedger {
    claims: BTreeMap<String, Vec<Claim>>,
}

impl ClaimLedger {
    pub fn new() -> ClaimLedger {
        ClaimLedger::default()
    }

    /// Attempts to spend `course` on the requirement at `path`.
    ///
    /// With `allow_claimed` the attempt always succeeds and leaves no
    /// record (re-query of already-claimed items). Otherwise a second
    /// claim on the same clbid fails unless the multicountable list
    /// names this path's requirement sequence and no prior claim has
    /// consumed that entry.
    pub fn make_claim(
        &mut self,
        course: &CourseInstance,
        path: &Path,
        allow_claimed: bool,
        multicountable: &MulticountableMap,
    ) -> Claim {
        if allow_claimed {
            return Claim::new(course, path.clone(), false);
        }

        let prior = self.claims.entry(course.clbid.clone()).or_default();

        if prior.is_empty() {
            let claim = Claim::new(course, path.clone(), false);
            prior.push(claim.clone());
            return claim;
        }

        let applicable = multicountable
            .get(&course.identity)
            .or_else(|| multicountable.get(&course.crsid));

        if let Some(allowed_paths) = applicable {
            let own_segments = path.requirement_segments();
            let consumed: BTreeSet<Vec<String>> = prior
                .iter()
                .map(|c| c.claimed_by.requirement_segments())
                .collect();

            let entry = allowed_paths
                .iter()
                .find(|entry| **entry == own_segments && !consumed.contains(*entry));

            if entry.is_some() {
                let claim = Claim::new(course, path.clone(), false);
                prior.push(claim.clone());
                return claim;
            }

            trace!(course = %course.identity, path = %path, "claim denied, multicountable entries exhausted");
            return Claim::new(course, path.clone(), true);
        }

        trace!(course = %course.identity, path = %path, "claim denied, already claimed");
        Claim::new(course, path.clone(), true)
    }

    pub fn has_claims(&self) -> bool {
        self.claims.values().any(|v| !v.is_empty())
    }

    /// Every clbid with at least one successful claim.
    pub fn claimed_clbids(&self) -> BTreeSet<String> {
        self.claims
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn claims_for(&self, clbid: &str) -> &[Claim] {
        self.claims.get(clbid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Folds another ledger's successful claims into this one. Used to
    /// carry the winning claims of an independently-solved subtree back
    /// into the shared ledger.
    pub fn merge(&mut self, other: ClaimLedger) {
        for (clbid, claims) in other.claims {
            self.claims.entry(clbid).or_default().extend(claims);
        }
    }

    pub fn clear(&mut self) {
        self.claims.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> CourseInstance {
        CourseInstance::builder("10", "DEPT 123").build()
    }

    fn req_path(names: &[&str]) -> Path {
        let mut p = Path::root();
        for n in names {
            p = p.append(format!("%{n}"));
        }
        p.append("*DEPT 123")
    }

    #[test]
    fn test_first_claim_succeeds() {
        let mut ledger = ClaimLedger::new();
        let claim = ledger.make_claim(&course(), &req_path(&["Core"]), false, &BTreeMap::new());
        assert!(!claim.failed);
        assert!(ledger.has_claims());
        assert_eq!(ledger.claimed_clbids().len(), 1);
    }

    #[test]
    fn test_second_claim_fails_without_multicountable() {
        let mut ledger = ClaimLedger::new();
        let c = course();
        let first = ledger.make_claim(&c, &req_path(&["Core"]), false, &BTreeMap::new());
        let second = ledger.make_claim(&c, &req_path(&["Electives"]), false, &BTreeMap::new());
        assert!(!first.failed);
        assert!(second.failed);
        assert_eq!(ledger.claims_for("10").len(), 1);
    }

    #[test]
    fn test_allow_claimed_succeeds_without_recording() {
        let mut ledger = ClaimLedger::new();
        let c = course();
        ledger.make_claim(&c, &req_path(&["Core"]), false, &BTreeMap::new());
        let again = ledger.make_claim(&c, &req_path(&["Electives"]), true, &BTreeMap::new());
        assert!(!again.failed);
        assert_eq!(ledger.claims_for("10").len(), 1, "allow_claimed must not record");
    }

    #[test]
    fn test_multicountable_permits_each_listed_path_once() {
        let mut multicountable = MulticountableMap::new();
        multicountable.insert(
            "DEPT 123".to_string(),
            vec![
                vec!["%Core".to_string()],
                vec!["%Electives".to_string()],
            ],
        );

        let mut ledger = ClaimLedger::new();
        let c = course();

        let first = ledger.make_claim(&c, &req_path(&["Core"]), false, &multicountable);
        let second = ledger.make_claim(&c, &req_path(&["Electives"]), false, &multicountable);
        // the Electives entry is consumed now
        let third = ledger.make_claim(&c, &req_path(&["Electives"]), false, &multicountable);
        // and Capstone is not listed at all
        let fourth = ledger.make_claim(&c, &req_path(&["Capstone"]), false, &multicountable);

        assert!(!first.failed);
        assert!(!second.failed);
        assert!(third.failed);
        assert!(fourth.failed);
        assert_eq!(ledger.claims_for("10").len(), 2);
    }

    #[test]
    fn test_multicountable_bound_is_entry_count() {
        let mut multicountable = MulticountableMap::new();
        multicountable.insert(
            "DEPT 123".to_string(),
            vec![vec!["%A".to_string()], vec!["%B".to_string()], vec!["%C".to_string()]],
        );

        let mut ledger = ClaimLedger::new();
        let c = course();
        let successes = ["A", "B", "C", "A", "B"]
            .iter()
            .filter(|name| !ledger.make_claim(&c, &req_path(&[name]), false, &multicountable).failed)
            .count();
        assert_eq!(successes, 3);
    }

    #[test]
    fn test_merge_combines_ledgers() {
        let mut a = ClaimLedger::new();
        a.make_claim(&course(), &req_path(&["Core"]), false, &BTreeMap::new());

        let mut b = ClaimLedger::new();
        let other = CourseInstance::builder("11", "DEPT 250").build();
        b.make_claim(&other, &req_path(&["Electives"]), false, &BTreeMap::new());

        a.merge(b);
        assert_eq!(a.claimed_clbids().len(), 2);
    }
}
