//! Limits bound how many matching courses a scope of the search may use.
//!
//! A limit set is consumed two ways. `apply_limits` is a greedy filter
//! under running counters. `limited_transcripts` is generative: it
//! yields every distinct transcript variant consistent with all limits
//! simultaneously, which is what the search branches over.

use crate::data::CourseInstance;
use crate::predicate::{Predicate, PredicateExpression};
use crate::stream::{lazy_product, StreamFactory};
use itertools::Itertools;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtMostWhat {
    Courses,
    Credits,
}

/// `at most N courses/credits where <predicate>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub at_most: Decimal,
    pub at_most_what: AtMostWhat,
    pub predicate: Predicate,
    pub message: Option<String>,
}

impl Limit {
    pub fn at_most_courses(n: u32, predicate: Predicate) -> Limit {
        Limit {
            at_most: Decimal::from(n),
            at_most_what: AtMostWhat::Courses,
            predicate,
            message: None,
        }
    }

    pub fn at_most_credits(at_most: Decimal, predicate: Predicate) -> Limit {
        Limit {
            at_most,
            at_most_what: AtMostWhat::Credits,
            predicate,
            message: None,
        }
    }

    pub fn applies(&self, course: &CourseInstance) -> bool {
        self.predicate.apply(course)
    }

    /// Yields every sub-combination of `courses` within the cap, in
    /// ascending-size order. Input is sorted first so the stream is
    /// deterministic regardless of caller ordering.
    pub fn iterate(
        &self,
        mut courses: Vec<CourseInstance>,
    ) -> Box<dyn Iterator<Item = Vec<CourseInstance>>> {
        courses.sort_by(|a, b| a.sort_order().cmp(&b.sort_order()));

        match self.at_most_what {
            AtMostWhat::Courses => self.iterate_courses(courses),
            AtMostWhat::Credits => self.iterate_credits(courses),
        }
    }

    fn iterate_courses(
        &self,
        courses: Vec<CourseInstance>,
    ) -> Box<dyn Iterator<Item = Vec<CourseInstance>>> {
        let cap = self.at_most.to_usize().unwrap_or(0);
        Box::new((0..=cap).flat_map(move |n| courses.clone().into_iter().combinations(n)))
    }

    fn iterate_credits(
        &self,
        courses: Vec<CourseInstance>,
    ) -> Box<dyn Iterator<Item = Vec<CourseInstance>>> {
        let total: Decimal = courses.iter().map(|c| c.credits).sum();
        if total <= self.at_most {
            return Box::new(std::iter::once(courses));
        }

        let cap = self.at_most;
        Box::new((0..=courses.len()).flat_map(move |n| {
            courses
                .clone()
                .into_iter()
                .combinations(n)
                .filter(move |combo| combo.iter().map(|c| c.credits).sum::<Decimal>() <= cap)
        }))
    }

    /// Upper bound on the number of combinations `iterate` can yield.
    pub fn estimate(&self, courses: &[CourseInstance]) -> usize {
        match self.at_most_what {
            AtMostWhat::Courses => {
                let cap = self.at_most.to_usize().unwrap_or(0);
                (0..=cap).map(|n| ncr(courses.len(), n)).sum()
            }
            AtMostWhat::Credits => (1..=courses.len()).map(|n| ncr(courses.len(), n)).sum(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "limit",
            "at_most": self.at_most.to_string(),
            "at_most_what": self.at_most_what,
            "where": self.predicate.to_json(),
            "message": self.message,
        })
    }
}

pub(crate) fn ncr(n: usize, r: usize) -> usize {
    if r > n {
        return 0;
    }
    let r = r.min(n - r);
    let mut acc: usize = 1;
    for i in 0..r {
        acc = acc * (n - i) / (i + 1);
    }
    acc
}

/// A limit, possibly guarded by a context-level condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyLimit {
    Single(Limit),
    Conditional {
        condition: PredicateExpression,
        when_true: Box<Limit>,
        when_false: Option<Box<Limit>>,
    },
}

impl AnyLimit {
    /// Picks the live branch for this student, if any.
    pub fn resolve(
        &self,
        eval: &dyn Fn(&PredicateExpression) -> bool,
    ) -> Option<&Limit> {
        match self {
            AnyLimit::Single(limit) => Some(limit),
            AnyLimit::Conditional {
                condition,
                when_true,
                when_false,
            } => {
                if eval(condition) {
                    Some(when_true)
                } else {
                    when_false.as_deref()
                }
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AnyLimit::Single(limit) => limit.to_json(),
            AnyLimit::Conditional {
                condition,
                when_true,
                when_false,
            } => json!({
                "type": "limit--if",
                "condition": condition.to_json(),
                "when_true": when_true.to_json(),
                "when_false": when_false.as_ref().map(|l| l.to_json()),
            }),
        }
    }
}

/// An ordered collection of limits applied simultaneously.
///
/// Conditional entries are collapsed once per audit by [`resolve`];
/// the counting and partitioning operations consider only unconditional
/// entries, so an unresolved guard simply does not constrain.
///
/// [`resolve`]: LimitSet::resolve
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitSet {
    pub limits: Vec<AnyLimit>,
}

impl LimitSet {
    pub fn new(limits: Vec<Limit>) -> LimitSet {
        LimitSet {
            limits: limits.into_iter().map(AnyLimit::Single).collect(),
        }
    }

    pub fn of(limits: Vec<AnyLimit>) -> LimitSet {
        LimitSet { limits }
    }

    pub fn has_limits(&self) -> bool {
        !self.limits.is_empty()
    }

    /// The working set for one student: every conditional limit
    /// collapsed to its live branch, guards without one dropped.
    pub fn resolve(&self, eval: &dyn Fn(&PredicateExpression) -> bool) -> LimitSet {
        LimitSet {
            limits: self
                .limits
                .iter()
                .filter_map(|l| l.resolve(eval))
                .cloned()
                .map(AnyLimit::Single)
                .collect(),
        }
    }

    fn active(&self) -> impl Iterator<Item = &Limit> {
        self.limits.iter().filter_map(|l| match l {
            AnyLimit::Single(limit) => Some(limit),
            AnyLimit::Conditional { .. } => None,
        })
    }

    /// True when `courses` respects every limit at once. One course can
    /// feed several limits' counters; the first counter to overflow
    /// fails the whole set.
    pub fn check(&self, courses: &[CourseInstance]) -> bool {
        let active: Vec<&Limit> = self.active().collect();
        let mut counters = vec![Decimal::ZERO; active.len()];

        for course in courses {
            for (idx, limit) in active.iter().enumerate() {
                if !limit.applies(course) {
                    continue;
                }

                if counters[idx] >= limit.at_most {
                    return false;
                }

                match limit.at_most_what {
                    AtMostWhat::Courses => counters[idx] += Decimal::ONE,
                    AtMostWhat::Credits => counters[idx] += course.credits,
                }
            }
        }

        true
    }

    /// Greedy first-seen filter: keeps each course only while every
    /// applicable limit's running counter stays within its cap.
    pub fn apply_limits(&self, courses: &[CourseInstance]) -> Vec<CourseInstance> {
        let mut sorted: Vec<&CourseInstance> = courses.iter().collect();
        sorted.sort_by(|a, b| a.sort_order().cmp(&b.sort_order()));

        let active: Vec<&Limit> = self.active().collect();
        let mut counters = vec![Decimal::ZERO; active.len()];
        let mut kept = Vec::new();

        'courses: for course in sorted {
            for (idx, limit) in active.iter().enumerate() {
                if !limit.applies(course) {
                    continue;
                }

                let next = match limit.at_most_what {
                    AtMostWhat::Courses => counters[idx] + Decimal::ONE,
                    AtMostWhat::Credits => counters[idx] + course.credits,
                };

                if next > limit.at_most {
                    continue 'courses;
                }
            }

            for (idx, limit) in active.iter().enumerate() {
                if limit.applies(course) {
                    match limit.at_most_what {
                        AtMostWhat::Courses => counters[idx] += Decimal::ONE,
                        AtMostWhat::Credits => counters[idx] += course.credits,
                    }
                }
            }

            kept.push(course.clone());
        }

        kept
    }

    /// Yields every transcript variant consistent with all limits.
    ///
    /// Courses matched by no limit always ride along; per-limit matched
    /// sets are enumerated up to their caps, lazily crossed, re-checked
    /// as a combined selection, de-duplicated, and merged back in sort
    /// order. Force-inserted clbids bypass limit probing entirely.
    pub fn limited_transcripts(
        &self,
        courses: &[CourseInstance],
        forced_clbids: &BTreeSet<String>,
    ) -> Box<dyn Iterator<Item = Vec<CourseInstance>>> {
        let active: Vec<Limit> = self.active().cloned().collect();
        if active.is_empty() {
            return Box::new(std::iter::once(courses.to_vec()));
        }

        debug!(limits = active.len(), courses = courses.len(), "applying limits");

        let mut matched: Vec<(Limit, Vec<CourseInstance>)> = Vec::new();
        let mut matched_clbids: BTreeSet<String> = BTreeSet::new();

        for limit in &active {
            let match_set: Vec<CourseInstance> = courses
                .iter()
                .filter(|c| !forced_clbids.contains(&c.clbid) && limit.applies(c))
                .cloned()
                .collect();

            matched_clbids.extend(match_set.iter().map(|c| c.clbid.clone()));
            if !match_set.is_empty() {
                matched.push((limit.clone(), match_set));
            }
        }

        let unmatched: Vec<CourseInstance> = courses
            .iter()
            .filter(|c| !matched_clbids.contains(&c.clbid))
            .cloned()
            .collect();

        let factories: Vec<StreamFactory<'static, Vec<CourseInstance>>> = matched
            .into_iter()
            .map(|(limit, match_set)| {
                let factory: StreamFactory<'static, Vec<CourseInstance>> =
                    Box::new(move || limit.iterate(match_set.clone()));
                factory
            })
            .collect();

        let checker = LimitSet::new(active);
        let mut emitted: HashSet<Vec<String>> = HashSet::new();

        Box::new(lazy_product(factories).filter_map(move |groups| {
            let mut selection: Vec<CourseInstance> = groups.into_iter().flatten().collect();
            // a course matched by several limits appears in several groups
            selection.sort_by(|a, b| a.clbid.cmp(&b.clbid));
            selection.dedup_by(|a, b| a.clbid == b.clbid);

            if !checker.check(&selection) {
                return None;
            }

            let key: Vec<String> = selection.iter().map(|c| c.clbid.clone()).collect();
            if !emitted.insert(key) {
                return None;
            }

            let mut transcript = unmatched.clone();
            transcript.extend(selection);
            transcript.sort_by(|a, b| a.sort_order().cmp(&b.sort_order()));
            Some(transcript)
        }))
    }

    /// Number of variants `limited_transcripts` would produce.
    pub fn estimate(&self, courses: &[CourseInstance]) -> usize {
        self.limited_transcripts(courses, &BTreeSet::new()).count()
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!(self.limits.iter().map(AnyLimit::to_json).collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Operator;
    use crate::predicate::FactKey;
    use rust_decimal_macros::dec;

    fn half_credit(clbid: &str, course: &str) -> CourseInstance {
        CourseInstance::builder(clbid, course).credits(dec!(0.5)).build()
    }

    fn number_is(n: &str) -> Predicate {
        Predicate::single(FactKey::Number, Operator::EqualTo, n)
    }

    #[test]
    fn test_no_limits_yields_input_once() {
        let set = LimitSet::default();
        let courses = vec![half_credit("1", "MUSIC 201")];
        let variants: Vec<_> = set.limited_transcripts(&courses, &BTreeSet::new()).collect();
        assert_eq!(variants, vec![courses]);
    }

    #[test]
    fn test_count_limit_partitions() {
        // at most 1 course numbered 201, three matching courses
        let set = LimitSet::new(vec![Limit::at_most_courses(1, number_is("201"))]);
        let courses = vec![
            half_credit("1", "MUSIC 201"),
            half_credit("2", "ART 201"),
            half_credit("3", "DANCE 201"),
        ];

        let variants: Vec<_> = set.limited_transcripts(&courses, &BTreeSet::new()).collect();
        // empty selection plus each singleton
        assert_eq!(variants.len(), 4);
        assert!(variants.iter().all(|v| v.len() <= 1));
    }

    #[test]
    fn test_credit_limit_partitions() {
        // at most 1.0 credit numbered 201, three half-credit matches:
        // empty, each singleton, and each pair, but never all three
        let set = LimitSet::new(vec![Limit::at_most_credits(dec!(1.0), number_is("201"))]);
        let courses = vec![
            half_credit("1", "MUSIC 201"),
            half_credit("2", "ART 201"),
            half_credit("3", "DANCE 201"),
        ];

        let variants: Vec<_> = set.limited_transcripts(&courses, &BTreeSet::new()).collect();
        assert_eq!(variants.len(), 1 + 3 + 3);
        assert!(variants.iter().all(|v| v.len() < 3));

        for v in &variants {
            let credits: Decimal = v.iter().map(|c| c.credits).sum();
            assert!(credits <= dec!(1.0));
        }
    }

    #[test]
    fn test_unmatched_courses_always_ride_along() {
        let set = LimitSet::new(vec![Limit::at_most_courses(1, number_is("201"))]);
        let courses = vec![half_credit("1", "MUSIC 201"), half_credit("9", "CSCI 251")];

        for variant in set.limited_transcripts(&courses, &BTreeSet::new()) {
            assert!(variant.iter().any(|c| c.clbid == "9"));
        }
    }

    #[test]
    fn test_forced_clbids_bypass_probing() {
        let set = LimitSet::new(vec![Limit::at_most_courses(1, number_is("201"))]);
        let courses = vec![half_credit("1", "MUSIC 201"), half_credit("2", "ART 201")];
        let forced: BTreeSet<String> = ["1".to_string()].into();

        // clbid 1 is forced, so only clbid 2 is probed against the limit
        for variant in set.limited_transcripts(&courses, &forced) {
            assert!(variant.iter().any(|c| c.clbid == "1"));
        }
    }

    #[test]
    fn test_check_counts_simultaneously() {
        let number_limit = Limit::at_most_courses(2, number_is("201"));
        let credit_limit = Limit::at_most_credits(dec!(0.5), number_is("201"));
        let set = LimitSet::new(vec![number_limit, credit_limit]);

        let one = vec![half_credit("1", "MUSIC 201")];
        let two = vec![half_credit("1", "MUSIC 201"), half_credit("2", "ART 201")];

        assert!(set.check(&one));
        assert!(!set.check(&two), "within the count cap but past the credit cap");
    }

    #[test]
    fn test_apply_limits_greedy_filter() {
        let set = LimitSet::new(vec![Limit::at_most_courses(1, number_is("201"))]);
        let courses = vec![
            half_credit("1", "MUSIC 201"),
            half_credit("2", "ART 201"),
            half_credit("9", "CSCI 251"),
        ];

        let kept = set.apply_limits(&courses);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().any(|c| c.clbid == "9"));
    }

    #[test]
    fn test_credit_limit_all_fits_shortcut() {
        let set = LimitSet::new(vec![Limit::at_most_credits(dec!(2.0), number_is("201"))]);
        let courses = vec![half_credit("1", "MUSIC 201"), half_credit("2", "ART 201")];

        let variants: Vec<_> = set.limited_transcripts(&courses, &BTreeSet::new()).collect();
        assert_eq!(variants.len(), 1, "everything fits, so only the full set is yielded");
        assert_eq!(variants[0].len(), 2);
    }

    #[test]
    fn test_conditional_limit_takes_the_live_branch() {
        use crate::predicate::{PredicateExpression, PredicateFunction};

        let set = LimitSet::of(vec![AnyLimit::Conditional {
            condition: PredicateExpression::function(PredicateFunction::HasDeclaredAreaCode(
                "710".to_string(),
            )),
            when_true: Box::new(Limit::at_most_courses(1, number_is("201"))),
            when_false: None,
        }]);
        let courses = vec![half_credit("1", "MUSIC 201"), half_credit("2", "ART 201")];

        // condition holds: the cap partitions as usual
        let capped = set.resolve(&|_| true);
        let variants: Vec<_> =
            capped.limited_transcripts(&courses, &BTreeSet::new()).collect();
        assert_eq!(variants.len(), 3);
        assert!(variants.iter().all(|v| v.len() <= 1));

        // condition fails with no else branch: nothing constrains
        let uncapped = set.resolve(&|_| false);
        let variants: Vec<_> =
            uncapped.limited_transcripts(&courses, &BTreeSet::new()).collect();
        assert_eq!(variants, vec![courses]);
    }

    #[test]
    fn test_conditional_limit_else_branch() {
        use crate::predicate::{PredicateExpression, PredicateFunction};

        let set = LimitSet::of(vec![AnyLimit::Conditional {
            condition: PredicateExpression::function(PredicateFunction::HasDeclaredAreaCode(
                "710".to_string(),
            )),
            when_true: Box::new(Limit::at_most_courses(2, number_is("201"))),
            when_false: Some(Box::new(Limit::at_most_courses(0, number_is("201")))),
        }]);
        let courses = vec![half_credit("1", "MUSIC 201")];

        let strict = set.resolve(&|_| false);
        let variants: Vec<_> =
            strict.limited_transcripts(&courses, &BTreeSet::new()).collect();
        // cap of zero: only the empty selection survives
        assert_eq!(variants, vec![Vec::new()]);
    }

    #[test]
    fn test_ncr() {
        assert_eq!(ncr(5, 2), 10);
        assert_eq!(ncr(3, 0), 1);
        assert_eq!(ncr(2, 3), 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_every_variant_respects_the_caps(
            quarters in proptest::collection::vec(1u32..=4, 1..7),
            cap in 1u32..=3,
        ) {
            let courses: Vec<CourseInstance> = quarters
                .iter()
                .enumerate()
                .map(|(i, q)| {
                    CourseInstance::builder(i.to_string(), "MUSIC 201")
                        .credits(Decimal::new(i64::from(*q) * 25, 2))
                        .build()
                })
                .collect();
            let set = LimitSet::new(vec![Limit::at_most_credits(
                Decimal::from(cap),
                number_is("201"),
            )]);

            for variant in set.limited_transcripts(&courses, &BTreeSet::new()) {
                let credits: Decimal = variant.iter().map(|c| c.credits).sum();
                proptest::prop_assert!(credits <= Decimal::from(cap));
            }
        }
    }
}
