//! Reducers: collapse a matched item set to one scalar.

use crate::data::{AreaPointer, CourseInstance, Performance};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which aggregate an assertion measures. Closed set; the wire names
/// are the `fn(argument)` strings the area specifications use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReducerKey {
    #[serde(rename = "count(courses)")]
    CountCourses,
    #[serde(rename = "count(distinct_courses)")]
    CountDistinctCourses,
    #[serde(rename = "count(terms)")]
    CountTerms,
    #[serde(rename = "count(subjects)")]
    CountSubjects,
    #[serde(rename = "count(years)")]
    CountYears,
    #[serde(rename = "count(terms_from_most_common_course)")]
    CountTermsFromMostCommonCourse,
    #[serde(rename = "count(areas)")]
    CountAreas,
    #[serde(rename = "count(performances)")]
    CountPerformances,
    #[serde(rename = "count(items)")]
    CountItems,
    #[serde(rename = "sum(credits)")]
    SumCredits,
    #[serde(rename = "sum(credits_from_single_subject)")]
    SumCreditsFromSingleSubject,
    #[serde(rename = "average(grades)")]
    AverageGrades,
    #[serde(rename = "average(credits)")]
    AverageCredits,
}

impl ReducerKey {
    /// Simple counting reducers can drive subset-size pruning directly:
    /// adding one item raises the value by at most one.
    pub fn is_simple_count(self) -> bool {
        matches!(self, ReducerKey::CountCourses | ReducerKey::CountItems | ReducerKey::CountPerformances)
    }

    /// Credit sums can drive the credit-threshold pruning shortcut.
    pub fn is_simple_sum(self) -> bool {
        matches!(self, ReducerKey::SumCredits)
    }

    pub fn applies_to_courses(self) -> bool {
        !matches!(
            self,
            ReducerKey::CountAreas | ReducerKey::CountPerformances
        )
    }
}

/// What a reducer is applied to.
#[derive(Debug, Clone, Copy)]
pub enum ReduceInput<'a> {
    Courses(&'a [CourseInstance]),
    Areas(&'a [AreaPointer]),
    Performances(&'a [Performance]),
}

impl ReduceInput<'_> {
    pub fn len(&self) -> usize {
        match self {
            ReduceInput::Courses(items) => items.len(),
            ReduceInput::Areas(items) => items.len(),
            ReduceInput::Performances(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn courses(&self) -> &[CourseInstance] {
        match self {
            ReduceInput::Courses(items) => items,
            _ => &[],
        }
    }
}

/// The reduced scalar plus the items that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduced {
    pub value: Decimal,
    /// Human-readable contributing item strings, sorted.
    pub data: Vec<String>,
    /// The contributing courses, when the input was courses.
    pub courses: Vec<CourseInstance>,
}

impl Reduced {
    fn of_count(count: usize, data: Vec<String>, courses: Vec<CourseInstance>) -> Reduced {
        Reduced {
            value: Decimal::from(count),
            data,
            courses,
        }
    }
}

/// Applies `key` to `input`.
pub fn reduce(key: ReducerKey, input: ReduceInput<'_>) -> Reduced {
    match key {
        ReducerKey::CountCourses | ReducerKey::CountItems => match input {
            ReduceInput::Courses(courses) => {
                let clbids: BTreeSet<&str> = courses.iter().map(|c| c.clbid.as_str()).collect();
                Reduced::of_count(
                    clbids.len(),
                    courses.iter().map(|c| c.identity.clone()).collect(),
                    courses.to_vec(),
                )
            }
            ReduceInput::Areas(areas) => Reduced::of_count(
                areas.len(),
                areas.iter().map(|a| a.name.clone()).collect(),
                Vec::new(),
            ),
            ReduceInput::Performances(items) => Reduced::of_count(
                items.len(),
                items.iter().map(|p| p.name.clone()).collect(),
                Vec::new(),
            ),
        },

        ReducerKey::CountDistinctCourses => {
            let courses = input.courses();
            let crsids: BTreeSet<&str> = courses.iter().map(|c| c.crsid.as_str()).collect();
            Reduced::of_count(
                crsids.len(),
                crsids.iter().map(|s| s.to_string()).collect(),
                courses.to_vec(),
            )
        }

        ReducerKey::CountTerms => {
            let courses = input.courses();
            let terms: BTreeSet<String> = courses.iter().map(|c| c.year_term()).collect();
            Reduced::of_count(terms.len(), terms.into_iter().collect(), courses.to_vec())
        }

        ReducerKey::CountSubjects => {
            let courses = input.courses();
            let subjects: BTreeSet<&str> = courses.iter().map(|c| c.subject.as_str()).collect();
            Reduced::of_count(
                subjects.len(),
                subjects.iter().map(|s| s.to_string()).collect(),
                courses.to_vec(),
            )
        }

        ReducerKey::CountYears => {
            let courses = input.courses();
            let years: BTreeSet<i64> = courses.iter().map(|c| c.year).collect();
            Reduced::of_count(
                years.len(),
                years.iter().map(|y| y.to_string()).collect(),
                courses.to_vec(),
            )
        }

        ReducerKey::CountTermsFromMostCommonCourse => {
            let courses = input.courses();
            let mut by_crsid: BTreeMap<&str, Vec<&CourseInstance>> = BTreeMap::new();
            for c in courses {
                by_crsid.entry(c.crsid.as_str()).or_default().push(c);
            }

            let most_common = by_crsid
                .values()
                .max_by_key(|group| group.len())
                .cloned()
                .unwrap_or_default();

            let terms: BTreeSet<String> = most_common.iter().map(|c| c.year_term()).collect();
            Reduced::of_count(
                terms.len(),
                terms.into_iter().collect(),
                most_common.into_iter().cloned().collect(),
            )
        }

        ReducerKey::CountAreas => match input {
            ReduceInput::Areas(areas) => Reduced::of_count(
                areas.len(),
                areas.iter().map(|a| a.name.clone()).collect(),
                Vec::new(),
            ),
            _ => Reduced::of_count(0, Vec::new(), Vec::new()),
        },

        ReducerKey::CountPerformances => match input {
            ReduceInput::Performances(items) => Reduced::of_count(
                items.len(),
                items.iter().map(|p| p.name.clone()).collect(),
                Vec::new(),
            ),
            _ => Reduced::of_count(0, Vec::new(), Vec::new()),
        },

        ReducerKey::SumCredits => {
            // failed courses carry no credit toward sums
            let courses: Vec<CourseInstance> = input
                .courses()
                .iter()
                .filter(|c| c.credits > Decimal::ZERO)
                .cloned()
                .collect();
            let value: Decimal = courses.iter().map(|c| c.credits).sum();
            Reduced {
                value,
                data: courses.iter().map(|c| c.credits.to_string()).collect(),
                courses,
            }
        }

        ReducerKey::SumCreditsFromSingleSubject => {
            let courses = input.courses();
            let mut by_subject: BTreeMap<&str, Decimal> = BTreeMap::new();
            for c in courses {
                *by_subject.entry(c.subject.as_str()).or_default() += c.credits;
            }

            let best = by_subject
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
                .unwrap_or(("", Decimal::ZERO));

            let contributing: Vec<CourseInstance> = courses
                .iter()
                .filter(|c| c.subject == best.0)
                .cloned()
                .collect();

            Reduced {
                value: best.1,
                data: vec![best.0.to_string()],
                courses: contributing,
            }
        }

        ReducerKey::AverageGrades => {
            let courses: Vec<CourseInstance> = input
                .courses()
                .iter()
                .filter(|c| c.is_in_gpa)
                .cloned()
                .collect();
            average(
                courses.iter().map(|c| c.grade_points).collect(),
                courses,
            )
        }

        ReducerKey::AverageCredits => {
            let courses = input.courses().to_vec();
            average(courses.iter().map(|c| c.credits).collect(), courses)
        }
    }
}

fn average(values: Vec<Decimal>, courses: Vec<CourseInstance>) -> Reduced {
    let value = if values.is_empty() {
        Decimal::ZERO
    } else {
        let sum: Decimal = values.iter().sum();
        (sum / Decimal::from(values.len())).round_dp(2)
    };

    Reduced {
        value,
        data: values.iter().map(Decimal::to_string).collect(),
        courses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GradeCode;
    use rust_decimal_macros::dec;

    fn courses() -> Vec<CourseInstance> {
        vec![
            CourseInstance::builder("1", "CSCI 121").year(2019).term(1).build(),
            CourseInstance::builder("2", "CSCI 251").year(2019).term(1).build(),
            CourseInstance::builder("3", "MATH 230").year(2019).term(2).build(),
            CourseInstance::builder("4", "CSCI 251").year(2020).term(1).crsid("CSCI 251").build(),
        ]
    }

    #[test]
    fn test_count_courses() {
        let cs = courses();
        let r = reduce(ReducerKey::CountCourses, ReduceInput::Courses(&cs));
        assert_eq!(r.value, dec!(4));
        assert_eq!(r.courses.len(), 4);
    }

    #[test]
    fn test_count_distinct_courses() {
        let cs = courses();
        let r = reduce(ReducerKey::CountDistinctCourses, ReduceInput::Courses(&cs));
        // two CSCI 251 takings share a crsid
        assert_eq!(r.value, dec!(3));
    }

    #[test]
    fn test_count_terms_subjects_years() {
        let cs = courses();
        assert_eq!(reduce(ReducerKey::CountTerms, ReduceInput::Courses(&cs)).value, dec!(3));
        assert_eq!(reduce(ReducerKey::CountSubjects, ReduceInput::Courses(&cs)).value, dec!(2));
        assert_eq!(reduce(ReducerKey::CountYears, ReduceInput::Courses(&cs)).value, dec!(2));
    }

    #[test]
    fn test_terms_from_most_common_course() {
        let cs = courses();
        let r = reduce(ReducerKey::CountTermsFromMostCommonCourse, ReduceInput::Courses(&cs));
        // CSCI 251 is the most common course, taken in two distinct terms
        assert_eq!(r.value, dec!(2));
        assert!(r.courses.iter().all(|c| c.crsid == "CSCI 251"));
    }

    #[test]
    fn test_sum_credits() {
        let cs = vec![
            CourseInstance::builder("1", "A 1").credits(dec!(0.5)).build(),
            CourseInstance::builder("2", "B 2").credits(dec!(1.0)).build(),
        ];
        let r = reduce(ReducerKey::SumCredits, ReduceInput::Courses(&cs));
        assert_eq!(r.value, dec!(1.5));
    }

    #[test]
    fn test_sum_credits_from_single_subject() {
        let cs = vec![
            CourseInstance::builder("1", "CSCI 121").build(),
            CourseInstance::builder("2", "CSCI 251").build(),
            CourseInstance::builder("3", "MATH 230").build(),
        ];
        let r = reduce(ReducerKey::SumCreditsFromSingleSubject, ReduceInput::Courses(&cs));
        assert_eq!(r.value, dec!(2));
        assert_eq!(r.data, vec!["CSCI"]);
        assert_eq!(r.courses.len(), 2);
    }

    #[test]
    fn test_average_grades_skips_non_gpa() {
        let cs = vec![
            CourseInstance::builder("1", "A 1").grade(GradeCode::A).build(),
            CourseInstance::builder("2", "B 2").grade(GradeCode::B).build(),
            CourseInstance::builder("3", "C 3").grade(GradeCode::P).in_gpa(false).build(),
        ];
        let r = reduce(ReducerKey::AverageGrades, ReduceInput::Courses(&cs));
        assert_eq!(r.value, dec!(3.50));
        assert_eq!(r.courses.len(), 2);
    }

    #[test]
    fn test_average_of_nothing_is_zero() {
        let r = reduce(ReducerKey::AverageCredits, ReduceInput::Courses(&[]));
        assert_eq!(r.value, dec!(0));
    }

    #[test]
    fn test_count_performances() {
        let ps = vec![
            Performance::new("p1", "Recital", 2019, 1),
            Performance::new("p2", "Recital", 2019, 2),
        ];
        let r = reduce(ReducerKey::CountPerformances, ReduceInput::Performances(&ps));
        assert_eq!(r.value, dec!(2));
    }

    #[test]
    fn test_reducer_wire_names() {
        assert_eq!(
            serde_json::to_string(&ReducerKey::CountCourses).unwrap(),
            "\"count(courses)\""
        );
        assert_eq!(
            serde_json::to_string(&ReducerKey::SumCreditsFromSingleSubject).unwrap(),
            "\"sum(credits_from_single_subject)\""
        );
    }
}
