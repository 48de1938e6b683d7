//! Structural paths into a rule tree.
//!
//! Every rule, solution, and result carries the path of tree positions
//! that leads to it from the root (`$`). Paths key the claim ledger and
//! the exception table, and their ordering decides the order in which
//! claims are resolved, so the comparison rules here are load-bearing.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A path from the root of a rule tree to one position inside it.
///
/// Segments are strings; positional segments inside a count rule are
/// written `[0]`, `[1]`, … and compare numerically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<String>);

impl Path {
    /// The root path, `["$"]`.
    pub fn root() -> Path {
        Path(vec!["$".to_string()])
    }

    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Path {
        Path(segments.into_iter().map(Into::into).collect())
    }

    /// Returns a new path with `segment` appended.
    pub fn append(&self, segment: impl Into<String>) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }

    /// Returns a new path with the positional segment `[index]` appended.
    pub fn append_index(&self, index: usize) -> Path {
        self.append(format!("[{index}]"))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True when `self` is `prefix` itself or lies beneath it.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// The requirement-name subsequence: segments carrying the `%`
    /// prefix, in order. This is the key the multicountable allow-list
    /// matches against.
    pub fn requirement_segments(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|s| s.starts_with('%'))
            .cloned()
            .collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// One segment decoded for comparison: positional segments sort as
/// integers, and any integer sorts before any string.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SegmentKey<'a> {
    Index(usize),
    Name(&'a str),
}

fn segment_key(segment: &str) -> SegmentKey<'_> {
    segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.parse().ok())
        .map(SegmentKey::Index)
        .unwrap_or(SegmentKey::Name(segment))
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        // shorter paths sort first regardless of content
        self.0.len().cmp(&other.0.len()).then_with(|| {
            self.0
                .iter()
                .map(|s| segment_key(s))
                .cmp(other.0.iter().map(|s| segment_key(s)))
        })
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
