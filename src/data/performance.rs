//! Non-course countable items (recitals, attendances, exams).

use serde::{Deserialize, Serialize};

/// An opaque countable item attached to the student record. Queries over
/// performances only ever count them or match on the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Performance {
    pub id: String,
    pub name: String,
    pub year: i64,
    pub term: i64,
}

impl Performance {
    pub fn new(id: impl Into<String>, name: impl Into<String>, year: i64, term: i64) -> Performance {
        Performance {
            id: id.into(),
            name: name.into(),
            year,
            term,
        }
    }
}
