//! Entity metadata derived during extraction
//!
//! These records are never needed to drive the crawl; they are what the
//! metadata index stores next to the raw artifacts.

use serde::{Serialize, Serializer};

/// A course category from the catalog selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemesterRecord {
    pub category_id: String,
    pub semester: String,
    pub faculty: String,
    pub major: String,
    /// The full normalized option label
    pub label: String,
}

/// A course enrolment page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseRecord {
    pub course_id: String,
    pub name: String,
    /// Normalized text of the teacher list, empty if the block is missing
    pub teachers_text: String,
    pub teacher_ids: Vec<String>,
}

/// A user profile page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub user_id: String,
    pub display_name: String,
    pub role: String,
    pub fields: ProfileFields,
    /// Every course the profile lists, archived or not
    pub course_ids: Vec<String>,
}

/// Metadata for one extracted entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRecord {
    Semester(SemesterRecord),
    Course(CourseRecord),
    User(UserRecord),
}

/// Ordered field-name → value mapping from a profile section
///
/// Built by zipping labels and values by position: label *i* pairs with value
/// *i*. With unequal counts only the overlapping prefix is kept. A label seen
/// twice keeps its first position and takes the later value. Empty labels are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFields {
    entries: Vec<(String, String)>,
}

impl ProfileFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zips labels with values by position, truncating to the shorter list
    pub fn zip<L, V>(labels: L, values: V) -> Self
    where
        L: IntoIterator<Item = String>,
        V: IntoIterator<Item = String>,
    {
        let mut fields = Self::new();
        for (label, value) in labels.into_iter().zip(values) {
            fields.insert(label, value);
        }
        fields
    }

    /// Inserts or updates a field, keeping first-seen order
    pub fn insert(&mut self, label: String, value: String) {
        if label.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((label, value)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ProfileFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}
