//! Name Pattern Search
//!
//! Translates the workbench's glob syntax (`*` matches any possibly empty
//! sequence) into a SQL LIKE predicate, and wraps search output in a
//! result handle exposing a count and iteration.

use crate::store::StoreError;
use opsgraph_core::ComponentRecord;

/// LIKE escape character used by the translated predicate
pub(crate) const LIKE_ESCAPE: char = '\\';

/// Optional restrictions applied on top of the name pattern
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Only match components created by this user
    pub creator: Option<String>,
}

impl SearchFilter {
    /// Filter matching components created by the given user
    pub fn by_creator(creator: &str) -> Self {
        Self {
            creator: Some(creator.to_string()),
        }
    }
}

/// Handle over the records matched by a name pattern search
#[derive(Debug, Clone)]
pub struct SearchResults {
    records: Vec<ComponentRecord>,
}

impl SearchResults {
    pub(crate) fn new(records: Vec<ComponentRecord>) -> Self {
        Self { records }
    }

    /// Number of matched components
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate the matched records
    pub fn iter(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.records.iter()
    }
}

impl IntoIterator for SearchResults {
    type Item = ComponentRecord;
    type IntoIter = std::vec::IntoIter<ComponentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a SearchResults {
    type Item = &'a ComponentRecord;
    type IntoIter = std::slice::Iter<'a, ComponentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Translate a `*`-glob into a LIKE pattern
///
/// `*` becomes `%`; literal `%`, `_` and the escape character itself are
/// escaped. Other glob metacharacters (`?`, `[`, `]`) are not part of the
/// supported syntax and are rejected as malformed.
pub(crate) fn glob_to_like(pattern: &str) -> Result<String, StoreError> {
    let mut like = String::with_capacity(pattern.len() + 4);
    for ch in pattern.chars() {
        match ch {
            '*' => like.push('%'),
            '?' | '[' | ']' => {
                return Err(StoreError::MalformedPattern(pattern.to_string()));
            }
            '%' | '_' => {
                like.push(LIKE_ESCAPE);
                like.push(ch);
            }
            c if c == LIKE_ESCAPE => {
                like.push(LIKE_ESCAPE);
                like.push(LIKE_ESCAPE);
            }
            c => like.push(c),
        }
    }
    Ok(like)
}
