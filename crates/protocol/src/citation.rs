use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A `path:line` evidence reference produced by a tool.
///
/// Citations are the only currency the critic accepts: a claim is supported
/// iff every citation it carries was previously observed in a tool result.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Citation {
    pub path: String,
    pub line: usize,
}

#[derive(Error, Debug)]
pub enum CitationParseError {
    #[error("citation '{0}' is not in path:line form")]
    Malformed(String),
    #[error("citation '{0}' has a non-numeric line")]
    BadLine(String),
}

impl Citation {
    pub fn new(path: impl Into<String>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.line)
    }
}

impl FromStr for Citation {
    type Err = CitationParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        // Paths may themselves contain ':' (rare, but legal); the line number
        // is always the final segment.
        let (path, line) = raw
            .rsplit_once(':')
            .ok_or_else(|| CitationParseError::Malformed(raw.to_string()))?;
        if path.is_empty() {
            return Err(CitationParseError::Malformed(raw.to_string()));
        }
        let line: usize = line
            .parse()
            .map_err(|_| CitationParseError::BadLine(raw.to_string()))?;
        Ok(Self {
            path: path.to_string(),
            line,
        })
    }
}

impl From<Citation> for String {
    fn from(c: Citation) -> Self {
        c.to_string()
    }
}

impl TryFrom<String> for Citation {
    type Error = CitationParseError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl JsonSchema for Citation {
    fn schema_name() -> String {
        "Citation".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

/// Ordered, stably de-duplicated collection of citations.
///
/// Insertion order is preserved so event consumers see evidence in the order
/// it was produced; duplicates are dropped on insert.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Citation>", into = "Vec<Citation>")]
pub struct CitationSet {
    items: Vec<Citation>,
    seen: HashSet<String>,
}

impl CitationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a citation, returning true if it was not already present.
    pub fn insert(&mut self, citation: Citation) -> bool {
        let key = citation.to_string();
        if self.seen.insert(key) {
            self.items.push(citation);
            true
        } else {
            false
        }
    }

    pub fn extend<I: IntoIterator<Item = Citation>>(&mut self, citations: I) {
        for c in citations {
            self.insert(c);
        }
    }

    pub fn contains(&self, citation: &Citation) -> bool {
        self.seen.contains(&citation.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Citation> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Citation> {
        self.items.clone()
    }
}

impl From<Vec<Citation>> for CitationSet {
    fn from(items: Vec<Citation>) -> Self {
        let mut set = Self::new();
        set.extend(items);
        set
    }
}

impl From<CitationSet> for Vec<Citation> {
    fn from(set: CitationSet) -> Self {
        set.items
    }
}

impl JsonSchema for CitationSet {
    fn schema_name() -> String {
        "CitationSet".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        Vec::<Citation>::json_schema(gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_round_trips_through_string() {
        let c: Citation = "src/auth/login.py:42".parse().expect("parse");
        assert_eq!(c.path, "src/auth/login.py");
        assert_eq!(c.line, 42);
        assert_eq!(c.to_string(), "src/auth/login.py:42");
    }

    #[test]
    fn citation_keeps_colons_in_path() {
        let c: Citation = "weird:name.rs:7".parse().expect("parse");
        assert_eq!(c.path, "weird:name.rs");
        assert_eq!(c.line, 7);
    }

    #[test]
    fn citation_rejects_malformed_input() {
        assert!("no-line".parse::<Citation>().is_err());
        assert!(":12".parse::<Citation>().is_err());
        assert!("file.rs:abc".parse::<Citation>().is_err());
    }

    #[test]
    fn set_preserves_insertion_order_and_dedupes() {
        let mut set = CitationSet::new();
        assert!(set.insert(Citation::new("a.rs", 1)));
        assert!(set.insert(Citation::new("b.rs", 2)));
        assert!(!set.insert(Citation::new("a.rs", 1)));
        assert!(set.insert(Citation::new("a.rs", 3)));

        let order: Vec<String> = set.iter().map(Citation::to_string).collect();
        assert_eq!(order, vec!["a.rs:1", "b.rs:2", "a.rs:3"]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn set_serde_round_trip() {
        let mut set = CitationSet::new();
        set.insert(Citation::new("src/lib.rs", 10));
        set.insert(Citation::new("src/main.rs", 1));

        let json = serde_json::to_string(&set).expect("serialize");
        assert_eq!(json, r#"["src/lib.rs:10","src/main.rs:1"]"#);

        let back: CitationSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.len(), 2);
        assert!(back.contains(&Citation::new("src/lib.rs", 10)));
    }
}
