//! Core data models for the paper projection store.
//!
//! This module contains the fundamental data structures used across the application:
//! the canonical paper record as it arrives from an input source, the denormalized
//! payload copied into every projection, and the projection item itself.

use serde::{Deserialize, Serialize};

/// Canonical metadata for a research paper, as loaded from an input source.
///
/// Every field except the identifier may be absent in the source document and
/// defaults to empty. The identifier is optional here so that a record missing it
/// can still be parsed and then rejected by the projection planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// arXiv identifier (e.g. "2301.12345")
    #[serde(default)]
    pub arxiv_id: Option<String>,

    /// Paper title
    #[serde(default)]
    pub title: String,

    /// Ordered list of author names
    #[serde(default)]
    pub authors: Vec<String>,

    /// Abstract text, used for keyword extraction
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,

    /// Category tags (e.g. "cs.LG")
    #[serde(default)]
    pub categories: Vec<String>,

    /// Raw publication timestamp (e.g. "2023-01-15T10:30:00Z")
    #[serde(default)]
    pub published: String,

    /// Explicit keyword list; extracted from the abstract when absent or empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

/// The full denormalized attribute set stored with every projection item.
///
/// All items derived from one paper carry an identical payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaperPayload {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub categories: Vec<String>,
    /// Lowercased keywords backing the keyword index
    pub keywords: Vec<String>,
    /// Raw publication timestamp, or `<date>T00:00:00Z` when the source had none
    pub published: String,
    /// Normalized `YYYY-MM-DD` date used in sort keys
    pub published_date: String,
}

/// Alternate key pair under which an item is visible in a secondary index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecondaryKey {
    /// Name of the secondary index (e.g. "AuthorIndex")
    pub index: String,
    pub partition_key: String,
    pub sort_key: String,
}

/// One denormalized copy of a paper stored under one access-pattern key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectionItem {
    /// Primary hash key
    pub partition_key: String,

    /// Primary range key
    pub sort_key: String,

    /// Secondary index projection, if this item serves an index-backed pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<SecondaryKey>,

    /// Denormalized paper attributes
    #[serde(flatten)]
    pub payload: PaperPayload,
}

impl ProjectionItem {
    /// The primary key pair identifying this item in the store.
    pub fn key(&self) -> (&str, &str) {
        (&self.partition_key, &self.sort_key)
    }

    /// Which access pattern this item serves, derived from its partition key prefix.
    pub fn kind(&self) -> Option<ProjectionKind> {
        ProjectionKind::from_partition_key(&self.partition_key)
    }
}

/// The four kinds of projection produced for each paper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionKind {
    /// Canonical self-item (`PAPER#<id>`)
    Paper,

    /// Per-category item (`CATEGORY#<category>`)
    Category,

    /// Per-author item (`AUTHOR#<name>`)
    Author,

    /// Per-keyword item (`KEYWORD#<keyword>`)
    Keyword,
}

impl ProjectionKind {
    /// All kinds, in the order the run summary reports them.
    pub const ALL: [ProjectionKind; 4] = [
        ProjectionKind::Category,
        ProjectionKind::Author,
        ProjectionKind::Keyword,
        ProjectionKind::Paper,
    ];

    /// The partition key prefix for this kind, including the `#` separator.
    pub fn prefix(self) -> &'static str {
        match self {
            ProjectionKind::Paper => "PAPER#",
            ProjectionKind::Category => "CATEGORY#",
            ProjectionKind::Author => "AUTHOR#",
            ProjectionKind::Keyword => "KEYWORD#",
        }
    }

    /// Human-readable label used in logs and summaries.
    pub fn label(self) -> &'static str {
        match self {
            ProjectionKind::Paper => "Paper",
            ProjectionKind::Category => "Category",
            ProjectionKind::Author => "Author",
            ProjectionKind::Keyword => "Keyword",
        }
    }

    /// Determine the kind of a partition key from its prefix.
    ///
    /// # Returns
    /// `None` if the key does not start with a known prefix
    pub fn from_partition_key(partition_key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| partition_key.starts_with(kind.prefix()))
    }
}

/// Per-kind item counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KindCounts {
    pub paper: usize,
    pub category: usize,
    pub author: usize,
    pub keyword: usize,
}

impl KindCounts {
    /// Add `n` to the counter for `kind`.
    pub fn add(&mut self, kind: ProjectionKind, n: usize) {
        match kind {
            ProjectionKind::Paper => self.paper += n,
            ProjectionKind::Category => self.category += n,
            ProjectionKind::Author => self.author += n,
            ProjectionKind::Keyword => self.keyword += n,
        }
    }

    pub fn get(&self, kind: ProjectionKind) -> usize {
        match kind {
            ProjectionKind::Paper => self.paper,
            ProjectionKind::Category => self.category,
            ProjectionKind::Author => self.author,
            ProjectionKind::Keyword => self.keyword,
        }
    }

    /// Sum across all kinds.
    pub fn total(&self) -> usize {
        self.paper + self.category + self.author + self.keyword
    }

    /// Merge another set of counts into this one.
    pub fn merge(&mut self, other: &KindCounts) {
        for kind in ProjectionKind::ALL {
            self.add(kind, other.get(kind));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_partition_key() {
        assert_eq!(ProjectionKind::from_partition_key("PAPER#2301.00001"), Some(ProjectionKind::Paper));
        assert_eq!(ProjectionKind::from_partition_key("CATEGORY#cs.LG"), Some(ProjectionKind::Category));
        assert_eq!(ProjectionKind::from_partition_key("AUTHOR#Alice Smith"), Some(ProjectionKind::Author));
        assert_eq!(ProjectionKind::from_partition_key("KEYWORD#graph"), Some(ProjectionKind::Keyword));
        assert_eq!(ProjectionKind::from_partition_key("VENUE#neurips"), None);
    }

    #[test]
    fn test_kind_counts_merge() {
        let mut a = KindCounts::default();
        a.add(ProjectionKind::Author, 2);
        a.add(ProjectionKind::Paper, 1);

        let mut b = KindCounts::default();
        b.add(ProjectionKind::Author, 1);
        b.add(ProjectionKind::Keyword, 10);

        a.merge(&b);
        assert_eq!(a.author, 3);
        assert_eq!(a.keyword, 10);
        assert_eq!(a.total(), 14);
    }

    #[test]
    fn test_paper_deserializes_with_missing_fields() {
        let paper: Paper = serde_json::from_str(r#"{"arxiv_id": "2301.00001", "abstract": "text"}"#).unwrap();
        assert_eq!(paper.arxiv_id.as_deref(), Some("2301.00001"));
        assert_eq!(paper.abstract_text, "text");
        assert!(paper.authors.is_empty());
        assert!(paper.keywords.is_none());
    }

    #[test]
    fn test_item_serializes_payload_flat() {
        let item = ProjectionItem {
            partition_key: "PAPER#1".to_string(),
            sort_key: "A".to_string(),
            secondary: None,
            payload: PaperPayload {
                arxiv_id: "1".to_string(),
                title: "T".to_string(),
                authors: vec![],
                abstract_text: String::new(),
                categories: vec![],
                keywords: vec![],
                published: "2023-01-01T00:00:00Z".to_string(),
                published_date: "2023-01-01".to_string(),
            },
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["partition_key"], "PAPER#1");
        assert_eq!(value["arxiv_id"], "1");
        assert!(value.get("secondary").is_none());

        let back: ProjectionItem = serde_json::from_value(value).unwrap();
        assert_eq!(back, item);
    }
}
