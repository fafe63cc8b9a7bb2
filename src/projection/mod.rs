//! Projection planning.
//!
//! Turns one canonical paper into the complete set of denormalized items needed
//! to answer every access pattern: the canonical row, one row per category, one
//! per author and one per keyword. All rows share one payload value.

use thiserror::Error;
use tracing::warn;

use crate::config::DatePolicy;
use crate::keys::{self, NormalizedDate};
use crate::keywords;
use crate::models::{KindCounts, Paper, PaperPayload, ProjectionItem, ProjectionKind};

/// Errors that reject a paper before any of its items are produced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    /// The paper has no identifier
    #[error("Paper is missing arxiv_id (title: {title:?})")]
    MissingId { title: String },

    /// The publication timestamp could not be parsed and the policy rejects it
    #[error("Paper {arxiv_id} has unparseable publication date {raw:?}")]
    MalformedDate { arxiv_id: String, raw: String },
}

/// Result type for projection planning.
pub type ProjectionResult<T> = Result<T, ProjectionError>;

/// The items planned for one paper.
#[derive(Debug, Clone)]
pub struct ProjectionPlan {
    pub arxiv_id: String,
    pub items: Vec<ProjectionItem>,

    /// Number of items of each kind
    pub breakdown: KindCounts,

    /// Whether the publication date fell back to truncation
    pub date_truncated: bool,
}

/// Computes projection items for papers.
#[derive(Debug, Clone)]
pub struct ProjectionPlanner {
    keyword_limit: usize,
    date_policy: DatePolicy,
}

impl Default for ProjectionPlanner {
    fn default() -> Self {
        Self::new(keywords::DEFAULT_KEYWORD_LIMIT, DatePolicy::default())
    }
}

impl ProjectionPlanner {
    pub fn new(keyword_limit: usize, date_policy: DatePolicy) -> Self {
        Self {
            keyword_limit,
            date_policy,
        }
    }

    /// Keywords for a paper: the explicit list lowercased, or extracted from the
    /// abstract when no explicit keywords are given. Duplicates are dropped,
    /// keeping first occurrence.
    pub fn keywords_for(&self, paper: &Paper) -> Vec<String> {
        let raw = match &paper.keywords {
            Some(explicit) if !explicit.is_empty() => {
                explicit.iter().map(|k| k.to_lowercase()).collect()
            }
            _ => keywords::extract_keywords(&paper.abstract_text, self.keyword_limit),
        };
        dedup_preserving_order(raw.into_iter().filter(|k| !k.is_empty()))
    }

    /// Plan every projection item for one paper.
    ///
    /// # Arguments
    /// * `paper` - The canonical paper record
    ///
    /// # Returns
    /// The plan: one canonical item, then one item per distinct category, author
    /// and keyword, in that order
    ///
    /// # Errors
    /// Returns `ProjectionError::MissingId` if the paper has no (or an empty) id,
    /// or `ProjectionError::MalformedDate` when the date policy is `Reject` and
    /// the timestamp does not parse
    pub fn plan(&self, paper: &Paper) -> ProjectionResult<ProjectionPlan> {
        let arxiv_id = match paper.arxiv_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(ProjectionError::MissingId {
                    title: paper.title.clone(),
                })
            }
        };

        let date = keys::normalize_date(&paper.published);
        let date_truncated = date.is_truncated();
        if date_truncated {
            if self.date_policy == DatePolicy::Reject {
                return Err(ProjectionError::MalformedDate {
                    arxiv_id,
                    raw: paper.published.clone(),
                });
            }
            warn!(
                "Paper {} has unparseable date {:?}, using {:?}",
                arxiv_id,
                paper.published,
                date.as_str()
            );
        }

        let payload = build_payload(paper, &arxiv_id, date, self.keywords_for(paper));

        let categories = dedup_preserving_order(paper.categories.iter().cloned());
        let authors = dedup_preserving_order(paper.authors.iter().cloned());

        let mut items = Vec::with_capacity(1 + categories.len() + authors.len() + payload.keywords.len());
        let mut breakdown = KindCounts::default();

        let mut push = |kind: ProjectionKind, pattern_key: &str| {
            let key = keys::encode(kind, pattern_key, &payload.published_date, &arxiv_id);
            items.push(ProjectionItem {
                partition_key: key.partition_key,
                sort_key: key.sort_key,
                secondary: key.secondary,
                payload: payload.clone(),
            });
            breakdown.add(kind, 1);
        };

        push(ProjectionKind::Paper, "");
        for category in &categories {
            push(ProjectionKind::Category, category);
        }
        for author in &authors {
            push(ProjectionKind::Author, author);
        }
        for keyword in &payload.keywords {
            push(ProjectionKind::Keyword, keyword);
        }

        Ok(ProjectionPlan {
            arxiv_id,
            items,
            breakdown,
            date_truncated,
        })
    }
}

fn build_payload(paper: &Paper, arxiv_id: &str, date: NormalizedDate, keywords: Vec<String>) -> PaperPayload {
    let published_date = date.into_string();
    let published = if paper.published.is_empty() {
        format!("{}T00:00:00Z", published_date)
    } else {
        paper.published.clone()
    };

    PaperPayload {
        arxiv_id: arxiv_id.to_string(),
        title: paper.title.clone(),
        authors: paper.authors.clone(),
        abstract_text: paper.abstract_text.clone(),
        categories: paper.categories.clone(),
        keywords,
        published,
        published_date,
    }
}

fn dedup_preserving_order(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_paper() -> Paper {
        Paper {
            arxiv_id: Some("2301.00001".to_string()),
            title: "Graph Learning".to_string(),
            authors: vec!["Alice Smith".to_string()],
            abstract_text: "we propose a new method for graph learning".to_string(),
            categories: vec!["cs.LG".to_string()],
            published: "2023-01-15T00:00:00Z".to_string(),
            keywords: None,
        }
    }

    #[test]
    fn test_scenario_fan_out() {
        let plan = ProjectionPlanner::default().plan(&scenario_paper()).unwrap();

        assert_eq!(plan.arxiv_id, "2301.00001");
        assert_eq!(plan.breakdown.paper, 1);
        assert_eq!(plan.breakdown.category, 1);
        assert_eq!(plan.breakdown.author, 1);
        assert!(plan.breakdown.keyword <= 10);
        assert_eq!(plan.breakdown.keyword, 3);
        assert_eq!(plan.items.len(), plan.breakdown.total());

        let keys: Vec<(&str, &str)> = plan.items.iter().map(|i| i.key()).collect();
        assert_eq!(
            keys,
            vec![
                ("PAPER#2301.00001", "A"),
                ("CATEGORY#cs.LG", "2023-01-15#2301.00001"),
                ("AUTHOR#Alice Smith", "2023-01-15#2301.00001"),
                ("KEYWORD#new", "2023-01-15#2301.00001"),
                ("KEYWORD#graph", "2023-01-15#2301.00001"),
                ("KEYWORD#learning", "2023-01-15#2301.00001"),
            ]
        );
    }

    #[test]
    fn test_payload_identical_across_items() {
        let plan = ProjectionPlanner::default().plan(&scenario_paper()).unwrap();
        let first = &plan.items[0].payload;
        assert!(plan.items.iter().all(|item| &item.payload == first));

        assert_eq!(first.arxiv_id, "2301.00001");
        assert_eq!(first.published, "2023-01-15T00:00:00Z");
        assert_eq!(first.published_date, "2023-01-15");
        assert_eq!(first.keywords, vec!["new", "graph", "learning"]);
    }

    #[test]
    fn test_missing_id_rejected() {
        let mut paper = scenario_paper();
        paper.arxiv_id = None;
        let err = ProjectionPlanner::default().plan(&paper).unwrap_err();
        assert!(matches!(err, ProjectionError::MissingId { .. }));

        paper.arxiv_id = Some("   ".to_string());
        assert!(ProjectionPlanner::default().plan(&paper).is_err());
    }

    #[test]
    fn test_explicit_keywords_lowercased_and_preferred() {
        let mut paper = scenario_paper();
        paper.keywords = Some(vec!["GNN".to_string(), "Graphs".to_string(), "gnn".to_string()]);
        let plan = ProjectionPlanner::default().plan(&paper).unwrap();
        assert_eq!(plan.items[0].payload.keywords, vec!["gnn", "graphs"]);
        assert_eq!(plan.breakdown.keyword, 2);
    }

    #[test]
    fn test_empty_explicit_keywords_fall_back_to_extraction() {
        let mut paper = scenario_paper();
        paper.keywords = Some(vec![]);
        let plan = ProjectionPlanner::default().plan(&paper).unwrap();
        assert_eq!(plan.items[0].payload.keywords, vec!["new", "graph", "learning"]);
    }

    #[test]
    fn test_degenerate_paper_yields_only_canonical_item() {
        let paper = Paper {
            arxiv_id: Some("2301.00002".to_string()),
            published: "2023-01-16".to_string(),
            ..Default::default()
        };
        let plan = ProjectionPlanner::default().plan(&paper).unwrap();
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].partition_key, "PAPER#2301.00002");
        assert_eq!(plan.items[0].payload.published, "2023-01-16");
        assert_eq!(plan.items[0].payload.published_date, "2023-01-16");
    }

    #[test]
    fn test_duplicate_categories_and_authors_collapse() {
        let mut paper = scenario_paper();
        paper.categories = vec!["cs.LG".to_string(), "cs.AI".to_string(), "cs.LG".to_string()];
        paper.authors = vec!["Alice Smith".to_string(), "Alice Smith".to_string()];
        let plan = ProjectionPlanner::default().plan(&paper).unwrap();
        assert_eq!(plan.breakdown.category, 2);
        assert_eq!(plan.breakdown.author, 1);
        // The payload keeps the source lists untouched
        assert_eq!(plan.items[0].payload.categories.len(), 3);
    }

    #[test]
    fn test_malformed_date_policies() {
        let mut paper = scenario_paper();
        paper.published = "January 15th, 2023".to_string();

        let plan = ProjectionPlanner::default().plan(&paper).unwrap();
        assert!(plan.date_truncated);
        assert_eq!(plan.items[1].sort_key, "January 15#2301.00001");

        let strict = ProjectionPlanner::new(10, DatePolicy::Reject);
        let err = strict.plan(&paper).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::MalformedDate {
                arxiv_id: "2301.00001".to_string(),
                raw: "January 15th, 2023".to_string(),
            }
        );
    }
}
