//! JSON file provider.
//!
//! Accepts either a top-level array of paper objects or an object with a
//! `papers` array, which is the shape of the arXiv export produced by the
//! collection scripts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{PaperProvider, ProviderError, ProviderResult};
use crate::models::Paper;

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Bare(Vec<Paper>),
    Wrapped { papers: Vec<Paper> },
}

/// Serves papers loaded once from a JSON document.
#[derive(Debug, Clone)]
pub struct JsonFilePaperProvider {
    source: String,
    papers: Vec<Paper>,
}

impl JsonFilePaperProvider {
    /// Load papers from a JSON file.
    ///
    /// # Errors
    /// Returns `ProviderError::IoError` if the file cannot be read, or
    /// `ProviderError::ParseError` if it is neither a paper array nor an object
    /// with a `papers` array
    pub async fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let contents = tokio::fs::read_to_string(&path).await?;
        let provider = Self::parse(&contents, path.display().to_string())?;
        info!("Loaded {} papers from {}", provider.papers.len(), provider.source);
        Ok(provider)
    }

    /// Parse papers from an in-memory JSON string.
    pub fn from_json_str(contents: &str) -> ProviderResult<Self> {
        Self::parse(contents, "<inline>".to_string())
    }

    fn parse(contents: &str, source: String) -> ProviderResult<Self> {
        let document: Document = serde_json::from_str(contents)
            .map_err(|e| ProviderError::ParseError(format!("{}: {}", source, e)))?;
        let papers = match document {
            Document::Bare(papers) => papers,
            Document::Wrapped { papers } => papers,
        };
        debug!("Parsed {} paper records from {}", papers.len(), source);
        Ok(Self { source, papers })
    }
}

#[async_trait]
impl PaperProvider for JsonFilePaperProvider {
    async fn fetch_papers(&self) -> ProviderResult<Vec<Paper>> {
        Ok(self.papers.clone())
    }

    async fn count_papers(&self) -> ProviderResult<usize> {
        Ok(self.papers.len())
    }

    fn name(&self) -> &str {
        &self.source
    }
}
