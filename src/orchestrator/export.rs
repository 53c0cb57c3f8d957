//! Exporter collaborator (spec §6): writes one file per page plus
//! consolidation exports, under `${CRAWL_OUTPUT_DIR}/{crawl_id}/`. Each
//! page file is YAML-frontmatter + body; names derive from the URL with
//! a safe-character filter plus a timestamp + id prefix.

use crate::models::{CrawlProgress, ScrapeMetadata};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("export io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export serialization error: {0}")]
    Serialize(String),
}

#[derive(Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Exporter {
            output_dir: output_dir.into(),
        }
    }

    fn crawl_dir(&self, crawl_id: &str) -> PathBuf {
        self.output_dir.join(crawl_id)
    }

    /// Write one page file: YAML frontmatter (url/title/status/fetched-at)
    /// followed by the page body. Returns the written path.
    pub async fn export_page(
        &self,
        url: &str,
        content: &str,
        title: Option<&str>,
        crawl_id: &str,
        metadata: &ScrapeMetadata,
        now_ms: u64,
    ) -> Result<PathBuf, ExportError> {
        let dir = self.crawl_dir(crawl_id);
        tokio::fs::create_dir_all(&dir).await?;

        let id = &crate::queue::hash_job_id(crawl_id, url)[..12];
        let filename = format!("{now_ms}-{id}-{}.md", safe_filename_from_url(url));
        let path = dir.join(filename);

        let frontmatter = Frontmatter {
            url: url.to_string(),
            title: title.map(str::to_string),
            status: metadata.status,
            fetched_at_ms: now_ms,
        };
        let yaml = serde_yaml::to_string(&frontmatter).map_err(|e| ExportError::Serialize(e.to_string()))?;
        let document = format!("---\n{yaml}---\n\n{content}\n");

        tokio::fs::write(&path, document).await?;
        Ok(path)
    }

    /// Per-crawl summary file (progress + exported file count).
    pub async fn export_summary(&self, crawl_id: &str, progress: &CrawlProgress) -> Result<PathBuf, ExportError> {
        let dir = self.crawl_dir(crawl_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("summary.json");
        let json = serde_json::to_string_pretty(progress).map_err(|e| ExportError::Serialize(e.to_string()))?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    /// Aggregate every exported page file into one consolidated
    /// Markdown or JSON document.
    pub async fn export_consolidated(
        &self,
        crawl_id: &str,
        format: ConsolidatedFormat,
        page_files: &[String],
    ) -> Result<PathBuf, ExportError> {
        let dir = self.crawl_dir(crawl_id);
        tokio::fs::create_dir_all(&dir).await?;

        match format {
            ConsolidatedFormat::Markdown => {
                let mut combined = String::new();
                for file in page_files {
                    if let Ok(body) = tokio::fs::read_to_string(file).await {
                        combined.push_str(&body);
                        combined.push_str("\n\n---\n\n");
                    }
                }
                let path = dir.join("consolidated.md");
                tokio::fs::write(&path, combined).await?;
                Ok(path)
            }
            ConsolidatedFormat::Json => {
                let mut pages = Vec::new();
                for file in page_files {
                    if let Ok(body) = tokio::fs::read_to_string(file).await {
                        pages.push(serde_json::json!({ "file": file, "content": body }));
                    }
                }
                let path = dir.join("consolidated.json");
                let json = serde_json::to_string_pretty(&pages).map_err(|e| ExportError::Serialize(e.to_string()))?;
                tokio::fs::write(&path, json).await?;
                Ok(path)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ConsolidatedFormat {
    Markdown,
    Json,
}

#[derive(Debug, serde::Serialize)]
struct Frontmatter {
    url: String,
    title: Option<String>,
    status: u16,
    fetched_at_ms: u64,
}

fn safe_filename_from_url(url: &str) -> String {
    let stripped = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let sanitized = sanitize_filename::sanitize(stripped.replace('/', "-"));
    if sanitized.is_empty() {
        "page".to_string()
    } else {
        sanitized.chars().take(80).collect()
    }
}

#[allow(dead_code)]
fn ensure_within(base: &Path, candidate: &Path) -> bool {
    candidate.starts_with(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_filename_strips_scheme_and_slashes() {
        let name = safe_filename_from_url("https://example.com/a/b?c=1");
        assert!(!name.contains('/'));
        assert!(!name.starts_with("https"));
    }

    #[tokio::test]
    async fn export_page_writes_yaml_frontmatter_and_body() {
        let dir = tempdir();
        let exporter = Exporter::new(dir.clone());
        let metadata = ScrapeMetadata {
            status: 200,
            headers: Default::default(),
            load_time_ms: 1,
            processing_time_ms: 1,
            used_browser: false,
            ..Default::default()
        };
        let path = exporter
            .export_page("https://example.com/a", "Hello", Some("A"), "crawl1", &metadata, 1000)
            .await
            .unwrap();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.starts_with("---\n"));
        assert!(written.contains("Hello"));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    fn tempdir() -> PathBuf {
        std::env::temp_dir().join(format!("crate-export-test-{}", std::process::id()))
    }
}
