//! Corpus enumeration and document metadata extraction.
//!
//! Walks the configured corpus root for matching documents and derives the
//! base metadata each chunk inherits: frontmatter fields, a content hash,
//! and a `type`/`section`/`category` classification inferred from the
//! document's path.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::RagError;
use crate::models::Metadata;

/// Enumerate corpus documents as root-relative paths, sorted for
/// deterministic ordering.
pub fn scan_corpus(config: &Config) -> Result<Vec<String>> {
    let root = &config.corpus.root;
    if !root.exists() {
        anyhow::bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.corpus.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
    default_excludes.extend(config.corpus.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut paths = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        paths.push(rel_str);
    }

    paths.sort();
    Ok(paths)
}

/// Read one corpus document by its root-relative path.
pub fn load_document(root: &Path, relative_path: &str) -> Result<String, RagError> {
    std::fs::read_to_string(root.join(relative_path))
        .map_err(|e| RagError::ContentUnavailable(format!("{}: {}", relative_path, e)))
}

/// Stable document identifier derived from the relative path.
///
/// `sections/about.md` becomes `sections_about`; chunk IDs append the
/// chunk index, so re-ingestion upserts the same rows.
pub fn document_id(relative_path: &str) -> String {
    let stem = relative_path
        .strip_suffix(".md")
        .unwrap_or(relative_path);
    stem.replace('/', "_")
}

/// Extract base metadata for a document: frontmatter fields, content hash,
/// and a path-derived classification.
pub fn extract_metadata(content: &str, relative_path: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(
        "file_path".to_string(),
        serde_json::json!(relative_path),
    );
    metadata.insert(
        "content_hash".to_string(),
        serde_json::json!(content_hash(content)),
    );

    // Frontmatter: a leading `---` block of `key: value` lines.
    if let Some(rest) = content.strip_prefix("---") {
        if let Some(end) = rest.find("---") {
            for line in rest[..end].lines() {
                if let Some((key, value)) = line.split_once(':') {
                    let key = key.trim();
                    if key.is_empty() {
                        continue;
                    }
                    let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                    metadata.insert(key.to_string(), serde_json::json!(value));
                }
            }
        }
    }

    // Classify by path layout.
    if relative_path.contains("sections/") {
        metadata.insert("type".to_string(), serde_json::json!("section"));
        let section = Path::new(relative_path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        metadata.insert("section".to_string(), serde_json::json!(section));
    } else if relative_path.contains("components/skills/") {
        metadata.insert("type".to_string(), serde_json::json!("skill"));
        metadata.insert("category".to_string(), serde_json::json!("skills"));
    } else if relative_path.contains("components/projects/") {
        metadata.insert("type".to_string(), serde_json::json!("project"));
        metadata.insert("category".to_string(), serde_json::json!("projects"));
    } else if relative_path.contains("rag-knowledge-base/") {
        metadata.insert("type".to_string(), serde_json::json!("knowledge"));
        metadata.insert("category".to_string(), serde_json::json!("knowledge_base"));
    } else {
        metadata.insert("type".to_string(), serde_json::json!("content"));
    }

    metadata
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_strips_extension_and_slashes() {
        assert_eq!(document_id("sections/about.md"), "sections_about");
        assert_eq!(document_id("notes.md"), "notes");
        assert_eq!(document_id("a/b/c.txt"), "a_b_c.txt");
    }

    #[test]
    fn test_frontmatter_parsed() {
        let content = "---\ntitle: \"My Page\"\norder: 3\n---\n\nBody text.";
        let meta = extract_metadata(content, "sections/about.md");
        assert_eq!(meta["title"], serde_json::json!("My Page"));
        assert_eq!(meta["order"], serde_json::json!("3"));
        assert_eq!(meta["type"], serde_json::json!("section"));
        assert_eq!(meta["section"], serde_json::json!("about"));
    }

    #[test]
    fn test_path_classification() {
        let meta = extract_metadata("x", "components/skills/rust.md");
        assert_eq!(meta["type"], serde_json::json!("skill"));
        assert_eq!(meta["category"], serde_json::json!("skills"));

        let meta = extract_metadata("x", "components/projects/demo.md");
        assert_eq!(meta["type"], serde_json::json!("project"));

        let meta = extract_metadata("x", "rag-knowledge-base/faq.md");
        assert_eq!(meta["type"], serde_json::json!("knowledge"));

        let meta = extract_metadata("x", "misc/readme.md");
        assert_eq!(meta["type"], serde_json::json!("content"));
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let a = extract_metadata("one", "a.md");
        let b = extract_metadata("two", "a.md");
        assert_ne!(a["content_hash"], b["content_hash"]);
    }
}
