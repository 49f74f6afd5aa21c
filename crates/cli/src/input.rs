use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

/// One JSON object per line; blank lines and `#` comments are ignored.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_jsonl(&raw).with_context(|| format!("Invalid JSONL in {}", path.display()))
}

pub fn parse_jsonl<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", index + 1))
        })
        .collect()
}

/// Resume query: a bare vector, or an object carrying the vector and optional text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum QueryFile {
    Vector(Vec<f32>),
    Query {
        #[serde(alias = "embedding")]
        resume_embedding: Vec<f32>,
        #[serde(default)]
        resume_text: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResumeQuery {
    pub embedding: Vec<f32>,
    pub text: Option<String>,
}

pub fn read_query(path: &Path) -> Result<ResumeQuery> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_query(&raw).with_context(|| format!("Invalid resume query in {}", path.display()))
}

pub fn parse_query(raw: &str) -> Result<ResumeQuery> {
    Ok(match serde_json::from_str::<QueryFile>(raw)? {
        QueryFile::Vector(embedding) => ResumeQuery {
            embedding,
            text: None,
        },
        QueryFile::Query {
            resume_embedding,
            resume_text,
        } => ResumeQuery {
            embedding: resume_embedding,
            text: resume_text,
        },
    })
}
