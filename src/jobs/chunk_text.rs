//! Text chunking for embedding ingestion.
//!
//! Splits lesson content (articles and video transcripts) into bounded,
//! overlapping character chunks and reports how many were produced per
//! source kind. Downstream embedding and vector-store writes belong to the
//! caller; this job only does the CPU-bound splitting.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::JobContext;
use crate::registry::{Job, Violation, describe_violations, parse_payload};

fn default_chunk_size() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    lesson_id: String,
    #[serde(default)]
    articles: Vec<String>,
    #[serde(default)]
    transcripts: Vec<String>,
    /// Chunk length in characters.
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_overlap")]
    overlap: usize,
}

impl ChunkPayload {
    fn check(&self) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        if self.chunk_size == 0 {
            violations.push(Violation::new("chunk_size", "must be greater than zero"));
        }
        if self.overlap >= self.chunk_size {
            violations.push(Violation::new("overlap", "must be smaller than chunk_size"));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Chunks lesson texts for vector-search ingestion.
#[derive(Debug, Default)]
pub struct ChunkTextJob;

impl Job for ChunkTextJob {
    fn name(&self) -> &str {
        "chunk-text"
    }

    fn description(&self) -> &str {
        "Splits lesson content into overlapping chunks for embedding"
    }

    fn validate(&self, payload: &Value) -> Result<(), Vec<Violation>> {
        parse_payload::<ChunkPayload>(payload)?.check()
    }

    fn run(&self, payload: Value, ctx: &JobContext) -> anyhow::Result<Value> {
        let payload: ChunkPayload = parse_payload(&payload)
            .map_err(|violations| anyhow::anyhow!(describe_violations(&violations)))?;
        payload
            .check()
            .map_err(|violations| anyhow::anyhow!(describe_violations(&violations)))?;

        let article_chunks = chunk_all(&payload.articles, payload.chunk_size, payload.overlap);
        ctx.progress(json!({ "stage": "articles", "chunks": article_chunks.len() }));

        let transcript_chunks =
            chunk_all(&payload.transcripts, payload.chunk_size, payload.overlap);
        ctx.progress(json!({ "stage": "transcripts", "chunks": transcript_chunks.len() }));

        let total = article_chunks.len() + transcript_chunks.len();
        if total == 0 {
            anyhow::bail!("no content chunks were created; check the lesson content");
        }

        Ok(json!({
            "lesson_id": payload.lesson_id,
            "chunks_created": total,
            "breakdown": {
                "article_chunks": article_chunks.len(),
                "transcript_chunks": transcript_chunks.len(),
            },
            "chunks": article_chunks
                .into_iter()
                .chain(transcript_chunks)
                .collect::<Vec<_>>(),
        }))
    }
}

fn chunk_all(texts: &[String], size: usize, overlap: usize) -> Vec<String> {
    texts
        .iter()
        .flat_map(|text| chunk(text, size, overlap))
        .collect()
}

/// Overlapping character windows; the final partial window is kept.
fn chunk(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use std::sync::Arc;

    fn ctx() -> JobContext {
        JobContext::new("test".to_string(), Arc::new(EventBus::new()))
    }

    #[test]
    fn chunks_overlap_and_cover_the_text() {
        let text = "abcdefghij".to_string();
        let chunks = chunk(&text, 4, 2);
        assert_eq!(chunks, vec!["abcd", "cdef", "efgh", "ghij"]);
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk("hi", 1000, 200), vec!["hi"]);
    }

    #[test]
    fn counts_chunks_per_source_kind() {
        let payload = json!({
            "lesson_id": "lesson-1",
            "articles": ["abcdefghij"],
            "transcripts": ["0123456789", "xyz"],
            "chunk_size": 4,
            "overlap": 2,
        });
        let result = ChunkTextJob.run(payload, &ctx()).unwrap();
        assert_eq!(result["breakdown"]["article_chunks"], json!(4));
        assert_eq!(result["breakdown"]["transcript_chunks"], json!(5));
        assert_eq!(result["chunks_created"], json!(9));
    }

    #[test]
    fn empty_content_is_a_job_failure() {
        let payload = json!({ "lesson_id": "lesson-1" });
        let err = ChunkTextJob.run(payload, &ctx()).unwrap_err();
        assert!(err.to_string().contains("no content chunks"));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = ChunkTextJob
            .validate(&json!({ "lesson_id": "l", "chunk_size": 10, "overlap": 10 }))
            .unwrap_err();
        assert_eq!(err[0].field, "overlap");
    }
}
