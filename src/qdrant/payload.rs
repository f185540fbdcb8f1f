//! Helpers for constructing and identifying Qdrant points.

use crate::processing::ChunkRecord;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Compute the SHA-256 hex digest of a chunk's text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive a stable point id from the chunk's origin, position, and content.
///
/// Re-ingesting the same document yields the same ids, so Qdrant overwrites instead of
/// accumulating duplicates.
pub fn stable_point_id(record: &ChunkRecord) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(record.metadata.file_name.as_deref().unwrap_or_default());
    hasher.update([0_u8]);
    hasher.update(record.metadata.chunk_id.to_le_bytes());
    hasher.update([0_u8]);
    hasher.update(record.content.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0_u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// Build the point object stored for a chunk.
pub(crate) fn build_point(record: &ChunkRecord, indexed_at: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("content".into(), Value::String(record.content.clone()));
    payload.insert("chunk_id".into(), json!(record.metadata.chunk_id));
    payload.insert(
        "chunk_hash".into(),
        Value::String(compute_chunk_hash(&record.content)),
    );
    payload.insert("indexed_at".into(), Value::String(indexed_at.to_string()));
    if let Some(source) = &record.metadata.source {
        payload.insert("source".into(), Value::String(source.clone()));
    }
    if let Some(file_name) = &record.metadata.file_name {
        payload.insert("file_name".into(), Value::String(file_name.clone()));
    }

    json!({
        "id": stable_point_id(record).to_string(),
        "vector": record.embedding,
        "payload": Value::Object(payload),
    })
}

/// Current UTC time in RFC 3339 form.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::ChunkMetadata;

    fn record(file_name: &str, chunk_id: usize, content: &str) -> ChunkRecord {
        ChunkRecord {
            content: content.into(),
            embedding: vec![0.5, 0.5],
            metadata: ChunkMetadata {
                chunk_id,
                source: Some("folder".into()),
                file_name: Some(file_name.into()),
            },
        }
    }

    #[test]
    fn point_ids_are_stable_across_calls() {
        let first = stable_point_id(&record("a.txt", 0, "hello"));
        let second = stable_point_id(&record("a.txt", 0, "hello"));
        assert_eq!(first, second);
    }

    #[test]
    fn point_ids_differ_by_position_and_file() {
        let base = stable_point_id(&record("a.txt", 0, "hello"));
        assert_ne!(base, stable_point_id(&record("a.txt", 1, "hello")));
        assert_ne!(base, stable_point_id(&record("b.txt", 0, "hello")));
    }

    #[test]
    fn point_payload_carries_attribution() {
        let point = build_point(&record("a.txt", 3, "hello"), "2026-01-01T00:00:00Z");
        assert_eq!(point["payload"]["chunk_id"], json!(3));
        assert_eq!(point["payload"]["file_name"], json!("a.txt"));
        assert_eq!(point["payload"]["source"], json!("folder"));
        assert_eq!(point["payload"]["content"], json!("hello"));
        assert_eq!(point["payload"]["chunk_hash"], json!(compute_chunk_hash("hello")));
    }
}
