//! Common test utilities for hindsight-embeddings integration tests.
//!
//! Backends are simulated with wiremock; nothing here needs network access.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// `count` input texts with distinct contents
pub fn texts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("memory {}", i)).collect()
}

/// TEI `/embed` body: one vector per input, each filled with `offset + position`
pub fn tei_vectors(count: usize, dim: usize, offset: usize) -> serde_json::Value {
    let data: Vec<Vec<f32>> = (0..count)
        .map(|i| vec![(offset + i) as f32; dim])
        .collect();
    serde_json::json!(data)
}

/// OpenAI `/embeddings` body with items in the given index order
pub fn openai_response(indices: &[usize], dim: usize) -> serde_json::Value {
    let data: Vec<serde_json::Value> = indices
        .iter()
        .map(|&i| {
            serde_json::json!({
                "object": "embedding",
                "index": i,
                "embedding": vec![i as f32; dim]
            })
        })
        .collect();

    serde_json::json!({
        "object": "list",
        "data": data,
        "model": "text-embedding-3-small",
        "usage": {"prompt_tokens": 8, "total_tokens": 8}
    })
}

/// Write a config file with the given `[embeddings]` body
pub fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, format!("[embeddings]\n{}", body)).unwrap();
    path
}
