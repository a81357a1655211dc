use tempfile::TempDir;

use ragline::error::RagError;
use ragline::models::{ContentChunk, Metadata};
use ragline::store::VectorStore;

async fn open_store(tmp: &TempDir) -> VectorStore {
    let store = VectorStore::connect(&tmp.path().join("ragline.sqlite"))
        .await
        .unwrap();
    store.init_schema().await.unwrap();
    store
}

fn make_chunk(content_id: &str, text: &str, content_type: &str) -> ContentChunk {
    let mut metadata = Metadata::new();
    metadata.insert("type".to_string(), serde_json::json!(content_type));
    ContentChunk {
        content_id: content_id.to_string(),
        source_path: "docs/a.md".to_string(),
        text: text.to_string(),
        metadata,
        chunk_index: 0,
        hash: format!("hash-{}", text.len()),
    }
}

#[tokio::test]
async fn test_upsert_idempotent_latest_wins() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let first = make_chunk("a_0", "original text", "content");
    store.upsert(&first, &[1.0, 0.0]).await.unwrap();

    let second = make_chunk("a_0", "replacement text", "content");
    store.upsert(&second, &[0.0, 1.0]).await.unwrap();

    assert_eq!(store.embedding_count().await.unwrap(), 1);

    let results = store.similarity_search(&[0.0, 1.0], 5, 0.5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "replacement text");
    assert!((results[0].similarity - 1.0).abs() < 1e-6);

    let hash = store.chunk_hash("a_0").await.unwrap();
    assert_eq!(hash.as_deref(), Some(second.hash.as_str()));
}

#[tokio::test]
async fn test_similarity_search_ordering_and_limit() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .upsert(&make_chunk("a_0", "exact match", "content"), &[1.0, 0.0])
        .await
        .unwrap();
    store
        .upsert(&make_chunk("b_0", "close match", "content"), &[0.8, 0.6])
        .await
        .unwrap();
    store
        .upsert(&make_chunk("c_0", "orthogonal", "content"), &[0.0, 1.0])
        .await
        .unwrap();

    let results = store.similarity_search(&[1.0, 0.0], 5, 0.1).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content_id, "a_0");
    assert_eq!(results[1].content_id, "b_0");
    assert!(results[0].similarity > results[1].similarity);
    for r in &results {
        assert!(r.similarity > 0.1);
    }

    let limited = store.similarity_search(&[1.0, 0.0], 1, 0.1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].content_id, "a_0");
}

#[tokio::test]
async fn test_similarity_threshold_is_strict() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .upsert(&make_chunk("a_0", "aligned", "content"), &[1.0, 0.0])
        .await
        .unwrap();
    store
        .upsert(&make_chunk("b_0", "orthogonal", "content"), &[0.0, 1.0])
        .await
        .unwrap();

    // The orthogonal row scores exactly 0.0, which does not strictly
    // exceed a 0.0 threshold.
    let results = store.similarity_search(&[1.0, 0.0], 5, 0.0).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content_id, "a_0");
}

#[tokio::test]
async fn test_dimension_pinned_per_deployment() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .upsert(&make_chunk("a_0", "two dims", "content"), &[1.0, 0.0])
        .await
        .unwrap();

    let err = store
        .upsert(&make_chunk("b_0", "three dims", "content"), &[1.0, 0.0, 0.0])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Store(_)));

    let err = store
        .similarity_search(&[1.0, 0.0, 0.0], 5, 0.0)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Store(_)));
}

#[tokio::test]
async fn test_get_by_metadata_field() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .upsert(&make_chunk("skills_rust_0", "Rust skill", "skill"), &[1.0, 0.0])
        .await
        .unwrap();
    store
        .upsert(&make_chunk("about_0", "About section", "section"), &[0.0, 1.0])
        .await
        .unwrap();
    store
        .upsert(&make_chunk("skills_sql_0", "SQL skill", "skill"), &[0.5, 0.5])
        .await
        .unwrap();

    let skills = store.get_by_metadata_field("type", "skill").await.unwrap();
    assert_eq!(skills.len(), 2);
    // Exact match, no ranking: ordered by content_id.
    assert_eq!(skills[0].content_id, "skills_rust_0");
    assert_eq!(skills[1].content_id, "skills_sql_0");

    let none = store.get_by_metadata_field("type", "project").await.unwrap();
    assert!(none.is_empty());

    let err = store
        .get_by_metadata_field("type'; DROP TABLE", "x")
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Store(_)));
}

#[tokio::test]
async fn test_schema_init_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.init_schema().await.unwrap();
    store.init_schema().await.unwrap();
    assert_eq!(store.embedding_count().await.unwrap(), 0);
}
