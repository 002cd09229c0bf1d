//! Integration tests for the document store over the in-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use adk_docstore::{
    DocMetaData, DocStoreConfig, DocStoreError, Document, DocumentStore, EmbeddingProvider,
    EnsureOutcome, InMemoryVectorStore, IndexState, Result, derive_id,
};
use async_trait::async_trait;

const VOCAB: [&str; 7] = ["rust", "async", "tokio", "python", "garden", "tomato", "vector"];

/// Bag-of-words embedder over a fixed vocabulary.
///
/// The last component is a constant so that no embedding is the zero vector.
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCAB
            .iter()
            .map(|w| lower.split_whitespace().filter(|t| t == w).count() as f32)
            .collect();
        v.push(0.1);
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        VOCAB.len() + 1
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Embedder that always fails.
struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(DocStoreError::EmbeddingError {
            provider: "failing".to_string(),
            message: "service unavailable".to_string(),
        })
    }

    fn dimensions(&self) -> usize {
        VOCAB.len() + 1
    }
}

/// Embedder producing vectors of a different size.
struct SmallEmbedder;

#[async_trait]
impl EmbeddingProvider for SmallEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        3
    }
}

fn store_for(backend: Arc<InMemoryVectorStore>, collection: &str) -> DocumentStore {
    DocumentStore::builder()
        .config(DocStoreConfig::builder().collection_name(collection).build().unwrap())
        .embedding_provider(Arc::new(KeywordEmbedder::new()))
        .vector_store(backend)
        .build()
        .unwrap()
}

fn new_store(collection: &str) -> DocumentStore {
    store_for(Arc::new(InMemoryVectorStore::new()), collection)
}

/// A document keyed by its content, so distinct texts get distinct ids.
fn tagged(content: &str, tag: &str) -> Document {
    Document::new(content, DocMetaData::new("test").with_id(content).with_extra("tag", tag))
}

#[tokio::test]
async fn reinserting_same_document_overwrites() {
    let store = new_store("docs");
    let metadata = DocMetaData::new("wiki").with_id("doc-1").with_title("Rust");

    let first = store.add_documents(&[Document::new("rust v1", metadata.clone())]).await.unwrap();
    let second = store.add_documents(&[Document::new("rust v2", metadata)]).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.count().await.unwrap(), 1);
    let stored = store.get_documents_by_ids(&first).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "rust v2");
    assert_eq!(stored[0].id(), first[0]);
}

#[tokio::test]
async fn stored_ids_match_derive_id() {
    let store = new_store("docs");
    let metadata = DocMetaData::new("wiki").with_id("page-7");
    let expected = derive_id("page-7", &metadata);

    let ids = store.add_documents(&[Document::new("tomato garden", metadata)]).await.unwrap();
    assert_eq!(ids, vec![expected]);
}

#[tokio::test]
async fn anonymous_documents_with_shared_metadata_do_not_collide() {
    let store = new_store("docs");
    let metadata = DocMetaData::new("upload").with_id("");
    let batch = [
        Document::new("first chunk", metadata.clone()),
        Document::new("second chunk text", metadata.clone()),
        Document::new("third chunk", metadata.clone()),
    ];

    let ids = store.add_documents(&batch).await.unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| !id.is_empty()));
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert_eq!(store.count().await.unwrap(), 3);

    // Re-adding an identical document lands on the same record.
    let again = store.add_documents(&batch[..1]).await.unwrap();
    assert_eq!(again[0], ids[0]);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn extra_fields_cannot_shadow_typed_metadata() {
    let store = new_store("docs");
    store.add_documents(&[tagged("rust", "x")]).await.unwrap();

    for (key, value) in [("title", ""), ("source", "shadow"), ("id", "other")] {
        let metadata = DocMetaData::new("typed").with_id("b").with_extra(key, value);
        let err = store.add_documents(&[Document::new("python", metadata)]).await.unwrap_err();
        assert!(err.is_validation(), "{key}");
    }

    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.get_all_documents(None).await.unwrap()[0].metadata.source, "test");
    assert_eq!(store.similar_texts("rust", 3, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_documents_by_ids_preserves_input_order() {
    let store = new_store("docs");
    let ids = store
        .add_documents(&[tagged("rust", "a"), tagged("python", "b"), tagged("tomato", "c")])
        .await
        .unwrap();
    let (a, b, c) = (ids[0].clone(), ids[1].clone(), ids[2].clone());

    let docs = store.get_documents_by_ids(&[c.clone(), a.clone(), b.clone()]).await.unwrap();
    let got: Vec<&str> = docs.iter().map(|d| d.id()).collect();
    assert_eq!(got, vec![c.as_str(), a.as_str(), b.as_str()]);

    let docs = store.get_documents_by_ids(&[a.clone(), "x".to_string(), b.clone()]).await.unwrap();
    let got: Vec<&str> = docs.iter().map(|d| d.id()).collect();
    assert_eq!(got, vec![a.as_str(), b.as_str()]);
}

#[tokio::test]
async fn duplicate_ids_yield_one_document_per_occurrence() {
    let store = new_store("docs");
    let ids = store.add_documents(&[tagged("rust", "a"), tagged("python", "b")]).await.unwrap();

    let request = vec![ids[1].clone(), ids[0].clone(), ids[1].clone()];
    let docs = store.get_documents_by_ids(&request).await.unwrap();
    let got: Vec<String> = docs.iter().map(|d| d.id().to_string()).collect();
    assert_eq!(got, request);
}

#[tokio::test]
async fn filtered_search_excludes_closer_non_matches() {
    let store = new_store("docs");
    store
        .add_documents(&[
            tagged("rust async tokio", "y"),
            tagged("rust async", "y"),
            tagged("garden tomato", "x"),
            tagged("python garden", "x"),
        ])
        .await
        .unwrap();

    let unfiltered = store.similar_texts("rust async tokio", 5, None).await.unwrap();
    assert_eq!(unfiltered[0].document.metadata.extra["tag"], "y");

    let results =
        store.similar_texts("rust async tokio", 5, Some(r#"{"tag": "x"}"#)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.document.metadata.extra["tag"] == "x"));
}

#[tokio::test]
async fn search_returns_best_match_first() {
    let store = new_store("docs");
    store
        .add_documents(&[
            tagged("tomato garden", "a"),
            tagged("rust tokio", "b"),
            tagged("python", "c"),
        ])
        .await
        .unwrap();

    let results = store.similar_texts("tokio rust", 2, None).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].document.content, "rust tokio");
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn zero_k_returns_nothing() {
    let store = new_store("docs");
    store.add_documents(&[tagged("rust", "a")]).await.unwrap();
    assert!(store.similar_texts("rust", 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn collections_are_isolated() {
    let backend = Arc::new(InMemoryVectorStore::new());
    let a = store_for(backend.clone(), "alpha");
    let b = a.with_collection("beta").unwrap();

    a.add_documents(&[tagged("rust async", "x")]).await.unwrap();
    b.add_documents(&[tagged("tomato garden", "x")]).await.unwrap();

    let from_b = b.similar_texts("rust async", 5, None).await.unwrap();
    assert_eq!(from_b.len(), 1);
    assert_eq!(from_b[0].document.content, "tomato garden");
    assert_eq!(a.get_all_documents(None).await.unwrap().len(), 1);
    assert_eq!(a.collection(), "alpha");
    assert_eq!(b.collection(), "beta");
}

#[tokio::test]
async fn clear_all_collections_requires_confirmation() {
    let backend = Arc::new(InMemoryVectorStore::new());
    let store = store_for(backend, "keep_me");
    for name in ["test_one", "test_two", "keep_me"] {
        store.with_collection(name).unwrap().add_documents(&[tagged("rust", "x")]).await.unwrap();
    }

    assert_eq!(store.clear_all_collections(false, "").await.unwrap(), 0);
    assert_eq!(store.list_collections(true).await.unwrap().len(), 3);

    assert_eq!(store.clear_all_collections(true, "test_").await.unwrap(), 2);
    assert_eq!(store.list_collections(true).await.unwrap(), vec!["keep_me".to_string()]);
}

#[tokio::test]
async fn list_collections_can_skip_empty_ones() {
    let store = new_store("full");
    store.add_documents(&[tagged("rust", "x")]).await.unwrap();
    store.create_collection("empty", false).await.unwrap();

    assert_eq!(store.list_collections(true).await.unwrap(), vec!["empty", "full"]);
    assert_eq!(store.list_collections(false).await.unwrap(), vec!["full"]);

    assert_eq!(store.clear_empty_collections().await.unwrap(), 1);
    assert_eq!(store.list_collections(true).await.unwrap(), vec!["full"]);
}

#[tokio::test]
async fn delete_collection_twice_is_ok() {
    let store = new_store("docs");
    store.add_documents(&[tagged("rust", "x")]).await.unwrap();
    store.delete_collection("docs").await.unwrap();
    store.delete_collection("docs").await.unwrap();

    let err = store.get_all_documents(None).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn ensure_index_twice_does_not_rebuild() {
    let store = new_store("docs");
    store.add_documents(&[tagged("rust", "x")]).await.unwrap();
    assert_eq!(store.index_info("docs").await.unwrap().state, IndexState::NoIndex);

    let first = store.ensure_index("docs").await.unwrap();
    assert!(first.created());
    let second = store.ensure_index("docs").await.unwrap();
    let EnsureOutcome::AlreadyPresent(info) = second else {
        panic!("expected an existing index");
    };
    assert_eq!(info.state, IndexState::Ready);
    assert_eq!(info.built_at, first.info().built_at);
    assert_eq!(info.name, "hnsw_index_docs_embedding");
}

#[tokio::test]
async fn search_builds_missing_index() {
    let store = new_store("docs");
    store.add_documents(&[tagged("rust", "x")]).await.unwrap();
    store.similar_texts("rust", 1, None).await.unwrap();
    assert_eq!(store.index_info("docs").await.unwrap().state, IndexState::Ready);

    store.drop_index("docs").await.unwrap();
    store.drop_index("docs").await.unwrap();
    assert_eq!(store.index_info("docs").await.unwrap().state, IndexState::NoIndex);
}

#[tokio::test]
async fn malformed_filter_is_rejected_before_embedding() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let store = DocumentStore::builder()
        .embedding_provider(embedder.clone())
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build()
        .unwrap();
    store.add_documents(&[tagged("rust", "x")]).await.unwrap();
    let calls_before = embedder.calls.load(Ordering::SeqCst);

    let err = store.similar_texts("rust", 3, Some("{not json")).await.unwrap_err();
    assert!(matches!(err, DocStoreError::FilterError { .. }));
    assert!(err.is_validation());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_before);

    for bad in [r#"["tag"]"#, r#"{"tag": {"$ne": "x"}}"#] {
        let err = store.get_all_documents(Some(bad)).await.unwrap_err();
        assert!(matches!(err, DocStoreError::FilterError { .. }), "{bad}");
    }
}

#[tokio::test]
async fn empty_filter_matches_everything() {
    let store = new_store("docs");
    store.add_documents(&[tagged("rust", "x"), tagged("python", "y")]).await.unwrap();
    assert_eq!(store.get_all_documents(Some("{}")).await.unwrap().len(), 2);
    assert_eq!(store.get_all_documents(Some(r#"{"tag": "y"}"#)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_metadata_writes_nothing() {
    let store = new_store("docs");
    let mut bad = DocMetaData::new("test");
    bad.title = String::new();
    let batch = [tagged("rust", "x"), Document::new("python", bad)];

    let err = store.add_documents(&batch).await.unwrap_err();
    assert!(err.is_validation());
    assert!(store.list_collections(true).await.unwrap().is_empty());
}

#[tokio::test]
async fn embedding_failure_writes_nothing() {
    let backend = Arc::new(InMemoryVectorStore::new());
    let store = DocumentStore::builder()
        .embedding_provider(Arc::new(FailingEmbedder))
        .vector_store(backend)
        .open()
        .await
        .unwrap();

    let err = store.add_documents(&[tagged("rust", "x")]).await.unwrap_err();
    assert!(matches!(err, DocStoreError::EmbeddingError { .. }));
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn dimension_mismatch_is_a_conflict_without_replace() {
    let backend = Arc::new(InMemoryVectorStore::new());
    let store = store_for(backend.clone(), "shared");
    store.add_documents(&[tagged("rust", "x")]).await.unwrap();

    let small = DocumentStore::builder()
        .config(DocStoreConfig::builder().collection_name("shared").build().unwrap())
        .embedding_provider(Arc::new(SmallEmbedder))
        .vector_store(backend.clone())
        .build()
        .unwrap();
    let err = small.create_collection("shared", false).await.unwrap_err();
    assert!(matches!(err, DocStoreError::ConflictError(_)));

    let err = small.add_documents(&[tagged("rust", "x")]).await.unwrap_err();
    assert!(err.is_validation());

    small.create_collection("shared", true).await.unwrap();
    let info = small.collection_info("shared").await.unwrap();
    assert_eq!(info.dimension, 3);
    assert_eq!(info.record_count, 0);
}

#[tokio::test]
async fn open_with_replace_clears_collection() {
    let backend = Arc::new(InMemoryVectorStore::new());
    let store = store_for(backend.clone(), "docs");
    store.add_documents(&[tagged("rust", "x")]).await.unwrap();

    let reopened = DocumentStore::builder()
        .config(
            DocStoreConfig::builder()
                .collection_name("docs")
                .replace_collection(true)
                .build()
                .unwrap(),
        )
        .embedding_provider(Arc::new(KeywordEmbedder::new()))
        .vector_store(backend)
        .open()
        .await
        .unwrap();
    assert!(reopened.is_empty().await.unwrap());
}

#[tokio::test]
async fn set_collection_switches_target() {
    let mut store = new_store("first");
    store.add_documents(&[tagged("rust", "x")]).await.unwrap();
    store.set_collection("second", false).await.unwrap();

    assert_eq!(store.collection(), "second");
    assert!(store.is_empty().await.unwrap());
    assert_eq!(store.with_collection("first").unwrap().count().await.unwrap(), 1);
}

#[tokio::test]
async fn delete_documents_removes_records() {
    let store = new_store("docs");
    let ids = store.add_documents(&[tagged("rust", "x"), tagged("python", "y")]).await.unwrap();
    store.delete_documents(&ids[..1]).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.get_documents_by_ids(&ids[..1]).await.unwrap().is_empty());
}

#[tokio::test]
async fn queries_on_missing_collection_are_not_found() {
    let store = new_store("nothing_here");
    assert!(store.similar_texts("rust", 3, None).await.unwrap_err().is_not_found());
    assert!(store.collection_info("nothing_here").await.unwrap_err().is_not_found());
    assert!(store.with_collection("bad name").unwrap_err().is_validation());
}

#[tokio::test]
async fn builder_requires_backend_and_provider() {
    let err =
        DocumentStore::builder().embedding_provider(Arc::new(SmallEmbedder)).build().unwrap_err();
    assert!(matches!(err, DocStoreError::ConfigError(_)));

    let err = DocumentStore::builder()
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build()
        .unwrap_err();
    assert!(matches!(err, DocStoreError::ConfigError(_)));
}

#[tokio::test]
async fn metadata_round_trips_through_storage() {
    let store = new_store("docs");
    let metadata = DocMetaData::new("https://example.com/a")
        .with_id("a")
        .with_title("A page")
        .with_extra("lang", "en")
        .with_extra("views", 42);
    let ids =
        store.add_documents(&[Document::new("vector garden", metadata.clone())]).await.unwrap();

    let doc = &store.get_documents_by_ids(&ids).await.unwrap()[0];
    assert_eq!(doc.metadata.id, ids[0]);
    assert_eq!(doc.metadata.title, "A page");
    assert_eq!(doc.metadata.source, "https://example.com/a");
    assert_eq!(doc.metadata.extra["lang"], "en");
    assert_eq!(doc.metadata.extra["views"], 42);

    let filtered = store.get_all_documents(Some(r#"{"views": 42, "lang": "en"}"#)).await.unwrap();
    assert_eq!(filtered.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_and_writers() {
    let store = new_store("docs");
    let seeded = store
        .add_documents(&[tagged("rust async", "seed"), tagged("garden tomato", "seed")])
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let writer = store.clone();
        tasks.push(tokio::spawn(async move {
            let doc = tagged(&format!("tokio vector {i}"), "written");
            writer.add_documents(&[doc]).await.map(|_| ())
        }));

        let reader = store.clone();
        let ids = seeded.clone();
        tasks.push(tokio::spawn(async move {
            let hits = reader.similar_texts("rust async", 2, None).await?;
            assert!(!hits.is_empty());
            let docs = reader.get_documents_by_ids(&ids).await?;
            assert_eq!(docs.len(), 2);
            Ok::<(), DocStoreError>(())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.count().await.unwrap(), 10);
    let written = store.get_all_documents(Some(r#"{"tag": "written"}"#)).await.unwrap();
    assert_eq!(written.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_to_one_id_keep_one_record() {
    let store = new_store("docs");
    let metadata = DocMetaData::new("wiki").with_id("shared-page");

    let mut tasks = Vec::new();
    for i in 0..8 {
        let writer = store.clone();
        let doc = Document::new(format!("revision {i}"), metadata.clone());
        tasks.push(tokio::spawn(async move { writer.add_documents(&[doc]).await }));
    }
    let mut ids = Vec::new();
    for task in tasks {
        ids.extend(task.await.unwrap().unwrap());
    }

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.count().await.unwrap(), 1);
    let stored = store.get_documents_by_ids(&ids[..1]).await.unwrap();
    let revisions: Vec<String> = (0..8).map(|i| format!("revision {i}")).collect();
    assert!(revisions.contains(&stored[0].content));
}
