//! # Document Store Basics
//!
//! Ingests a handful of notes into two collections of an in-memory store,
//! runs plain and filtered similarity queries, and shows the index lifecycle.
//! Embeddings come from a toy hashing bag-of-words embedder, so no API key is
//! needed.
//!
//! Run: `RUST_LOG=adk_docstore=debug cargo run -p adk-docstore --example docstore_basic`

use std::sync::Arc;

use adk_docstore::{
    DocMetaData, DocStoreConfig, Document, DocumentStore, EmbeddingProvider, InMemoryVectorStore,
    Result,
};
use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

const DIM: usize = 64;

/// Hashes each lowercase word into one of `DIM` buckets.
struct HashingEmbedder;

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; DIM];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16777619));
            v[bucket as usize % DIM] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

fn note(id: &str, topic: &str, text: &str) -> Document {
    let metadata = DocMetaData::new(format!("notes/{id}.md"))
        .with_id(id)
        .with_title(id.replace('_', " "))
        .with_extra("topic", topic);
    Document::new(text, metadata)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("adk_docstore=info")),
        )
        .init();

    let backend = Arc::new(InMemoryVectorStore::new());
    let store = DocumentStore::builder()
        .config(DocStoreConfig::builder().collection_name("notes").build()?)
        .embedding_provider(Arc::new(HashingEmbedder))
        .vector_store(backend)
        .open()
        .await?;

    let ids = store
        .add_documents(&[
            note("ownership", "rust", "Rust ownership moves values and borrows references."),
            note("tokio_runtime", "rust", "Tokio runs async tasks on a work stealing runtime."),
            note("tomatoes", "garden", "Tomatoes grow best with full sun and steady watering."),
            note("compost", "garden", "Compost turns kitchen scraps into rich garden soil."),
        ])
        .await?;
    println!("stored {} notes", ids.len());

    let recipes = store.with_collection("recipes")?;
    let salsa = note("salsa", "cooking", "Chop tomatoes and onion finely for a fresh salsa.");
    recipes.add_documents(&[salsa]).await?;

    println!("\nquery: \"how do tomatoes grow\"");
    for hit in store.similar_texts("how do tomatoes grow", 2, None).await? {
        println!("  {:.3}  {}", hit.score, hit.document.metadata.title);
    }

    println!("\nquery: \"async runtime\" with topic=garden");
    for hit in store.similar_texts("async runtime", 3, Some(r#"{"topic": "garden"}"#)).await? {
        println!("  {:.3}  {}", hit.score, hit.document.metadata.title);
    }

    let ordered = store.get_documents_by_ids(&[ids[2].clone(), ids[0].clone()]).await?;
    let titles: Vec<&str> = ordered.iter().map(|d| d.metadata.title.as_str()).collect();
    println!("\nby id: {titles:?}");

    match store.similar_texts("anything", 3, Some("{not json")).await {
        Err(e) => println!("\nrejected filter: {e}"),
        Ok(hits) => println!("\nunexpected {} hits", hits.len()),
    }

    for name in store.list_collections(true).await? {
        let info = store.collection_info(&name).await?;
        println!(
            "\n{}: {} records, dim {}, index {:?}",
            info.name, info.record_count, info.dimension, info.index.state
        );
    }

    let outcome = store.ensure_index("notes").await?;
    println!("ensure_index again created a new index: {}", outcome.created());

    let deleted = store.clear_all_collections(true, "").await?;
    println!("cleaned up {deleted} collections");
    Ok(())
}
