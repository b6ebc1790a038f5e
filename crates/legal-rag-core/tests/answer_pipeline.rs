//! End-to-end tests of ingestion and answering over the in-memory store,
//! with test doubles for the embedder and the language model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use legal_rag_core::answer::{AnswerEngine, AnswerOptions};
use legal_rag_core::chunk::ChunkConfig;
use legal_rag_core::cost::PricingTable;
use legal_rag_core::embedding::Embedder;
use legal_rag_core::ingest::{IngestRequest, Ingestor};
use legal_rag_core::llm::{Generation, GenerationRequest, LanguageModel, ModelRegistry};
use legal_rag_core::models::{
    Chunk, Document, DocumentStatus, Embedding, KnowledgeNode, NewDocument, TokenUsage,
};
use legal_rag_core::prompt::NO_INFORMATION_ANSWER;
use legal_rag_core::search::{HybridRetriever, RetrievalParams};
use legal_rag_core::store::memory::InMemoryStore;
use legal_rag_core::store::{ChunkCandidate, Store};
use tokio::sync::Notify;
use legal_rag_core::{RagError, Result};

const LEASE_TEXT: &str = "Articolo 1 (Oggetto): il presente contratto disciplina la locazione dell'immobile sito in Milano, via Roma 10. \
Articolo 2 (Durata minima): la durata minima della locazione commerciale e' di sei anni, rinnovabile per altri sei. \
Articolo 3 (Canone): il canone annuo e' versato in rate mensili anticipate entro il giorno cinque di ogni mese.";

/// Maps every text to the same unit vector, so vector scores tie and the
/// lexical signal decides the ranking.
struct FlatEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FlatEmbedder {
    fn model_name(&self) -> &str {
        "flat"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| vec![0.0, 1.0, 0.0]).collect())
    }
}

/// Embedding service that is down.
struct UnreachableEmbedder;

#[async_trait]
impl Embedder for UnreachableEmbedder {
    fn model_name(&self) -> &str {
        "unreachable"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn request_embeddings(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::Embedding("connection refused".to_string()))
    }
}

struct ScriptedModel {
    reply: String,
    usage: TokenUsage,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl ScriptedModel {
    fn new(reply: &str, usage: TokenUsage) -> Self {
        Self {
            reply: reply.to_string(),
            usage,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(Generation {
            text: self.reply.clone(),
            usage: self.usage,
        })
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    embedder: Arc<FlatEmbedder>,
    model: Arc<ScriptedModel>,
    engine: AnswerEngine,
    ingestor: Ingestor,
}

fn harness(reply: &str, usage: TokenUsage, pricing: PricingTable) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(FlatEmbedder {
        calls: AtomicUsize::new(0),
    });
    let model = Arc::new(ScriptedModel::new(reply, usage));
    let registry = ModelRegistry::new().with(model.clone());
    let engine = AnswerEngine::new(store.clone(), embedder.clone(), registry, pricing);
    let ingestor = Ingestor::new(store.clone(), embedder.clone());
    Harness {
        store,
        embedder,
        model,
        engine,
        ingestor,
    }
}

fn lease_request(node_id: &str) -> IngestRequest {
    IngestRequest {
        node_id: node_id.to_string(),
        text: LEASE_TEXT.to_string(),
        chunking: ChunkConfig {
            chunk_size: 150,
            overlap: 0,
        },
        document: NewDocument {
            filename: "locazioni.txt".to_string(),
            mime_type: "text/plain".to_string(),
            size_bytes: LEASE_TEXT.len() as i64,
            storage_path: None,
            metadata: serde_json::Value::Null,
        },
    }
}

async fn ingest_lease(h: &Harness, node_id: &str) -> String {
    let report = h.ingestor.ingest(lease_request(node_id)).await.unwrap();
    assert_eq!(report.chunks_created, 3);
    assert_eq!(report.embeddings_created, 3);
    assert_eq!(report.status, DocumentStatus::Ingested);
    report.document_id
}

#[tokio::test]
async fn empty_node_returns_no_information_without_model_call() {
    let h = harness("unused", TokenUsage::new(1, 1), PricingTable::with_defaults());
    let node = h.store.create_node("vuoto", None).await.unwrap();

    let response = h
        .engine
        .answer(&node.id, "Qual e' la durata minima?", &AnswerOptions::default())
        .await
        .unwrap();

    assert_eq!(response.answer, NO_INFORMATION_ANSWER);
    assert!(response.citations.is_empty());
    assert!(response.contexts.is_empty());
    assert_eq!(response.usage, TokenUsage::default());
    assert_eq!(response.cost, 0.0);
    assert_eq!(response.telemetry.model_call_ms, 0);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn lease_question_is_grounded_and_cited() {
    let h = harness(
        "La durata minima della locazione commerciale e' di sei anni [Doc: locazioni.txt].",
        TokenUsage::new(500, 120),
        PricingTable::with_defaults(),
    );
    let node = h.store.create_node("locazioni", None).await.unwrap();
    let document_id = ingest_lease(&h, &node.id).await;

    let response = h
        .engine
        .answer(
            &node.id,
            "What is the minimum commercial lease term?",
            &AnswerOptions::default(),
        )
        .await
        .unwrap();

    // Top hit after fusion is the clause on the minimum term.
    assert_eq!(response.contexts.len(), 3);
    let top = &response.contexts[0];
    assert!(top.content.contains("Durata minima"));
    assert!(top.lexical_score > response.contexts[1].lexical_score);

    let request = h.model.last_request.lock().unwrap().clone().unwrap();
    assert!(request
        .user_prompt
        .contains("[FONTE 1] Documento: locazioni.txt | Pagina: 1\nArticolo 2 (Durata minima)"));
    assert_eq!(request.temperature, 0.1);
    assert_eq!(request.model, "gpt-4o-mini");

    assert_eq!(response.citations.len(), 1);
    let citation = &response.citations[0];
    assert_eq!(citation.document_id, document_id);
    assert_eq!(citation.filename, "locazioni.txt");
    assert_eq!(citation.page, Some(1));
    assert_eq!(citation.chunk_id, top.chunk_id);
    assert!(citation.excerpt.starts_with("Articolo 2"));

    assert_eq!(response.usage.total_tokens, 620);
    assert!(response.warnings.is_empty());
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 1);
    // One batched call at ingestion, one for the query.
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cost_uses_pricing_table() {
    let mut pricing = PricingTable::empty();
    pricing.insert("openai", "gpt-4o-mini", 0.15, 0.60);
    let h = harness("Sei anni [Doc: locazioni.txt].", TokenUsage::new(500, 120), pricing);
    let node = h.store.create_node("locazioni", None).await.unwrap();
    ingest_lease(&h, &node.id).await;

    let response = h
        .engine
        .answer(&node.id, "durata minima", &AnswerOptions::default())
        .await
        .unwrap();

    let expected = 500.0 * 0.15 / 1e6 + 120.0 * 0.60 / 1e6;
    assert!((response.cost - expected).abs() < 1e-12);
}

#[tokio::test]
async fn unmatched_marker_is_a_warning() {
    let h = harness(
        "Vedi [Doc: codice_civile.pdf, pag: 12].",
        TokenUsage::new(10, 5),
        PricingTable::with_defaults(),
    );
    let node = h.store.create_node("locazioni", None).await.unwrap();
    ingest_lease(&h, &node.id).await;

    let response = h
        .engine
        .answer(&node.id, "durata minima", &AnswerOptions::default())
        .await
        .unwrap();

    assert!(response.citations.is_empty());
    assert_eq!(response.warnings.len(), 1);
    assert_eq!(response.warnings[0].filename, "codice_civile.pdf");
}

#[tokio::test]
async fn first_node_is_honored() {
    let h = harness("Sei anni [Doc: locazioni.txt].", TokenUsage::new(1, 1), PricingTable::empty());
    let full = h.store.create_node("locazioni", None).await.unwrap();
    let empty = h.store.create_node("vuoto", None).await.unwrap();
    ingest_lease(&h, &full.id).await;

    let response = h
        .engine
        .answer_nodes(
            &[empty.id.clone(), full.id.clone()],
            "durata minima",
            &AnswerOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(response.answer, NO_INFORMATION_ANSWER);

    let err = h
        .engine
        .answer_nodes(&[], "durata minima", &AnswerOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let h = harness("x", TokenUsage::default(), PricingTable::empty());
    let node = h.store.create_node("locazioni", None).await.unwrap();

    let err = h
        .engine
        .answer(&node.id, "   ", &AnswerOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));

    let err = h
        .engine
        .answer("missing", "durata", &AnswerOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NotFound { kind: "node", .. }));
}

#[tokio::test]
async fn unknown_provider_is_configuration_error() {
    let h = harness("x", TokenUsage::default(), PricingTable::empty());
    let node = h.store.create_node("locazioni", None).await.unwrap();
    ingest_lease(&h, &node.id).await;

    let options = AnswerOptions {
        provider: "mistral".to_string(),
        ..Default::default()
    };
    let err = h
        .engine
        .answer(&node.id, "durata minima", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Configuration(_)));
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

/// In-memory store with injectable faults.
#[derive(Default)]
struct FaultyStore {
    inner: InMemoryStore,
    fail_chunk_writes: bool,
    fail_lexical_search: bool,
    /// When set, lexical search only completes after vector search has
    /// started.
    rendezvous: Option<Notify>,
}

#[async_trait]
impl Store for FaultyStore {
    async fn create_node(&self, name: &str, description: Option<&str>) -> Result<KnowledgeNode> {
        self.inner.create_node(name, description).await
    }

    async fn get_node(&self, id: &str) -> Result<Option<KnowledgeNode>> {
        self.inner.get_node(id).await
    }

    async fn list_nodes(&self) -> Result<Vec<KnowledgeNode>> {
        self.inner.list_nodes().await
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        self.inner.delete_node(id).await
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        self.inner.insert_document(doc).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.inner.get_document(id).await
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        self.inner.delete_document(id).await
    }

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        self.inner.set_document_status(id, status).await
    }

    async fn documents_with_status(&self, status: DocumentStatus) -> Result<Vec<Document>> {
        self.inner.documents_with_status(status).await
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if self.fail_chunk_writes {
            return Err(RagError::Storage("disk full".to_string()));
        }
        self.inner.insert_chunks(chunks).await
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.inner.document_chunks(document_id).await
    }

    async fn insert_embeddings(&self, embeddings: &[Embedding]) -> Result<()> {
        self.inner.insert_embeddings(embeddings).await
    }

    async fn lexical_search(
        &self,
        node_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        if self.fail_lexical_search {
            return Err(RagError::Retrieval("connection reset by peer".to_string()));
        }
        if let Some(gate) = &self.rendezvous {
            gate.notified().await;
        }
        self.inner.lexical_search(node_id, query, limit).await
    }

    async fn vector_search(
        &self,
        node_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        if let Some(gate) = &self.rendezvous {
            gate.notify_one();
        }
        self.inner.vector_search(node_id, query_vec, limit).await
    }
}

fn flat_embedder() -> Arc<FlatEmbedder> {
    Arc::new(FlatEmbedder {
        calls: AtomicUsize::new(0),
    })
}

/// Ingest the lease text into a fresh node of `store` with a working
/// embedder and return the node id.
async fn seed_lease(store: &Arc<FaultyStore>) -> String {
    let node = store.create_node("locazioni", None).await.unwrap();
    let ingestor = Ingestor::new(store.clone(), flat_embedder());
    ingestor.ingest(lease_request(&node.id)).await.unwrap();
    node.id
}

#[tokio::test]
async fn failed_chunk_write_leaves_no_document() {
    let store = Arc::new(FaultyStore {
        fail_chunk_writes: true,
        ..Default::default()
    });
    let node = store.create_node("locazioni", None).await.unwrap();
    let embedder = flat_embedder();
    let ingestor = Ingestor::new(store.clone(), embedder.clone());

    let err = ingestor.ingest(lease_request(&node.id)).await.unwrap_err();
    assert!(matches!(err, RagError::Storage(_)));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

    for status in [
        DocumentStatus::EmbeddingPending,
        DocumentStatus::EmbeddingFailed,
        DocumentStatus::Ingested,
    ] {
        assert!(store.documents_with_status(status).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn query_embedding_failure_aborts_before_model() {
    let h = harness("x", TokenUsage::default(), PricingTable::empty());
    let node = h.store.create_node("locazioni", None).await.unwrap();
    ingest_lease(&h, &node.id).await;

    let engine = AnswerEngine::new(
        h.store.clone(),
        Arc::new(UnreachableEmbedder),
        ModelRegistry::new().with(h.model.clone()),
        PricingTable::empty(),
    );
    let err = engine
        .answer(&node.id, "durata minima", &AnswerOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Embedding(_)));
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_failure_is_retrieval_error() {
    let store = Arc::new(FaultyStore {
        fail_lexical_search: true,
        ..Default::default()
    });
    let node_id = seed_lease(&store).await;
    let model = Arc::new(ScriptedModel::new("x", TokenUsage::default()));
    let engine = AnswerEngine::new(
        store.clone(),
        flat_embedder(),
        ModelRegistry::new().with(model.clone()),
        PricingTable::empty(),
    );

    let err = engine
        .answer(&node_id, "durata minima", &AnswerOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Retrieval(_)));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unembedded_node_falls_back_to_lexical_scores() {
    let store = Arc::new(InMemoryStore::new());
    let node = store.create_node("locazioni", None).await.unwrap();
    let report = Ingestor::new(store.clone(), Arc::new(UnreachableEmbedder))
        .ingest(lease_request(&node.id))
        .await
        .unwrap();
    assert_eq!(report.status, DocumentStatus::EmbeddingFailed);

    let retriever = HybridRetriever::new(store.clone(), flat_embedder());
    let params = RetrievalParams::default();
    let results = retriever
        .retrieve(&node.id, "durata minima della locazione commerciale", &params)
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results[0].content.contains("Durata minima"));
    for r in &results {
        assert_eq!(r.vector_score, 0.0);
        assert!(r.lexical_score > 0.0);
        assert!((r.score - (1.0 - params.alpha) * r.lexical_score).abs() < 1e-12);
    }
}

#[tokio::test]
async fn lexical_and_vector_searches_run_concurrently() {
    let store = Arc::new(FaultyStore {
        rendezvous: Some(Notify::new()),
        ..Default::default()
    });
    let node_id = seed_lease(&store).await;
    let retriever = HybridRetriever::new(store.clone(), flat_embedder());

    // Run one after the other, the lexical search would wait forever.
    let results = tokio::time::timeout(
        Duration::from_secs(5),
        retriever.retrieve(&node_id, "durata minima", &RetrievalParams::default()),
    )
    .await
    .expect("searches were not issued concurrently")
    .unwrap();

    assert!(!results.is_empty());
    assert!(results.iter().any(|r| r.vector_score > 0.0));
    assert!(results.iter().any(|r| r.lexical_score > 0.0));
}
