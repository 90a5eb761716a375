use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::app::{AppBackend, AppLocal};
use crate::config::SemanticSearchConfig;
use crate::contacts::{ContactUpdate, SearchQuery, Sheet};
use crate::semantic::{
    Embedder, EmbeddingError, HttpEmbedder, HttpVectorIndex, IndexError, IndexMatch,
    SemanticSearchService, VectorIndexClient, VectorRecord,
};

use super::app::new_contact;

// --- in-memory stand-ins for the remote services ---

/// Letter histogram, so texts sharing letters end up close to each other.
pub struct LetterEmbedder;

impl Embedder for LetterEmbedder {
    fn model(&self) -> &str {
        "letters"
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut values = vec![0.0; 26];
                for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                    values[(c as u8 - b'a') as usize] += 1.0;
                }
                values
            })
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct MemoryIndex {
    pub records: Arc<Mutex<HashMap<String, VectorRecord>>>,
    pub fail: bool,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndexClient for MemoryIndex {
    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError> {
        if self.fail {
            return Err(IndexError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        let mut stored = self.records.lock().unwrap();
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, IndexError> {
        let stored = self.records.lock().unwrap();
        let mut matches = stored
            .values()
            .map(|record| IndexMatch {
                id: record.id.clone(),
                score: cosine(vector, &record.values),
                metadata: Some(record.metadata.clone()),
            })
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        matches.truncate(top_k);
        Ok(matches)
    }

    fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
        if self.fail {
            return Err(IndexError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        let mut stored = self.records.lock().unwrap();
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }
}

fn enabled_config() -> SemanticSearchConfig {
    SemanticSearchConfig {
        enabled: true,
        index_url: "http://127.0.0.1:9".into(),
        ..Default::default()
    }
}

fn create_semantic_app(index: MemoryIndex) -> (AppLocal, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let primary = tmp.path().join("contacts.csv");
    let repeating = tmp.path().join("repeating_contacts.csv");

    let semantic = Arc::new(SemanticSearchService::with_clients(
        enabled_config(),
        Box::new(LetterEmbedder),
        Box::new(index),
    ));
    let app = AppLocal::new(
        primary.to_str().unwrap(),
        repeating.to_str().unwrap(),
        semantic,
    )
    .expect("failed to create app");

    (app, tmp)
}

fn stored_ids(index: &MemoryIndex) -> Vec<String> {
    let mut ids = index.records.lock().unwrap().keys().cloned().collect::<Vec<_>>();
    ids.sort();
    ids
}

// --- hooks ---

#[test]
fn add_update_delete_keep_index_in_step() {
    let index = MemoryIndex::default();
    let (app, _tmp) = create_semantic_app(index.clone());

    app.add(new_contact("Alice", "555 000 0001")).unwrap();
    app.add(new_contact("Alice twin", "555 000 0001")).unwrap();
    assert_eq!(stored_ids(&index), vec!["primary-0", "repeating-0"]);

    app.update(
        0,
        ContactUpdate {
            name: Some("Alicia".into()),
            number: None,
        },
    )
    .unwrap();
    let metadata = index.records.lock().unwrap()["primary-0"].metadata.clone();
    assert_eq!(metadata.name, "Alicia");
    assert_eq!(metadata.sheet, "primary");

    app.delete(Sheet::Repeating, 0).unwrap();
    assert_eq!(stored_ids(&index), vec!["primary-0"]);

    app.search_delete(Sheet::Primary, SearchQuery::default()).unwrap();
    assert!(stored_ids(&index).is_empty());
}

#[test]
fn index_failures_do_not_fail_mutations() {
    let index = MemoryIndex {
        fail: true,
        ..Default::default()
    };
    let (app, _tmp) = create_semantic_app(index.clone());

    let outcome = app.add(new_contact("Alice", "555 000 0001")).unwrap();
    assert_eq!(outcome.sheet, Sheet::Primary);
    app.delete(Sheet::Primary, 0).unwrap();

    assert_eq!(app.total(Sheet::Primary).unwrap(), 0);
    assert!(stored_ids(&index).is_empty());
}

// --- search ---

#[test]
fn semantic_search_resolves_contacts() {
    let index = MemoryIndex::default();
    let (app, _tmp) = create_semantic_app(index);

    app.add(new_contact("Alice", "555 000 0001")).unwrap();
    app.add(new_contact("Bob", "555 000 0002")).unwrap();
    app.add(new_contact("Alice", "555 000 0001")).unwrap();

    let results = app.semantic_search("alice", None, Some(0.5)).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.contact.name == "Alice"));
    assert!(results.iter().any(|r| r.sheet == Sheet::Repeating));
    assert!(results[0].score >= results[1].score);

    let results = app.semantic_search("alice", Some(1), Some(0.0)).unwrap();
    assert_eq!(results.len(), 1);

    assert!(app.semantic_search("   ", None, None).unwrap().is_empty());
}

#[test]
fn semantic_search_skips_stale_vectors() {
    let index = MemoryIndex::default();
    let (app, _tmp) = create_semantic_app(index.clone());

    app.add(new_contact("Alice", "555 000 0001")).unwrap();

    // a vector for a contact that no longer exists
    index.records.lock().unwrap().insert(
        "primary-9".into(),
        VectorRecord {
            id: "primary-9".into(),
            values: LetterEmbedder.embed("Alice").unwrap(),
            metadata: Default::default(),
        },
    );

    let results = app.semantic_search("alice", None, Some(0.5)).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].contact.id, 0);
}

#[test]
fn reindex_pushes_both_sheets() {
    let index = MemoryIndex::default();
    let (app, _tmp) = create_semantic_app(index.clone());

    app.add(new_contact("Alice", "555 000 0001")).unwrap();
    app.add(new_contact("Bob", "555 000 0002")).unwrap();
    app.add(new_contact("Alice", "555 000 0001")).unwrap();

    index.records.lock().unwrap().clear();

    let count = app.reindex(false).unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        stored_ids(&index),
        vec!["primary-0", "primary-1", "repeating-0"]
    );
}

// --- http clients against a local mock server ---

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(String, Value, HeaderMap)>>>,
}

async fn embeddings_handler(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    captured
        .requests
        .lock()
        .unwrap()
        .push(("embeddings".into(), body, headers));

    if inputs.iter().any(|input| input == "boom") {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "rate limited"})),
        );
    }

    // reversed on purpose, clients must order by index
    let data = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(i, _)| json!({"index": i, "embedding": [i as f32, 1.0]}))
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(json!({ "data": data })))
}

async fn upsert_handler(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let count = body["vectors"].as_array().map(Vec::len).unwrap_or(0);
    captured
        .requests
        .lock()
        .unwrap()
        .push(("upsert".into(), body, headers));
    Json(json!({ "upsertedCount": count }))
}

async fn query_handler(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    captured
        .requests
        .lock()
        .unwrap()
        .push(("query".into(), body, headers));
    Json(json!({
        "matches": [
            {"id": "primary-2", "score": 0.91, "metadata": {"name": "Ada", "number": "555", "sheet": "primary"}},
            {"id": "repeating-0", "score": 0.42}
        ]
    }))
}

async fn delete_handler(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    captured
        .requests
        .lock()
        .unwrap()
        .push(("delete".into(), body, headers));
    Json(json!({}))
}

/// Serves the mock APIs on an ephemeral port from a background thread.
fn spawn_mock_server() -> (String, Captured) {
    let captured = Captured::default();

    let router = Router::new()
        .route("/v1/embeddings", post(embeddings_handler))
        .route("/vectors/upsert", post(upsert_handler))
        .route("/query", post(query_handler))
        .route("/vectors/delete", post(delete_handler))
        .with_state(captured.clone());

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });
    });

    (format!("http://{addr}"), captured)
}

#[test]
fn http_embedder_sends_model_and_orders_results() {
    let (base_url, captured) = spawn_mock_server();

    let embedder = HttpEmbedder::new(
        &format!("{base_url}/v1/"),
        "text-embedding-3-small",
        Some("sk-test".into()),
        Duration::from_secs(5),
    )
    .unwrap();

    let vectors = embedder
        .embed_batch(&["first".to_string(), "second".to_string()])
        .unwrap();
    assert_eq!(vectors, vec![vec![0.0f32, 1.0], vec![1.0, 1.0]]);

    let requests = captured.requests.lock().unwrap();
    let (kind, body, headers) = &requests[0];
    assert_eq!(kind, "embeddings");
    assert_eq!(body["model"], "text-embedding-3-small");
    assert_eq!(body["input"], json!(["first", "second"]));
    assert_eq!(headers["authorization"], "Bearer sk-test");
}

#[test]
fn http_embedder_reports_api_errors() {
    let (base_url, _captured) = spawn_mock_server();

    let embedder = HttpEmbedder::new(
        &format!("{base_url}/v1"),
        "m",
        None,
        Duration::from_secs(5),
    )
    .unwrap();

    match embedder.embed("boom") {
        Err(EmbeddingError::Api { status, message }) => {
            assert_eq!(status, 429);
            assert!(message.contains("rate limited"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn http_vector_index_roundtrip() {
    let (base_url, captured) = spawn_mock_server();

    let index = HttpVectorIndex::new(
        &base_url,
        "contacts",
        Some("pc-key".into()),
        Duration::from_secs(5),
    )
    .unwrap();

    let record = VectorRecord {
        id: "primary-2".into(),
        values: vec![0.5, 0.5],
        metadata: Default::default(),
    };
    assert_eq!(index.upsert(&[record]).unwrap(), 1);

    let matches = index.query(&[0.5, 0.5], 5).unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "primary-2");
    assert_eq!(matches[0].metadata.as_ref().unwrap().name, "Ada");
    assert!(matches[1].metadata.is_none());

    index.delete(&["primary-2".to_string()]).unwrap();

    // empty calls never reach the server
    assert_eq!(index.upsert(&[]).unwrap(), 0);
    index.delete(&[]).unwrap();

    let requests = captured.requests.lock().unwrap();
    let kinds = requests.iter().map(|(kind, _, _)| kind.as_str()).collect::<Vec<_>>();
    assert_eq!(kinds, vec!["upsert", "query", "delete"]);

    let (_, upsert, headers) = &requests[0];
    assert_eq!(upsert["namespace"], "contacts");
    assert_eq!(upsert["vectors"][0]["id"], "primary-2");
    assert_eq!(headers["api-key"], "pc-key");

    let (_, query, _) = &requests[1];
    assert_eq!(query["topK"], 5);
    assert_eq!(query["includeMetadata"], true);

    let (_, delete, _) = &requests[2];
    assert_eq!(delete["ids"], json!(["primary-2"]));
}
