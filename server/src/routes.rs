//! HTTP endpoints.
//!
//! Endpoints:
//! - POST /ingest          - store text under a key
//! - POST /write-captions  - fetch and store the captions of a YouTube video
//! - POST /process-file    - extract the text of an uploaded file, optionally storing it
//! - GET  /search          - similarity search
//! - GET  /records/{key}   - fetch a stored record
//! - GET  /health          - liveness and record count

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;
use vdb_retrieval::{Engine, ScoredRecord};

use crate::error::ApiError;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Build the router with all endpoints.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/write-captions", post(write_captions))
        .route("/process-file", post(process_file))
        .route("/search", get(search))
        .route("/records/{key}", get(get_record))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

// ── Request / Response types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub key: String,
    pub dimension: usize,
}

#[derive(Debug, Deserialize)]
pub struct CaptionRequest {
    pub video_url: String,
    /// Preferred caption languages; the configured ones when absent.
    #[serde(default)]
    pub languages: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CaptionResponse {
    pub status: String,
    pub message: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessFileParams {
    /// Key to store the text under; the file stem when absent.
    pub key: Option<String>,
    /// Whether to ingest the extracted text.
    #[serde(default)]
    pub store: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessFileResponse {
    pub status: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    /// Negative values are treated as zero.
    pub k: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: String,
    pub matches: Vec<Match>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Match {
    pub key: String,
    pub text: String,
    /// `None` when the similarity is undefined (zero vectors).
    pub similarity: Option<f32>,
}

impl From<ScoredRecord> for Match {
    fn from(record: ScoredRecord) -> Self {
        Self {
            similarity: record.similarity(),
            key: record.key,
            text: record.text,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    pub key: String,
    pub text: String,
    pub dimension: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub records: usize,
    pub dimension: Option<usize>,
}

// ── Handlers ────────────────────────────────────────────────────────

async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let record = state.engine.ingest(&request.key, &request.text).await?;
    Ok(Json(IngestResponse {
        status: "success".to_string(),
        dimension: record.vector.len(),
        key: record.key,
    }))
}

async fn write_captions(
    State(state): State<AppState>,
    Json(request): Json<CaptionRequest>,
) -> Result<Json<CaptionResponse>, ApiError> {
    let languages = request.languages.unwrap_or_default();
    let record = state
        .engine
        .ingest_video(&request.video_url, &languages)
        .await?;
    Ok(Json(CaptionResponse {
        status: "success".to_string(),
        message: format!("Captions stored for video {}", record.key),
        key: record.key,
    }))
}

async fn process_file(
    State(state): State<AppState>,
    Query(params): Query<ProcessFileParams>,
    mut multipart: Multipart,
) -> Result<Json<ProcessFileResponse>, ApiError> {
    let bad_request =
        |e: axum::extract::multipart::MultipartError| ApiError::BadRequest(e.to_string());

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(bad_request)?;
            upload = Some((file_name, bytes));
            break;
        }
    }
    let Some((file_name, bytes)) = upload else {
        return Err(ApiError::BadRequest(
            "missing multipart field `file`".to_string(),
        ));
    };

    let content = vdb_sources::extract_bytes(&file_name, &bytes)?;

    let key = if params.store {
        let key = params.key.unwrap_or_else(|| {
            FsPath::new(&file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string()
        });
        state.engine.ingest(&key, &content).await?;
        info!("Stored uploaded file {file_name} as {key}");
        Some(key)
    } else {
        None
    };

    Ok(Json(ProcessFileResponse {
        status: "success".to_string(),
        content,
        key,
    }))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let k = params.k.map(|k| usize::try_from(k).unwrap_or(0));
    let results = state.engine.query(&params.query, k).await?;
    Ok(Json(SearchResponse {
        status: "success".to_string(),
        matches: results.into_iter().map(Match::from).collect(),
    }))
}

async fn get_record(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<RecordResponse>, ApiError> {
    let record = state.engine.get(&key).await?;
    Ok(Json(RecordResponse {
        dimension: record.vector.len(),
        key: record.key,
        text: record.text,
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.engine.stats().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        records: stats.records,
        dimension: stats.dimension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;
    use vdb_embeddings::EmbeddingStore;
    use vdb_embeddings::testing::HashingProvider;
    use vdb_retrieval::{CaptionSource, LanguagePolicy};
    use vdb_sources::CaptionError;

    struct OneVideo;

    #[async_trait]
    impl CaptionSource for OneVideo {
        async fn fetch_captions(
            &self,
            video_id: &str,
            _policy: &LanguagePolicy,
        ) -> Result<String, CaptionError> {
            if video_id == "dQw4w9WgXcQ" {
                Ok("never gonna give you up".to_string())
            } else {
                Err(CaptionError::NoCaptions(video_id.to_string()))
            }
        }
    }

    async fn test_router() -> (Router, Arc<Engine>) {
        let engine = Engine::builder()
            .with_store(EmbeddingStore::in_memory())
            .with_provider(Arc::new(HashingProvider::new(32)))
            .with_caption_source(Arc::new(OneVideo))
            .build()
            .await
            .unwrap();
        let engine = Arc::new(engine);
        (router(Arc::clone(&engine)), engine)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn upload_request(uri: &str, file_name: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--XBOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n--XBOUNDARY--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _engine) = test_router().await;
        let resp = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let health: HealthResponse = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(health.records, 0);
        assert_eq!(health.dimension, Some(32));
    }

    #[tokio::test]
    async fn test_ingest_then_search() {
        let (app, _engine) = test_router().await;

        for (key, text) in [("v1", "cats are great"), ("v2", "dogs are loud")] {
            let resp = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/ingest",
                    serde_json::json!({"key": key, "text": text}),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let ingested: IngestResponse = serde_json::from_value(body_json(resp).await).unwrap();
            assert_eq!(ingested.key, key);
            assert_eq!(ingested.dimension, 32);
        }

        let resp = app
            .oneshot(get_request("/search?query=great%20cats&k=1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let search: SearchResponse = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(search.status, "success");
        assert_eq!(search.matches.len(), 1);
        assert_eq!(search.matches[0].key, "v1");
        assert_eq!(search.matches[0].text, "cats are great");
    }

    #[tokio::test]
    async fn test_search_edge_cases() {
        let (app, engine) = test_router().await;
        engine.ingest("v1", "cats").await.unwrap();

        let resp = app
            .clone()
            .oneshot(get_request("/search?query=cats&k=-3"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["matches"], serde_json::json!([]));

        // No query words map to a bucket: the similarity is undefined.
        let resp = app
            .clone()
            .oneshot(get_request("/search?query=%21%21%21"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["matches"][0]["similarity"], serde_json::Value::Null);

        let resp = app.oneshot(get_request("/search?query=%20")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "empty_query");
    }

    #[tokio::test]
    async fn test_ingest_empty_text() {
        let (app, engine) = test_router().await;
        let resp = app
            .oneshot(json_request(
                "POST",
                "/ingest",
                serde_json::json!({"key": "v3", "text": "   "}),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["kind"], "empty_text");
        assert!(!engine.store().contains("v3").await);
    }

    #[tokio::test]
    async fn test_get_record() {
        let (app, engine) = test_router().await;
        engine.ingest("v1", "cats are great").await.unwrap();

        let resp = app.clone().oneshot(get_request("/records/v1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let record: RecordResponse = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(record.text, "cats are great");
        assert_eq!(record.dimension, 32);

        let resp = app.oneshot(get_request("/records/missing")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_write_captions() {
        let (app, engine) = test_router().await;

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/write-captions",
                serde_json::json!({"video_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let captions: CaptionResponse = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(captions.key, "dQw4w9WgXcQ");
        assert_eq!(captions.message, "Captions stored for video dQw4w9WgXcQ");
        assert!(engine.store().contains("dQw4w9WgXcQ").await);

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/write-captions",
                serde_json::json!({"video_url": "https://youtu.be/other", "languages": ["de"]}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["kind"], "no_captions");

        let resp = app
            .oneshot(json_request(
                "POST",
                "/write-captions",
                serde_json::json!({"video_url": "https://vimeo.com/1"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["kind"], "invalid_url");
    }

    #[tokio::test]
    async fn test_process_file() {
        let (app, engine) = test_router().await;

        let resp = app
            .clone()
            .oneshot(upload_request("/process-file", "notes.txt", "cats are great"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["content"], "cats are great");
        assert!(body.get("key").is_none());
        assert!(engine.store().is_empty().await);

        let resp = app
            .clone()
            .oneshot(upload_request(
                "/process-file?store=true",
                "notes.txt",
                "cats are great",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["key"], "notes");
        assert!(engine.store().contains("notes").await);

        let resp = app
            .oneshot(upload_request("/process-file", "scan.pdf", "%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(resp).await["kind"], "extraction_error");
    }
}
