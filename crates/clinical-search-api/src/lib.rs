//! HTTP surface for the clinical search engine.
//!
//! Routes:
//! - `GET  /health`
//! - `GET  /icd10/search?q=&limit=`
//! - `GET  /icd10/:code`
//! - `GET  /drugs/search?q=&limit=`
//! - `POST /drugs`
//! - `GET  /drugs/:id`
//!
//! Storage calls are synchronous, so every handler hops onto the blocking pool.

pub mod config;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use clinical_search_core::search::SearchResult;
use clinical_search_core::{
    CodeSummary, Drug, DrugCatalog, NewDrug, SearchEngine, SearchError, SqliteStore,
    TieredSearchEngine,
};

pub use config::{ApiConfig, ApiConfigError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub icd10: Arc<dyn SearchEngine>,
    pub drugs: Arc<DrugCatalog>,
}

impl AppState {
    /// Build engines over one store using the configured tuning.
    pub fn from_store(store: Arc<SqliteStore>, config: &ApiConfig) -> Result<Self, ApiConfigError> {
        let icd10 = TieredSearchEngine::with_config(Arc::clone(&store), config.icd10.clone())?;
        let drugs = DrugCatalog::with_config(store, config.drugs.clone())?;
        Ok(Self {
            icd10: Arc::new(icd10),
            drugs: Arc::new(drugs),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/icd10/search", get(search_icd10))
        .route("/icd10/:code", get(get_icd10))
        .route("/drugs/search", get(search_drugs))
        .route("/drugs", post(create_drug))
        .route("/drugs/:id", get(get_drug))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =========================================================================
// Errors
// =========================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("search engine unavailable")]
    Unavailable,

    #[error("internal error")]
    Internal,
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Unavailable(e) => {
                tracing::error!(error = %e, "storage unavailable");
                ApiError::Unavailable
            }
            SearchError::InvalidInput(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Run a storage call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> SearchResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "blocking task failed");
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}

// =========================================================================
// Payloads
// =========================================================================

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

/// Drug as returned over HTTP.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DrugOut {
    pub id: i64,
    pub name: String,
    pub presentation: Option<String>,
    pub strength: Option<String>,
}

impl From<Drug> for DrugOut {
    fn from(drug: Drug) -> Self {
        Self {
            id: drug.id,
            name: drug.name,
            presentation: drug.presentation,
            strength: drug.strength,
        }
    }
}

// =========================================================================
// Handlers
// =========================================================================

async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "clinical search is alive".into(),
    })
}

async fn search_icd10(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<CodeSummary>>, ApiError> {
    let engine = Arc::clone(&state.icd10);
    let results = blocking(move || engine.search(&params.q, params.limit)).await?;
    Ok(Json(results))
}

async fn get_icd10(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CodeSummary>, ApiError> {
    let engine = Arc::clone(&state.icd10);
    let entry = blocking(move || engine.get_by_code(&code)).await?;
    entry
        .map(|e| Json(e.summary()))
        .ok_or(ApiError::NotFound("ICD10 code not found"))
}

async fn search_drugs(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<DrugOut>>, ApiError> {
    let catalog = Arc::clone(&state.drugs);
    let drugs = blocking(move || catalog.search(&params.q, params.limit)).await?;
    Ok(Json(drugs.into_iter().map(DrugOut::from).collect()))
}

async fn create_drug(
    State(state): State<AppState>,
    Json(payload): Json<NewDrug>,
) -> Result<(StatusCode, Json<DrugOut>), ApiError> {
    let catalog = Arc::clone(&state.drugs);
    let drug = blocking(move || catalog.create(&payload)).await?;
    Ok((StatusCode::CREATED, Json(drug.into())))
}

async fn get_drug(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DrugOut>, ApiError> {
    let catalog = Arc::clone(&state.drugs);
    let drug = blocking(move || catalog.get(id)).await?;
    drug.map(|d| Json(d.into()))
        .ok_or(ApiError::NotFound("Drug not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use clinical_search_core::CodeEntry;
    use serde_json::Value;
    use tower::ServiceExt;

    fn seeded_state() -> AppState {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .with_session(|db| {
                db.upsert_code_entries(&[
                    CodeEntry::new("E10", "Diabetes mellitus tipo 1"),
                    CodeEntry::new("E11", "Diabetes mellitus tipo 2"),
                    CodeEntry::new("J45", "Asma"),
                ])
            })
            .unwrap();
        AppState::from_store(Arc::new(store), &ApiConfig::default()).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(router(seeded_state()), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_search_icd10() {
        let (status, body) = send(router(seeded_state()), get("/icd10/search?q=Diabetes&limit=20")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                { "code": "E10", "description": "Diabetes mellitus tipo 1" },
                { "code": "E11", "description": "Diabetes mellitus tipo 2" },
            ])
        );
    }

    #[tokio::test]
    async fn test_search_icd10_blank_and_missing_query() {
        let app = router(seeded_state());
        let (status, body) = send(app.clone(), get("/icd10/search?q=%20%20")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, body) = send(app, get("/icd10/search")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_search_icd10_rejects_bad_limit() {
        let (status, _) = send(router(seeded_state()), get("/icd10/search?q=asma&limit=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_icd10() {
        let app = router(seeded_state());
        let (status, body) = send(app.clone(), get("/icd10/J45")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "code": "J45", "description": "Asma" }));

        let (status, body) = send(app, get("/icd10/Z99")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "ICD10 code not found" }));
    }

    #[tokio::test]
    async fn test_drug_lifecycle() {
        let app = router(seeded_state());
        let request = Request::builder()
            .method("POST")
            .uri("/drugs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "name": "Metformina", "presentation": "tabletas", "strength": "850 mg" })
                    .to_string(),
            ))
            .unwrap();
        let (status, created) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "Metformina");
        assert!(created.get("created_at").is_none());

        let id = created["id"].as_i64().unwrap();
        let (status, fetched) = send(app.clone(), get(&format!("/drugs/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, found) = send(app.clone(), get("/drugs/search?q=metf")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found, json!([created]));

        let (status, body) = send(app, get("/drugs/9999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Drug not found");
    }

    #[tokio::test]
    async fn test_create_drug_blank_name() {
        let request = Request::builder()
            .method("POST")
            .uri("/drugs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "name": "   " }).to_string()))
            .unwrap();
        let (status, body) = send(router(seeded_state()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_unavailable_storage_is_503() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("clinical.db")).unwrap();
        let state = AppState::from_store(Arc::new(store), &ApiConfig::default()).unwrap();
        drop(dir);

        let (status, body) = send(router(state), get("/icd10/search?q=asma")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({ "detail": "search engine unavailable" }));
    }
}
