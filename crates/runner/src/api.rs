use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use broker::{ExecutionResult, Job, ResultCache, SubmissionQueue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{RunnerError, RunnerResult};
use crate::language::{Language, LanguageInfo};
use crate::pool::WorkerPool;

#[derive(Clone)]
pub struct ApiState {
    pub queue: Arc<dyn SubmissionQueue>,
    pub cache: Arc<dyn ResultCache>,
    pub pool: Arc<WorkerPool>,
    pub max_code_bytes: usize,
}

/// Error response with a JSON `{ "error": ... }` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub submission_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub output: String,
    pub exitcode: i64,
    /// Failure message, if the job did not run to a normal exit.
    pub error: Option<String>,
    /// Failure kind, e.g. `timeout`.
    pub fault: Option<String>,
}

impl From<ExecutionResult> for ResultResponse {
    fn from(result: ExecutionResult) -> Self {
        let (error, fault) = match result.failure {
            Some(failure) => (Some(failure.message), Some(failure.kind.to_string())),
            None => (None, None),
        };
        Self {
            output: result.output,
            exitcode: result.exit_code,
            error,
            fault,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/result", get(result))
        .route("/languages", get(languages))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn submit(
    State(state): State<ApiState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let language = request
        .language
        .parse::<Language>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    if request.code.trim().is_empty() {
        return Err(ApiError::bad_request("code must not be empty"));
    }
    if request.code.len() > state.max_code_bytes {
        return Err(ApiError::bad_request(format!(
            "code exceeds {} bytes",
            state.max_code_bytes
        )));
    }

    let job = Job::new(language.name(), request.code);
    if let Err(e) = state.queue.enqueue(&job).await {
        error!(job_id = %job.id, error = %e, "enqueue failed");
        return Err(ApiError::internal("failed to queue submission"));
    }
    info!(job_id = %job.id, language = %language, "submission queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            submission_id: job.id,
        }),
    ))
}

async fn result(
    State(state): State<ApiState>,
    Query(query): Query<ResultQuery>,
) -> Result<Json<ResultResponse>, ApiError> {
    let key = query
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing key"))?;

    match state.cache.get(&key).await {
        Ok(Some(result)) => Ok(Json(result.into())),
        Ok(None) => Err(ApiError::not_found("result not found")),
        Err(e) => {
            error!(key = %key, error = %e, "cache read failed");
            Err(ApiError::internal("failed to read result"))
        }
    }
}

async fn languages() -> Json<Vec<LanguageInfo>> {
    Json(Language::ALL.into_iter().map(LanguageInfo::from).collect())
}

async fn healthz(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let pool = state.pool.snapshot().await;
    Json(json!({ "status": "ok", "pool": pool }))
}

/// Serve the API on `listener` until `token` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    token: CancellationToken,
) -> RunnerResult<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .map_err(RunnerError::Io)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use broker::{FailureKind, MemoryCache, MemoryQueue};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::testing::{
        FailingCache, FailingQueue, FakeFactory, Outcome, pool_config, worker_context,
    };

    struct Harness {
        queue: Arc<MemoryQueue>,
        cache: Arc<MemoryCache>,
        state: ApiState,
    }

    fn harness() -> Harness {
        let queue = Arc::new(MemoryQueue::new());
        let cache = Arc::new(MemoryCache::new());
        let ctx = worker_context(
            Arc::new(FakeFactory::new(Outcome::Exit(0))),
            cache.clone(),
            Duration::from_secs(5),
        );
        let pool = Arc::new(WorkerPool::start(pool_config(1, 2), ctx).unwrap());
        let state = ApiState {
            queue: queue.clone(),
            cache: cache.clone(),
            pool,
            max_code_bytes: 64,
        };
        Harness {
            queue,
            cache,
            state,
        }
    }

    async fn send(state: ApiState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_submit(body: Value) -> Request<Body> {
        Request::post("/submit")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn submit_queues_job_and_returns_id() {
        let h = harness();
        let (status, body) = send(
            h.state.clone(),
            post_submit(json!({ "language": "Python3", "code": "print(1+1)" })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        let id = body["submissionId"].as_str().unwrap();
        let job = h.queue.dequeue().await.unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.language, "python");
        assert_eq!(job.code, "print(1+1)");
    }

    #[tokio::test]
    async fn submit_rejects_unsupported_language() {
        let h = harness();
        let (status, body) = send(
            h.state.clone(),
            post_submit(json!({ "language": "brainfuck", "code": "+[]" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("brainfuck"));
        assert!(h.queue.is_empty().await);
    }

    #[tokio::test]
    async fn submit_rejects_empty_and_oversized_code() {
        let h = harness();
        let (empty, _) = send(
            h.state.clone(),
            post_submit(json!({ "language": "python", "code": "  \n" })),
        )
        .await;
        let (oversized, _) = send(
            h.state.clone(),
            post_submit(json!({ "language": "python", "code": "x".repeat(65) })),
        )
        .await;

        assert_eq!(empty, StatusCode::BAD_REQUEST);
        assert_eq!(oversized, StatusCode::BAD_REQUEST);
        assert!(h.queue.is_empty().await);
    }

    #[tokio::test]
    async fn submit_rejects_malformed_body_with_json_error() {
        let h = harness();
        let (missing_code, body) = send(
            h.state.clone(),
            post_submit(json!({ "language": "python" })),
        )
        .await;
        assert_eq!(missing_code, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("code"), "body: {body}");

        let broken = Request::post("/submit")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(h.state.clone(), broken).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let untyped = Request::post("/submit")
            .body(Body::from(r#"{"language":"python","code":"print(1)"}"#))
            .unwrap();
        let (status, body) = send(h.state.clone(), untyped).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        assert!(h.queue.is_empty().await);
    }

    #[tokio::test]
    async fn submit_reports_queue_failure() {
        let mut h = harness();
        h.state.queue = Arc::new(FailingQueue);
        let (status, body) = send(
            h.state,
            post_submit(json!({ "language": "python", "code": "print(1)" })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn result_returns_cached_value() {
        let h = harness();
        let result =
            ExecutionResult::failed(FailureKind::Timeout, "exceeded time budget of 5000ms");
        h.cache
            .put("job-1", &result, Duration::from_secs(60))
            .await
            .unwrap();

        let (status, body) = send(h.state.clone(), get_request("/result?key=job-1")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exitcode"], -1);
        assert_eq!(body["output"], "");
        assert_eq!(body["fault"], "timeout");
        assert_eq!(body["error"], "exceeded time budget of 5000ms");
    }

    #[tokio::test]
    async fn result_for_successful_run_has_null_error() {
        let h = harness();
        h.cache
            .put("job-2", &ExecutionResult::exited(0, "2\n".into()), Duration::from_secs(60))
            .await
            .unwrap();

        let (status, body) = send(h.state.clone(), get_request("/result?key=job-2")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "2\n");
        assert_eq!(body["exitcode"], 0);
        assert!(body["error"].is_null());
        assert!(body["fault"].is_null());
    }

    #[tokio::test]
    async fn result_absent_is_not_found() {
        let h = harness();
        let (status, body) = send(h.state.clone(), get_request("/result?key=missing")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn result_without_key_is_bad_request() {
        let h = harness();
        let (missing, _) = send(h.state.clone(), get_request("/result")).await;
        let (empty, _) = send(h.state.clone(), get_request("/result?key=")).await;

        assert_eq!(missing, StatusCode::BAD_REQUEST);
        assert_eq!(empty, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn result_reports_cache_failure() {
        let mut h = harness();
        h.state.cache = Arc::new(FailingCache);
        let (status, _) = send(h.state, get_request("/result?key=job-1")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn languages_lists_table() {
        let h = harness();
        let (status, body) = send(h.state.clone(), get_request("/languages")).await;

        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), Language::ALL.len());
        assert!(entries.contains(&json!({ "language": "python", "image": "python:3.9" })));
    }

    #[tokio::test]
    async fn healthz_reports_pool() {
        let h = harness();
        let (status, body) = send(h.state.clone(), get_request("/healthz")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pool"]["active"], 1);
        assert_eq!(body["pool"]["max"], 2);
    }
}
