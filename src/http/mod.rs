//! # Launch Trigger
//!
//! HTTP surface of the daemon: a single `POST /launch-reader` route.
//!
//! ```text
//! POST /launch-reader
//! {"id": 7}
//! ```
//!
//! Each request runs its launch in a task of its own and waits for it, so a
//! failing or panicking launch is contained to that request. The reply is a
//! [`LaunchStatus`] document:
//!
//! | status | when                                                      |
//! |--------|-----------------------------------------------------------|
//! | `200`  | every lifecycle step completed                            |
//! | `400`  | body without a numeric `id`, only with `reject_malformed_requests` |
//! | `500`  | the launch worker panicked                                |
//! | `502`  | a runtime step failed; the body names the step            |
//!
//! Without `reject_malformed_requests`, an undecodable body launches with id `0`.

use std::future::Future;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::model::{ContainerName, ImageReference, LaunchReport, LaunchRequest, LaunchStep};
use crate::orchestrator::{LaunchError, LifecycleOrchestrator};

pub const LAUNCH_READER_PATH: &str = "/launch-reader";

/// Body returned by the trigger endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LaunchStatus {
    Completed {
        report: LaunchReport,
    },
    Failed {
        request_id: u64,
        failed_step: Option<LaunchStep>,
        container: Option<ContainerName>,
        completed: Vec<LaunchStep>,
        error: String,
    },
    Rejected {
        error: String,
    },
}

impl From<&LaunchError> for LaunchStatus {
    fn from(err: &LaunchError) -> Self {
        let completed = match err {
            LaunchError::Step { completed, .. } => completed.clone(),
            LaunchError::Cache { .. } => Vec::new(),
        };
        LaunchStatus::Failed {
            request_id: err.request_id(),
            failed_step: err.step(),
            container: err.container().cloned(),
            completed,
            error: err.to_string(),
        }
    }
}

/// Shared state behind the router.
#[derive(Clone)]
pub struct TriggerState {
    pub orchestrator: LifecycleOrchestrator,
    pub image: ImageReference,
    pub reject_malformed_requests: bool,
}

pub fn router(state: TriggerState) -> Router {
    Router::new()
        .route(LAUNCH_READER_PATH, post(launch_reader))
        .with_state(state)
}

/// Body accepted in strict mode: `id` must be present and nothing else may be.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictLaunchRequest {
    id: u64,
}

fn decode_request(body: &[u8], strict: bool) -> Result<LaunchRequest, serde_json::Error> {
    if strict {
        serde_json::from_slice::<StrictLaunchRequest>(body).map(|r| LaunchRequest::new(r.id))
    } else {
        serde_json::from_slice::<LaunchRequest>(body)
    }
}

async fn launch_reader(State(state): State<TriggerState>, body: Bytes) -> Response {
    let request = match decode_request(&body, state.reject_malformed_requests) {
        Ok(request) => request,
        Err(e) if state.reject_malformed_requests => {
            warn!(error = %e, "Rejected malformed launch request");
            let status = LaunchStatus::Rejected { error: e.to_string() };
            return (StatusCode::BAD_REQUEST, Json(status)).into_response();
        }
        Err(e) => {
            warn!(error = %e, "Malformed launch request, using id 0");
            LaunchRequest::default()
        }
    };

    let orchestrator = state.orchestrator.clone();
    let image = state.image.clone();
    let worker = tokio::spawn(async move { orchestrator.launch(request, &image).await });

    match worker.await {
        Ok(Ok(report)) => (StatusCode::OK, Json(LaunchStatus::Completed { report })).into_response(),
        Ok(Err(e)) => (StatusCode::BAD_GATEWAY, Json(LaunchStatus::from(&e))).into_response(),
        Err(e) => {
            error!(request_id = request.id, error = %e, "Launch worker died");
            let status = LaunchStatus::Failed {
                request_id: request.id,
                failed_step: None,
                container: None,
                completed: Vec::new(),
                error: e.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(status)).into_response()
        }
    }
}

/// Serves the trigger router on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: TriggerState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Launch trigger listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeError;

    #[test]
    fn test_failed_status_names_step() {
        let err = LaunchError::Step {
            request_id: 3,
            step: LaunchStep::Start,
            container: Some(ContainerName::new("reader-1")),
            completed: vec![LaunchStep::Pull, LaunchStep::Create],
            source: RuntimeError::Unavailable("daemon gone".to_string()),
        };
        let json = serde_json::to_value(LaunchStatus::from(&err)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failed_step"], "start");
        assert_eq!(json["container"], "reader-1");
        assert_eq!(json["completed"], serde_json::json!(["pull", "create"]));
    }

    #[test]
    fn test_missing_id_defaults_to_zero() {
        let request = decode_request(b"{}", false).unwrap();
        assert_eq!(request.id, 0);
    }

    #[test]
    fn test_strict_decoding_requires_exactly_id() {
        assert_eq!(decode_request(br#"{"id": 5}"#, true).unwrap().id, 5);
        for body in [&b"{}"[..], br#"{"ID": 5}"#, br#"{"idd": 5}"#, br#"{"id": 5, "x": 1}"#, b"[]"] {
            assert!(decode_request(body, true).is_err(), "{:?}", String::from_utf8_lossy(body));
        }
    }
}
