//! HTTP surface of the service: on demand mapping plus the operational endpoints.
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use placeholder_common::dates::upp_date_now;
use placeholder_common::mapper::AggregateMapper;
use placeholder_common::message::{to_publication_event, TRANSACTION_ID_HEADER};
use placeholder_common::native::NativeMapper;
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

use crate::health::{health_report, DependencyCheck, LivenessRegistry};
use crate::metrics::track_metrics;

pub const SERVICE_NAME: &str = "methode-content-placeholder-mapper";

#[derive(Clone)]
pub struct AppState {
    pub native_mapper: Arc<dyn NativeMapper>,
    pub aggregate_mapper: Arc<dyn AggregateMapper>,
    pub checks: Vec<Arc<dyn DependencyCheck>>,
    pub liveness: LivenessRegistry,
}

#[derive(Serialize)]
struct MessageBody {
    message: String,
}

pub fn router(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/", routing::get(index))
        .route("/map", routing::post(map))
        .route("/__health", routing::get(health))
        .route("/__gtg", routing::get(gtg))
        .route(
            "/metrics",
            routing::get(move || match metrics {
                Some(ref recorder_handle) => std::future::ready(recorder_handle.render()),
                None => std::future::ready("no metrics recorder installed".to_owned()),
            }),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
}

pub async fn index() -> &'static str {
    SERVICE_NAME
}

fn transaction_id(headers: &HeaderMap) -> String {
    match headers
        .get(TRANSACTION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        Some(tid) => tid.to_owned(),
        None => {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(10)
                .map(char::from)
                .collect();
            format!("tid_{}", suffix.to_lowercase())
        }
    }
}

/// Every `/map` answer is labelled JSON, error texts included.
fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn message_response(status: StatusCode, message: String) -> Response {
    (status, Json(MessageBody { message })).into_response()
}

/// Run a native record through the pipeline and answer with the events it would publish.
#[instrument(skip_all)]
async fn map(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let transaction_id = transaction_id(&headers);
    info!(%transaction_id, "received transformation request");

    let last_modified = match upp_date_now() {
        Ok(now) => now,
        Err(e) => {
            error!(%transaction_id, error = %e, "failed to timestamp request");
            return json_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let placeholder = match state
        .native_mapper
        .map(&body, &transaction_id, &last_modified)
    {
        Ok(placeholder) => placeholder,
        Err(e) => {
            error!(%transaction_id, uuid = e.uuid().unwrap_or_default(), error = %e, "failed to decode native record");
            return json_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
        }
    };

    if placeholder.is_deleted() {
        info!(%transaction_id, uuid = %placeholder.uuid, "native record is a delete");
        return message_response(StatusCode::NOT_FOUND, "Delete event".to_owned());
    }

    let contents = match state
        .aggregate_mapper
        .map_placeholder(&placeholder, &transaction_id, &last_modified)
        .await
    {
        Ok(contents) => contents,
        Err(e) => {
            error!(%transaction_id, uuid = e.uuid(), error = %e, "failed to map content placeholder");
            return json_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
        }
    };

    let events: Vec<_> = contents
        .iter()
        .map(|content| to_publication_event(content.core(), content))
        .collect();

    match serde_json::to_string(&events) {
        Ok(body) => {
            info!(%transaction_id, uuid = %placeholder.uuid, "transformation successful");
            json_response(StatusCode::OK, body)
        }
        Err(e) => {
            error!(%transaction_id, uuid = %placeholder.uuid, error = %e, "failed to serialize publication events");
            json_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let report = health_report(SERVICE_NAME, &state.checks, &state.liveness).await;
    (StatusCode::OK, Json(report)).into_response()
}

async fn gtg(State(state): State<AppState>) -> Response {
    let report = health_report(SERVICE_NAME, &state.checks, &state.liveness).await;
    if report.ok {
        (StatusCode::OK, "OK").into_response()
    } else {
        let failed: Vec<&str> = report
            .checks
            .iter()
            .filter(|check| !check.ok)
            .map(|check| check.output.as_str())
            .collect();
        (StatusCode::SERVICE_UNAVAILABLE, failed.join("\n")).into_response()
    }
}
