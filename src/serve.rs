//! Purpose: Provide the HTTP/JSON record server for clientbook.
//! Exports: `ServeConfig`, `serve`, `router`.
//! Role: Axum front for `RecordService`; maps service results to status codes.
//! Invariants: Error bodies are `{message, error?, fields?}`; 500s never leak detail.
//! Invariants: Loopback-only unless explicitly allowed.
//! Invariants: Store work runs on the blocking pool, never on the async executor.
#![allow(clippy::result_large_err)]

use std::any::Any;
use std::collections::BTreeMap;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path as AxumPath, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clientbook::api::{
    Error, ErrorKind, NOT_FOUND_MESSAGE, RecordId, RecordInput, RecordService,
};
use clientbook::store_paths::{StoreLocation, open_store};

pub const HEALTH_STATUS: &str = "Server is running";
pub const DELETED_MESSAGE: &str = "Record deleted successfully";
pub const INTERNAL_MESSAGE: &str = "Something went wrong!";
pub const ROUTE_NOT_FOUND_MESSAGE: &str = "Route not found";
const VALIDATION_MESSAGE: &str = "Validation Error";

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub store: StoreLocation,
    pub cors_origins: Vec<String>,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
}

#[derive(Clone)]
struct AppState {
    service: RecordService,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let store = open_store(&config.store)?;
    let service = RecordService::new(store);
    let store_label = service.describe_store();
    let app = router(service, &config.cors_origins, max_body_bytes)?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    info!(bind = %config.bind, store = %store_label, "server listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            info!("shutdown requested");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

pub fn router(
    service: RecordService,
    cors_origins: &[String],
    max_body_bytes: usize,
) -> Result<Router, Error> {
    let state = Arc::new(AppState { service });
    Ok(Router::new()
        .route("/health", get(health))
        .route("/records", get(list_records).post(create_record))
        .route("/records/check-client-id/:client_id", get(check_client_id))
        .route(
            "/records/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors_layer(cors_origins)?)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, Error> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);
    if origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(AllowOrigin::any()));
    }
    let origins = origins
        .iter()
        .map(|origin| parse_origin(origin))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

fn parse_origin(origin: &str) -> Result<HeaderValue, Error> {
    let trimmed = origin.trim().trim_end_matches('/');
    let valid_scheme = trimmed.starts_with("http://") || trimmed.starts_with("https://");
    if !valid_scheme || trimmed.contains(char::is_whitespace) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid cors origin `{origin}`"))
            .with_hint("Use a full origin like http://localhost:3000, or `*`."));
    }
    HeaderValue::from_str(trimmed).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid cors origin `{origin}`"))
            .with_source(err)
    })
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    if config.cors_origins.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("at least one cors origin is required")
            .with_hint("Pass --cors-origin http://localhost:3000 (or `*`)."));
    }
    for origin in &config.cors_origins {
        if origin != "*" {
            parse_origin(origin)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

async fn run_blocking<T, F>(work: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("store task failed")
            .with_source(err)
    })?
}

fn parse_body(body: Result<Bytes, BytesRejection>) -> Result<RecordInput, Response> {
    let bytes = body.map_err(|rejection| {
        let status = rejection.status();
        let err = Error::new(ErrorKind::Validation)
            .with_message(VALIDATION_MESSAGE)
            .with_detail(rejection.body_text());
        error_response_with_status(&err, status)
    })?;
    let invalid = |detail: String| {
        let err = Error::new(ErrorKind::Validation)
            .with_message(VALIDATION_MESSAGE)
            .with_detail(detail);
        error_response(&err)
    };
    // Bodies must be JSON objects; positional arrays are refused.
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes)
        .map_err(|err| invalid(format!("invalid JSON body: {err}")))?;
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|err| invalid(format!("invalid JSON body: {err}")))
}

async fn health() -> Response {
    Json(json!({ "status": HEALTH_STATUS })).into_response()
}

async fn route_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": ROUTE_NOT_FOUND_MESSAGE })),
    )
        .into_response()
}

async fn list_records(State(state): State<Arc<AppState>>) -> Response {
    let service = state.service.clone();
    match run_blocking(move || service.list()).await {
        Ok(records) => Json(records).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn get_record(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    let service = state.service.clone();
    match run_blocking(move || service.get(&RecordId::new(id))).await {
        Ok(record) => Json(record).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn create_record(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let input = match parse_body(body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let service = state.service.clone();
    match run_blocking(move || service.create(&input)).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn update_record(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let input = match parse_body(body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let service = state.service.clone();
    match run_blocking(move || service.update(&RecordId::new(id), &input)).await {
        Ok(record) => Json(record).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn delete_record(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let service = state.service.clone();
    match run_blocking(move || service.delete(&RecordId::new(id))).await {
        Ok(_) => Json(json!({ "message": DELETED_MESSAGE })).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn check_client_id(
    State(state): State<Arc<AppState>>,
    AxumPath(raw): AxumPath<String>,
) -> Response {
    let service = state.service.clone();
    let result = run_blocking(move || {
        let client_id = service.parse_client_id(&raw)?;
        let available = service.client_id_available(client_id, None)?;
        Ok((client_id, available))
    })
    .await;
    match result {
        Ok((client_id, available)) => {
            Json(json!({ "clientId": client_id, "available": available })).into_response()
        }
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<&'static str, &'a str>>,
}

fn error_response(err: &Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response_with_status(err, status)
}

fn error_response_with_status(err: &Error, status: StatusCode) -> Response {
    let body = match err.kind() {
        ErrorKind::Validation => ErrorEnvelope {
            message: err.message().unwrap_or(VALIDATION_MESSAGE),
            error: err.detail(),
            fields: err.fields().map(|fields| {
                fields
                    .iter()
                    .map(|(field, message)| (field.as_str(), message))
                    .collect()
            }),
        },
        ErrorKind::NotFound => ErrorEnvelope {
            message: NOT_FOUND_MESSAGE,
            error: None,
            fields: None,
        },
        _ => {
            error!(kind = ?err.kind(), error = %err, "request failed");
            ErrorEnvelope {
                message: INTERNAL_MESSAGE,
                error: None,
                fields: None,
            }
        }
    };
    (status, Json(body)).into_response()
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": INTERNAL_MESSAGE })),
    )
        .into_response()
}
