use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::extract::{ConnectInfo, Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::error::ServiceError;
use super::state::ServiceState;
use crate::ledger::{FIELD_INFO, Info, Record, RecordHandler};

/// State a caller wants to lease from, defaults to the configured open mark.
pub const HEADER_GET_STATE: &str = "x-get-state";
/// State a leased record is flipped to, defaults to the configured lock mark.
pub const HEADER_SET_STATE: &str = "x-set-state";

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/{ledger}/next", get(next_record))
        .route("/{ledger}/update", post(update_record))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(address: SocketAddr, state: ServiceState) -> Result<(), AnyError> {
    info!(
        %address,
        ledger_dir = %state.ledger_dir.display(),
        "record service listening"
    );
    if !state.accepted_clients.is_empty() {
        info!(clients = ?state.accepted_clients, "accepting requests only from listed clients");
    }
    info!("next data: GET {address}/<ledger>/next");
    info!("post data: POST {address}/<ledger>/update");

    let app = router(state);
    let listener = TcpListener::bind(address).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!(%address, "record service shut down");
    Ok(())
}

/// Lease route: locate the ledger, find the next record in the requested
/// state, flip it to the lease state with the caller's address stamped into
/// its payload, persist, and return the leased record.
async fn next_record(
    State(state): State<ServiceState>,
    UrlPath(ledger): UrlPath<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<BTreeMap<String, String>>, ServiceError> {
    ensure_allowed(&state, &addr)?;
    let get_state = header_value(&headers, HEADER_GET_STATE)
        .unwrap_or_else(|| state.ledger.mark_open.clone());
    let set_state = header_value(&headers, HEADER_SET_STATE)
        .unwrap_or_else(|| state.ledger.mark_lock.clone());

    let _guard = state.lock().await;
    let data_path = find_ledger(&state.ledger_dir, &ledger).ok_or_else(|| {
        warn!(%ledger, dir = %state.ledger_dir.display(), "no such ledger");
        ServiceError::LedgerNotFound {
            name: ledger.clone(),
            dir: state.ledger_dir.display().to_string(),
        }
    })?;
    let mut handler = load_handler(&state, &data_path)?;
    let Some(record) = handler.next_record(Some(get_state.as_str())) else {
        state.metrics.record_exhausted();
        info!(%ledger, state = %get_state, "records exhausted");
        return Err(ServiceError::Exhausted {
            state: get_state,
            ledger,
        });
    };

    let info_encoded = handler.schema().position(FIELD_INFO).map(|_| {
        let mut payload = record.info.clone();
        payload.merge(&Info::entry("client", addr.ip().to_string()));
        payload.to_string()
    });
    let overrides: Vec<(&str, &str)> = info_encoded
        .as_deref()
        .map(|encoded| vec![(FIELD_INFO, encoded)])
        .unwrap_or_default();
    handler.save_record_state(record.identifier(), Some(set_state.as_str()), &overrides)?;
    let leased = handler.get(record.identifier()).ok_or_else(|| {
        ServiceError::Internal(format!("leased record {} vanished", record.identifier()))
    })?;

    state.metrics.lease_granted();
    info!(
        identifier = %leased.identifier(),
        %ledger,
        client = %addr,
        state = %set_state,
        "record leased"
    );
    Ok(Json(leased.to_fields()))
}

/// Update route: merge the caller's payload into the stored record and set
/// the caller's new state.
async fn update_record(
    State(state): State<ServiceState>,
    UrlPath(ledger): UrlPath<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<BTreeMap<String, String>>,
) -> Result<String, ServiceError> {
    ensure_allowed(&state, &addr)?;
    let incoming =
        Record::from_fields(&payload).map_err(|err| ServiceError::BadPayload(err.to_string()))?;

    let _guard = state.lock().await;
    let data_path = find_ledger(&state.ledger_dir, &ledger).ok_or_else(|| {
        ServiceError::LedgerNotFound {
            name: ledger.clone(),
            dir: state.ledger_dir.display().to_string(),
        }
    })?;
    let mut handler = load_handler(&state, &data_path)?;
    let Some(mut existing) = handler.get(incoming.identifier()) else {
        state.metrics.update_rejected();
        warn!(identifier = %incoming.identifier(), %ledger, client = %addr, "update for unknown record");
        return Err(ServiceError::RecordNotFound {
            identifier: incoming.identifier().to_owned(),
            ledger,
        });
    };
    existing.info.merge(&incoming.info);

    let mut overrides: Vec<(&str, &str)> = Vec::new();
    let info_encoded = existing.info.to_string();
    if handler.schema().position(FIELD_INFO).is_some() {
        overrides.push((FIELD_INFO, info_encoded.as_str()));
    }
    handler.save_record_state(incoming.identifier(), Some(incoming.state()), &overrides)?;

    state.metrics.update_applied();
    let message = format!(
        "set {} to {} in {}",
        incoming.identifier(),
        incoming.state(),
        data_path.display()
    );
    info!(client = %addr, "{message}");
    Ok(message)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    components: HashMap<String, String>,
    version: String,
}

async fn health(State(state): State<ServiceState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("service".to_owned(), "healthy".to_owned());
    let dir_status = if state.ledger_dir.is_dir() {
        "healthy"
    } else {
        "unhealthy"
    };
    components.insert("ledger_dir".to_owned(), dir_status.to_owned());

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_owned(),
        components,
        version: env!("CARGO_PKG_VERSION").to_owned(),
    };
    (status_code, Json(response))
}

fn ensure_allowed(state: &ServiceState, addr: &SocketAddr) -> Result<(), ServiceError> {
    if state.accepted_clients.is_empty() {
        return Ok(());
    }
    let client = addr.ip().to_string();
    if state.accepted_clients.iter().any(|allowed| *allowed == client) {
        return Ok(());
    }
    warn!(%client, "request rejected");
    Err(ServiceError::NotAllowed)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Ledger names arrive without extension, so search the directory for a
/// file whose stem matches.
fn find_ledger(dir: &Path, name: &str) -> Option<PathBuf> {
    let stem = Path::new(name).file_stem()?.to_owned();
    for entry in fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if path.is_file() && path.file_stem() == Some(stem.as_os_str()) {
            return Some(path);
        }
    }
    None
}

fn load_handler(state: &ServiceState, path: &Path) -> Result<RecordHandler, ServiceError> {
    RecordHandler::builder()
        .path(path.to_path_buf())
        .mark_open(state.ledger.mark_open.clone())
        .mark_lock(state.ledger.mark_lock.clone())
        .time_format(state.ledger.time_format.clone())
        .build()
        .map_err(ServiceError::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
