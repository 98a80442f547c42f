use crate::AppState;
use crate::cache_store::summarize;
use crate::install_prompt::{DeferredPrompt, InstallOutcome, InstallPromptController};
use crate::lifecycle::{LifecycleError, resolve_scope};
use crate::network::is_hop_by_hop;
use crate::worker::FetchOutcome;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, Request, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use pwa_offline_proto::{
    ArchiveHeader, ControlEvent, ControlMessage, Destination, NotificationClick, ProtoError,
    PushEvent, RequestDescriptor, RequestMode, ResponseSnapshot, SnapshotWriter, SyncEvent,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::MutexGuard;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use url::Url;

/// Largest request body forwarded through the proxy
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    let control = Router::new()
        .route("/register", post(handle_register))
        .route("/message", post(handle_message))
        .route("/sync", post(handle_sync))
        .route("/push", post(handle_push))
        .route("/notificationclick", post(handle_notification_click))
        .route("/status", get(handle_status))
        .route("/caches", get(handle_list_caches))
        .route("/caches/{name}/export", get(handle_export_cache))
        .route("/notifications", get(handle_list_notifications))
        .route("/clients", get(handle_list_clients))
        .route("/install-prompt", get(handle_install_prompt_status))
        .route("/beforeinstallprompt", post(handle_before_install_prompt))
        .route("/installclick", post(handle_install_click))
        .route("/appinstalled", post(handle_app_installed))
        .layer(CorsLayer::permissive()); // Pages may post control messages from any origin

    Router::new()
        .nest("/__sw", control)
        .fallback(handle_intercept)
        .with_state(state)
}

/// Turn an incoming HTTP request into the descriptor the manager sees
///
/// Absolute-form targets (forward proxy use) keep their own URL; anything
/// else is a path on the proxied origin.
pub fn describe_request(
    origin: &Url,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Vec<u8>,
) -> Result<RequestDescriptor, url::ParseError> {
    let url = if uri.scheme().is_some() && uri.authority().is_some() {
        Url::parse(&uri.to_string())?
    } else {
        let mut url = origin.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());
        url
    };

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let accept = header_str("accept").unwrap_or_default();

    let mode = header_str("sec-fetch-mode")
        .and_then(RequestMode::from_header)
        .unwrap_or_else(|| {
            if *method == Method::GET && accept.contains("text/html") {
                RequestMode::Navigate
            } else {
                RequestMode::NoCors
            }
        });

    let destination = match header_str("sec-fetch-dest") {
        Some(dest) => Destination::from_header(dest),
        None if mode == RequestMode::Navigate => Destination::Document,
        None if accept.starts_with("image/") => Destination::Image,
        None => Destination::Empty,
    };

    let mut descriptor = RequestDescriptor::get(url)
        .with_method(method.as_str())
        .with_mode(mode)
        .with_destination(destination)
        .with_body(body);
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            descriptor = descriptor.with_header(name.as_str(), value);
        }
    }
    Ok(descriptor)
}

/// Convert a stored or fetched snapshot into an HTTP response
pub fn snapshot_response(snapshot: ResponseSnapshot) -> Response {
    let Ok(status) = StatusCode::from_u16(snapshot.status) else {
        return (StatusCode::BAD_GATEWAY, "Network error").into_response();
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in &snapshot.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    match builder.body(Body::from(snapshot.body)) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to build response from snapshot: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_intercept(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Rejected request body: {}", e);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let descriptor = match describe_request(
        &state.origin,
        &parts.method,
        &parts.uri,
        &parts.headers,
        body.to_vec(),
    ) {
        Ok(descriptor) => descriptor,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("Invalid request URL: {}", e)).into_response(),
    };
    debug!("📡 {} {} ({:?}, {:?})", descriptor.method, descriptor.url, descriptor.mode, descriptor.destination);

    // Navigations outside the scope load pages this registration does not control
    let manager = state
        .registration
        .active()
        .filter(|_| !descriptor.is_navigation() || state.registration.in_scope(&descriptor.url));

    let outcome = match manager {
        Some(manager) => manager.handle_fetch(&descriptor).await,
        None => Ok(FetchOutcome::Passthrough),
    };

    match outcome {
        Ok(FetchOutcome::Respond(snapshot)) => snapshot_response(snapshot),
        Ok(FetchOutcome::Passthrough) => match state.network.fetch(&descriptor).await {
            Ok(snapshot) => snapshot_response(snapshot),
            Err(e) => {
                warn!("Pass-through fetch of {} failed: {}", descriptor.url, e);
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
        },
        Err(e) => {
            warn!("❌ {} {} failed: {}", descriptor.method, descriptor.url, e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    script_url: String,
    scope: Option<String>,
    client_url: Option<String>,
}

async fn handle_register(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return bad_payload(ProtoError::from(e)),
    };

    let (script, scope) = match resolve_scope(&state.origin, &request.script_url, request.scope.as_deref()) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("Registration FAILED: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
        }
    };

    if script.as_str() != state.registration.script_url() || scope.as_str() != state.registration.scope() {
        warn!("Registration for {} ({}) does not match the hosted one", script, scope);
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!("only {} with scope {} is hosted", state.registration.script_url(), state.registration.scope())
            })),
        )
            .into_response();
    }

    let client_url = request.client_url.unwrap_or_else(|| scope.path().to_string());
    let client_id = state.host.connect(&client_url);
    info!("Service worker registered with scope: {}", scope);
    Json(json!({ "scope": scope.as_str(), "client_id": client_id })).into_response()
}

async fn handle_message(State(state): State<AppState>, body: Bytes) -> Response {
    match ControlMessage::from_json(&body) {
        Ok(message) => dispatch(&state, ControlEvent::Message(message)).await,
        Err(e) => bad_payload(e),
    }
}

async fn handle_sync(State(state): State<AppState>, body: Bytes) -> Response {
    match SyncEvent::from_json(&body) {
        Ok(event) => dispatch(&state, ControlEvent::Sync(event)).await,
        Err(e) => bad_payload(e),
    }
}

async fn handle_push(State(state): State<AppState>, body: Bytes) -> Response {
    match PushEvent::from_body(&body) {
        Ok(event) => dispatch(&state, ControlEvent::Push(event)).await,
        Err(e) => bad_payload(e),
    }
}

async fn handle_notification_click(State(state): State<AppState>, body: Bytes) -> Response {
    match NotificationClick::from_json(&body) {
        Ok(event) => dispatch(&state, ControlEvent::NotificationClick(event)).await,
        Err(e) => bad_payload(e),
    }
}

async fn dispatch(state: &AppState, event: ControlEvent) -> Response {
    let kind = event.kind();
    match state.registration.dispatch(event).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(LifecycleError::NoActiveWorker) => {
            (StatusCode::SERVICE_UNAVAILABLE, "No active worker").into_response()
        }
        Err(e) => {
            error!("Failed to handle {} event: {}", kind, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn bad_payload(e: ProtoError) -> Response {
    debug!("Rejected payload: {}", e);
    (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
}

async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registration.status())
}

async fn handle_list_caches(State(state): State<AppState>) -> Response {
    let current = state
        .registration
        .active()
        .map(|manager| manager.cache_version().to_string())
        .unwrap_or_default();

    match summarize(state.storage.as_ref(), &current).await {
        Ok(stores) => Json(stores).into_response(),
        Err(e) => {
            error!("Failed to list caches: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list caches").into_response()
        }
    }
}

async fn handle_export_cache(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.storage.has(&name).await {
        Ok(true) => {}
        Ok(false) => return (StatusCode::NOT_FOUND, "Cache not found").into_response(),
        Err(e) => {
            error!("Failed to look up cache {}: {}", name, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Storage error").into_response();
        }
    }

    let entries = match state.storage.entries(&name).await {
        Ok(entries) => entries,
        Err(e) => {
            error!("Failed to read cache {}: {}", name, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Storage error").into_response();
        }
    };

    let mut writer = SnapshotWriter::new(Vec::new());
    let written = writer
        .write_header(&ArchiveHeader::new())
        .and_then(|_| entries.iter().try_for_each(|entry| writer.write_entry(entry)));
    if let Err(e) = written {
        error!("Failed to encode cache {}: {}", name, e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode cache").into_response();
    }
    info!("Exported cache {} ({} entries)", name, entries.len());

    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.pwcs\"", name),
            ),
        ],
        writer.into_inner(),
    )
        .into_response()
}

async fn handle_list_notifications(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.host.notifications())
}

async fn handle_list_clients(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.host.clients())
}

fn install_prompt(state: &AppState) -> MutexGuard<'_, InstallPromptController> {
    state
        .install_prompt
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn handle_install_prompt_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(install_prompt(&state).status())
}

#[derive(Debug, Default, Deserialize)]
struct BeforeInstallPromptRequest {
    #[serde(default)]
    platforms: Vec<String>,
}

async fn handle_before_install_prompt(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.is_empty() {
        BeforeInstallPromptRequest::default()
    } else {
        match serde_json::from_slice::<BeforeInstallPromptRequest>(&body) {
            Ok(request) => request,
            Err(e) => return bad_payload(ProtoError::from(e)),
        }
    };

    let mut prompt = install_prompt(&state);
    prompt.on_before_install_prompt(DeferredPrompt::new(request.platforms));
    Json(prompt.status()).into_response()
}

#[derive(Debug, Deserialize)]
struct InstallClickRequest {
    outcome: InstallOutcome,
}

async fn handle_install_click(State(state): State<AppState>, body: Bytes) -> Response {
    let request: InstallClickRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return bad_payload(ProtoError::from(e)),
    };

    match install_prompt(&state).on_click(|_| request.outcome) {
        Some(outcome) => Json(json!({ "outcome": outcome })).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "no deferred install prompt" })),
        )
            .into_response(),
    }
}

async fn handle_app_installed(State(state): State<AppState>) -> impl IntoResponse {
    let mut prompt = install_prompt(&state);
    prompt.on_app_installed();
    Json(prompt.status())
}
