//! HTTP server implementation
//!
//! The delivery boundary from the outside world's point of view:
//! - `GET /health` - liveness probe
//! - `GET /catalog` - materialized entity list as JSON
//! - `GET /downloads?session_id=` - mint download links after verified payment
//! - `GET /download/{token}` - redeem a token into a file stream
//!
//! Page rendering, carts and sessions live elsewhere; this server only
//! speaks JSON and file bytes. Uses hyper http1 with TokioIo for async
//! handling.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::catalog::CatalogService;
use crate::config::Args;
use crate::entitlement::DeliveryService;
use crate::types::{Result, ShopError};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub catalog: Arc<CatalogService>,
    pub delivery: Arc<DeliveryService>,
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("vellum listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - insecure token secret in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => health_response(),

        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/catalog") => catalog_response(&state),

        (Method::GET, "/downloads") => {
            let session_id = query_param(req.uri().query(), "session_id").unwrap_or_default();
            downloads_response(&state, &session_id).await
        }

        (Method::GET, p) if p.starts_with("/download/") => {
            let token = p.strip_prefix("/download/").unwrap_or_default().to_string();
            download_response(&state, &token).await
        }

        _ => error_response(ShopError::NotFound("no such endpoint".into())),
    };

    Ok(response)
}

fn health_response() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "status": "ok",
            "service": "vellum",
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

fn catalog_response(state: &AppState) -> Response<Full<Bytes>> {
    let products = state.catalog.materialize();
    json_response(StatusCode::OK, &products)
}

async fn downloads_response(state: &AppState, session_id: &str) -> Response<Full<Bytes>> {
    match state.delivery.issue_downloads(session_id).await {
        Ok(links) => json_response(StatusCode::OK, &links),
        Err(err) => error_response(err),
    }
}

async fn download_response(state: &AppState, token: &str) -> Response<Full<Bytes>> {
    let resolved = match state.delivery.redeem(token).await {
        Ok(resolved) => resolved,
        Err(err) => return error_response(err),
    };

    let bytes = match tokio::fs::read(&resolved.path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(error = %err, "Resolved file could not be read");
            return error_response(ShopError::NotFound("file not found".into()));
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", guess_content_type(&resolved.file_name))
        .header("Content-Disposition", content_disposition(&resolved.file_name))
        .header("Cache-Control", "no-store")
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR, "response error"))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = match serde_json::to_vec(value) {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "Response serialization failed");
            return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "serialization error");
        }
    };
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR, "response error"))
}

fn error_response(err: ShopError) -> Response<Full<Bytes>> {
    let (status, message) = err.into_status_code_and_body();
    json_response(status, &serde_json::json!({ "error": message }))
}

fn plain_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response")
}

fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .body(Full::new(Bytes::new()))
        .expect("static response")
}

/// Extract one query parameter value
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    for pair in query?.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == name {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Attachment header with the suggested filename reduced to ASCII
fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|ch| {
            if ch.is_ascii() && !ch.is_ascii_control() && ch != '"' && ch != '\\' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// Guess MIME type from file extension
fn guess_content_type(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_lowercase).as_deref() {
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain; charset=utf-8",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}
