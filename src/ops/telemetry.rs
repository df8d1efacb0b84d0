//! Logging setup and the control endpoint.
//!
//! The control endpoint is a minimal hand-rolled HTTP surface: health,
//! metrics, operator-triggered sweeps, and the gateway-facing ingestion
//! routes (attach/detach/touch/disconnect/notify).

use crate::core::runtime::PresenceService;
use crate::presence::registry::DetachOutcome;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload;

pub type LogHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Initialize JSON logging with reloadable level.
pub fn init_tracing(log_level: Option<&str>) -> Result<LogHandle> {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(filter);
    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init tracing: {e}"))?;
    Ok(handle)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachRequest {
    connection_id: String,
    room_id: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionRequest {
    connection_id: String,
}

/// Gateway disconnect event: `{ userId, connectionId }`, at-least-once.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisconnectRequest {
    user_id: String,
    connection_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyRequest {
    user_id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Start the control endpoint.
pub async fn start_http(
    bind: &str,
    service: Arc<PresenceService>,
    log_handle: Option<LogHandle>,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind control endpoint on {bind}"))?;
    tracing::info!("control endpoint listening on {}", bind);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _addr)) => {
                    let service = service.clone();
                    let log_handle = log_handle.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_conn(&mut socket, service, log_handle).await {
                            tracing::warn!("control handler error: {err:?}");
                        }
                    });
                }
                Err(err) => {
                    tracing::warn!("control accept error: {err:?}");
                }
            }
        }
    });
    Ok(())
}

async fn handle_conn(
    socket: &mut tokio::net::TcpStream,
    service: Arc<PresenceService>,
    log_handle: Option<LogHandle>,
) -> Result<()> {
    let mut buf = [0u8; 8192];
    let n = socket.read(&mut buf).await?;
    let req = String::from_utf8_lossy(&buf[..n]);
    let first = req.lines().next().unwrap_or("");
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or("GET");
    let target = parts.next().unwrap_or("/");
    let (route, query) = target.split_once('?').unwrap_or((target, ""));
    let body = req.split_once("\r\n\r\n").map_or("", |(_, b)| b);

    let (status, body) = route_request(method, route, query, body, &service, log_handle.as_ref());
    let resp = format!(
        "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    socket.write_all(resp.as_bytes()).await?;
    Ok(())
}

/// Dispatch one control request. Factored out of the socket handler so tests
/// can drive routes directly.
pub(crate) fn route_request(
    method: &str,
    route: &str,
    query: &str,
    body: &str,
    service: &Arc<PresenceService>,
    log_handle: Option<&LogHandle>,
) -> (u16, String) {
    match (method, route) {
        ("GET", "/healthz") => (200, r#"{"status":"ok"}"#.to_string()),
        ("GET", "/metrics") => match serde_json::to_string(&service.metrics.snapshot()) {
            Ok(body) => (200, body),
            Err(err) => (500, error_body(&err.to_string())),
        },
        ("GET", "/presence") => {
            let room_id = query_param(query, "roomId");
            let user_id = query_param(query, "userId");
            let (Some(room_id), Some(user_id)) = (room_id, user_id) else {
                return (400, error_body("roomId and userId are required"));
            };
            match service.store.get(&room_id, &user_id) {
                Ok(Some(record)) => match serde_json::to_string(&record) {
                    Ok(body) => (200, body),
                    Err(err) => (500, error_body(&err.to_string())),
                },
                Ok(None) => (404, error_body("no presence record")),
                Err(err) => (503, error_body(&err.to_string())),
            }
        }
        ("POST", "/sweep") => {
            let inactive_minutes = query_param(query, "inactive_minutes")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or_else(|| service.default_inactive_minutes());
            if inactive_minutes == 0 {
                return (400, error_body("inactive_minutes must be > 0"));
            }
            match service.sweeper.sweep(inactive_minutes) {
                Ok(report) => {
                    let body = serde_json::json!({
                        "count": report.count(),
                        "transitioned": report.transitioned,
                    });
                    (200, body.to_string())
                }
                Err(err) => (503, error_body(&err.to_string())),
            }
        }
        ("POST", "/attach") => match serde_json::from_str::<AttachRequest>(body) {
            Ok(req) => {
                match service
                    .registry
                    .attach(&req.connection_id, &req.room_id, &req.user_id)
                {
                    Ok(()) => (200, r#"{"status":"attached"}"#.to_string()),
                    Err(err) => (503, error_body(&err.to_string())),
                }
            }
            Err(err) => (400, error_body(&err.to_string())),
        },
        ("POST", "/detach") => match serde_json::from_str::<ConnectionRequest>(body) {
            Ok(req) => match service.registry.detach(&req.connection_id) {
                Ok(outcome) => (200, detach_body(outcome)),
                Err(err) => (503, error_body(&err.to_string())),
            },
            Err(err) => (400, error_body(&err.to_string())),
        },
        ("POST", "/touch") => match serde_json::from_str::<ConnectionRequest>(body) {
            Ok(req) => match service.registry.touch(&req.connection_id) {
                Ok(known) => (
                    200,
                    format!(r#"{{"status":"ok","known":{known}}}"#),
                ),
                Err(err) => (503, error_body(&err.to_string())),
            },
            Err(err) => (400, error_body(&err.to_string())),
        },
        ("POST", "/disconnect") => match serde_json::from_str::<DisconnectRequest>(body) {
            Ok(req) => {
                match service
                    .registry
                    .handle_disconnect(&req.user_id, &req.connection_id)
                {
                    Ok(outcome) => (200, detach_body(outcome)),
                    Err(err) => (503, error_body(&err.to_string())),
                }
            }
            Err(err) => (400, error_body(&err.to_string())),
        },
        ("POST", "/notify") => match serde_json::from_str::<NotifyRequest>(body) {
            Ok(req) => {
                let notification = service.create_notification(&req.user_id, &req.kind, req.data);
                match serde_json::to_string(&notification) {
                    Ok(body) => (200, body),
                    Err(err) => (500, error_body(&err.to_string())),
                }
            }
            Err(err) => (400, error_body(&err.to_string())),
        },
        ("PUT", "/loglevel") => {
            let Some(handle) = log_handle else {
                return (503, error_body("log level reload unavailable"));
            };
            let Some(level) = query_param(query, "level") else {
                return (400, error_body("level query parameter is required"));
            };
            match EnvFilter::try_new(&level) {
                Ok(filter) => {
                    let _ = handle.modify(|f| *f = filter);
                    (200, r#"{"status":"ok"}"#.to_string())
                }
                Err(_) => (400, error_body("invalid level")),
            }
        }
        _ => (404, error_body("not found")),
    }
}

fn detach_body(outcome: DetachOutcome) -> String {
    match outcome {
        DetachOutcome::Remaining(n) => {
            format!(r#"{{"status":"detached","remainingConnections":{n}}}"#)
        }
        DetachOutcome::ReachedZero => {
            r#"{"status":"detached","remainingConnections":0}"#.to_string()
        }
        DetachOutcome::Unknown => r#"{"status":"ignored"}"#.to_string(),
    }
}

fn error_body(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}
