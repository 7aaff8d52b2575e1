//! The HTTP front controller.
//!
//! One endpoint dispatches on the `serviceId` query parameter. A request
//! without an id gets the new-instance service (no session) or the default
//! service (live session); a request with an id but no live session gets the
//! session-expired service. The controller owns the caching-header policy
//! and the dispose-on-error rule: a server-side failure while handling a
//! session's request disposes that session's container instance rather than
//! letting a partially-mutated instance survive.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, warn};

use trellis_protocol::{Services, SyncError};

use crate::connection::{Connection, ServiceResponse};
use crate::registry::{ServerContext, SessionHandle, SESSION_COOKIE};

/// Builds the application router.
pub fn router(ctx: Arc<ServerContext>) -> Router {
    let body_limit = ctx.multipart.size_limit() + 64 * 1024;
    Router::new()
        .route("/app", get(dispatch).post(dispatch))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(ctx)
}

async fn dispatch(State(ctx): State<Arc<ServerContext>>, req: Request) -> Response {
    let query = match Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
        Ok(Query(query)) => query,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, err.to_string());
        }
    };
    let cookies = parse_cookies(req.headers());

    let session_key = cookies.get(SESSION_COOKIE).cloned();
    let session = session_key.as_deref().and_then(|key| ctx.sessions.get(key));
    let requested_id = query.get("serviceId").cloned();

    // The upload receiver consumes the request itself so the multipart body
    // streams through the configured strategy instead of being buffered.
    if requested_id.as_deref() == Some(Services::UPLOAD_RECEIVER) {
        return receive_upload(ctx, session, &query, req).await;
    }

    let service_id = match (&requested_id, &session) {
        (None, None) => Services::NEW_INSTANCE,
        (None, Some(_)) => Services::DEFAULT,
        (Some(_), None) => Services::SESSION_EXPIRED,
        (Some(id), Some(_)) => id.as_str(),
    };

    let body = match to_bytes(req.into_body(), usize::MAX).await {
        Ok(body) => body,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err.to_string()),
    };
    let conn = Connection {
        query,
        cookies,
        body,
    };

    let cacheable = ctx.services.is_cacheable(service_id).unwrap_or(false);
    let result = match ctx
        .services
        .dispatch(service_id, ctx.clone(), session.clone(), conn)
        .await
    {
        Some(result) => result,
        None => {
            warn!(service_id, "request for unknown service");
            return error_response(
                StatusCode::NOT_FOUND,
                format!("Service does not exist: {service_id}"),
            );
        }
    };

    match result {
        Ok(response) => build_response(response, cacheable, ctx.startup),
        Err(err) => {
            let status =
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                error!(%err, service_id, "service failed, disposing container instance");
                if let Some(handle) = session {
                    handle.lock().await.dispose();
                }
                if let Some(key) = session_key {
                    ctx.sessions.remove(&key);
                }
            }
            let body = match err {
                SyncError::SessionMissing => "Session Expired".to_string(),
                other => other.to_string(),
            };
            error_response(status, body)
        }
    }
}

async fn receive_upload(
    ctx: Arc<ServerContext>,
    session: Option<SessionHandle>,
    query: &HashMap<String, String>,
    req: Request,
) -> Response {
    let Some(session) = session else {
        return error_response(StatusCode::BAD_REQUEST, "Session Expired".to_string());
    };
    let Some(eid) = query.get("eid").cloned() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Upload target not specified.".to_string(),
        );
    };
    // Holding the session lock across the parse serializes uploads with the
    // session's synchronize requests, and pins the eid check to the same
    // tree the pending upload is recorded against.
    let instance = session.lock().await;
    if instance.tree().component_by_element_id(&eid).is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Upload target is not valid.".to_string(),
        );
    }
    let multipart = match Multipart::from_request(req, &()).await {
        Ok(multipart) => multipart,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err.to_string()),
    };
    match ctx.multipart.strategy().parse(multipart).await {
        Ok(upload) => {
            instance.transfers().set_pending_upload(&eid, upload);
            let back = format!("?serviceId={}&eid={eid}", Services::UPLOAD_FORM);
            build_response(ServiceResponse::redirect(back), false, ctx.startup)
        }
        Err(err) => {
            warn!(%err, element_id = %eid, "upload rejected");
            let status =
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(status, err.to_string())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Response assembly
// ─────────────────────────────────────────────────────────────────────────

fn build_response(
    response: ServiceResponse,
    cacheable: bool,
    startup: DateTime<Utc>,
) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = HeaderMap::new();
    set_header(&mut headers, "content-type", &response.content_type);
    apply_cache_policy(&mut headers, cacheable, startup);
    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        } else {
            warn!(header = name, "dropping malformed response header");
        }
    }
    for cookie in &response.cookies {
        let mut value = format!("{}={}; Path={}", cookie.name, cookie.value,
            cookie.path.as_deref().unwrap_or("/"));
        if let Some(max_age) = cookie.max_age {
            value.push_str(&format!("; Max-Age={max_age}"));
        }
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(_) => warn!(cookie = %cookie.name, "dropping malformed cookie"),
        }
    }
    (status, headers, response.body).into_response()
}

fn error_response(status: StatusCode, body: String) -> Response {
    let mut headers = HeaderMap::new();
    set_header(&mut headers, "content-type", "text/plain");
    apply_cache_policy(&mut headers, false, Utc::now());
    (status, headers, body).into_response()
}

/// Cacheable services get long-lived validators pinned to process startup;
/// everything else is aggressively marked uncacheable.
fn apply_cache_policy(headers: &mut HeaderMap, cacheable: bool, startup: DateTime<Utc>) {
    if cacheable {
        set_header(headers, "cache-control", "max-age=3600");
        set_header(headers, "expires", &http_date(Utc::now() + Duration::hours(24)));
        set_header(headers, "last-modified", &http_date(startup));
    } else {
        set_header(headers, "pragma", "no-cache");
        set_header(headers, "cache-control", "no-store");
        set_header(headers, "expires", "0");
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }
    cookies
}
