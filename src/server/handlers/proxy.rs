use crate::{
    dash::rewriter,
    error::{HelmsmanError, Result},
    metrics,
    server::state::AppState,
};
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Deadline for one proxied transfer
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Relaxed deadline while an operator is seeding content (SetupMode)
const SETUP_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Forward any GET to the upstream gateway, timing the transfer.
///
/// Manifest responses (basename containing `.mpd`) pass through the
/// bandwidth rewriter. Segment responses feed the requesting client's
/// throughput estimate and the stream's cached-segment inventory; requests
/// that hit the deadline update neither.
pub async fn proxy_request(State(state): State<AppState>, req: Request) -> Result<Response> {
    if req.method() != Method::GET {
        metrics::record_request("proxy", 405);
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }

    let fullpath = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let (stream_key, basename) = split_path(&fullpath);
    let client_id = req
        .headers()
        .get("clientID")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    state.throughput.ensure(&client_id);

    let is_manifest = basename.contains(".mpd");
    let endpoint = if is_manifest { "manifest" } else { "proxy" };

    info!(path = %fullpath, client = %client_id, "proxying request");

    let mut forwarded = req.headers().clone();
    // force fresh bodies: a 304 carries nothing to time or rewrite
    forwarded.remove(header::IF_MODIFIED_SINCE);
    forwarded.remove(header::IF_NONE_MATCH);
    forwarded.remove(header::HOST);
    forwarded.remove(header::CONNECTION);
    if is_manifest {
        // the rewriter needs an identity body to decode
        forwarded.remove(header::ACCEPT_ENCODING);
    }

    let mut upstream_url = state.config.upstream.clone();
    upstream_url.set_path(&fullpath);
    upstream_url.set_query(query.as_deref());

    let deadline = if state.controls.setup_mode() {
        SETUP_REQUEST_TIMEOUT
    } else {
        REQUEST_TIMEOUT
    };

    let fetch = async {
        let response = state
            .http_client
            .get(upstream_url)
            .headers(forwarded)
            .send()
            .await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, headers, body))
    };

    let started = Instant::now();
    let (status, upstream_headers, body) = match tokio::time::timeout(deadline, fetch).await {
        Ok(Ok(parts)) => parts,
        Ok(Err(e)) => {
            metrics::record_upstream_error();
            metrics::record_request(endpoint, 502);
            return Err(HelmsmanError::UpstreamFetch(e));
        }
        Err(_) => {
            warn!(path = %fullpath, "transfer exceeded {}s deadline", deadline.as_secs());
            metrics::record_timeout();
            metrics::record_request(endpoint, 504);
            return Err(HelmsmanError::UpstreamTimeout);
        }
    };
    // the body is fully buffered, so the clock covers the whole transfer
    let elapsed = started.elapsed();

    let response = if is_manifest {
        if status != StatusCode::OK {
            warn!(%status, path = %fullpath, "upstream manifest response");
        }
        manifest_response(&state, stream_key, &client_id, status, &upstream_headers, body)
    } else {
        if let Some(stream) = state.streams.get(stream_key) {
            if let Some((segment, quality)) = stream.templates.parse_segment(basename) {
                if let Some(is_cached) =
                    state
                        .throughput
                        .record(&client_id, body.len() as u64, elapsed)
                {
                    metrics::record_classification(is_cached);
                }
                stream.inventory.add_record(segment, quality, &client_id);
            }
        }
        proxied_response(status, &upstream_headers, body)
    };

    metrics::record_request(endpoint, status.as_u16());
    metrics::record_duration(endpoint, started);

    Ok(response)
}

/// Rewrite a manifest body, falling back to the origin bytes when the
/// document does not decode or re-encode.
fn manifest_response(
    state: &AppState,
    stream_key: &str,
    client_id: &str,
    status: StatusCode,
    upstream_headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let client = state.throughput.snapshot(client_id);
    let policy_name = state.controls.policy();

    let rewritten = std::str::from_utf8(&body).ok().and_then(|xml| {
        match rewriter::rewrite_manifest(
            xml,
            &state.streams,
            stream_key,
            client_id,
            &client,
            &policy_name,
        ) {
            Ok(xml) => Some(xml),
            Err(e) => {
                warn!("manifest rewrite failed, passing origin body through: {}", e);
                None
            }
        }
    });

    match rewritten {
        Some(xml) => {
            let mut response = proxied_response(status, upstream_headers, Bytes::from(xml));
            let headers = response.headers_mut();
            headers.insert(header::LAST_MODIFIED, http_date_now());
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        None => proxied_response(status, upstream_headers, body),
    }
}

/// Build a client response from upstream parts.
///
/// Hop-by-hop headers are dropped, the length reflects the body actually
/// sent, and `Connection: close` keeps measured transfers off reused
/// connections.
fn proxied_response(status: StatusCode, upstream_headers: &HeaderMap, body: Bytes) -> Response {
    let length = body.len();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    *headers = upstream_headers.clone();
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

    response
}

/// Split a request path into its stream key (directory) and basename.
fn split_path(fullpath: &str) -> (&str, &str) {
    match fullpath.rsplit_once('/') {
        Some(("", basename)) => ("/", basename),
        Some((dir, basename)) => (dir, basename),
        None => ("", fullpath),
    }
}

/// Current time as an RFC 1123 HTTP date
fn http_date_now() -> HeaderValue {
    let stamp = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    HeaderValue::from_str(&stamp)
        .unwrap_or_else(|_| HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"))
}
