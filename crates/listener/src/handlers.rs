//! Front-door route handlers
//!
//! The write path validates query parameters, inflates gzip bodies,
//! parses the line-protocol payload into a batch and hands it to the
//! backend. Everything else is a thin status or rejection handler.

use std::io::Read;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use sir_protocol::Batch;

use crate::ListenerState;
use crate::response::json_error;

/// Query parameters of `POST /write`
#[derive(Debug, Deserialize)]
pub(crate) struct WriteParams {
    db: Option<String>,
    rp: Option<String>,
    precision: Option<String>,
}

/// `GET|HEAD /ping`
pub(crate) async fn ping() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `GET /status` - the fleet's alias -> status document
pub(crate) async fn status(State(state): State<Arc<ListenerState>>) -> Response {
    let body = match &state.backend {
        Some(backend) => backend.status(),
        None => "{}".to_string(),
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// `/query` - not relayed
pub(crate) async fn query() -> Response {
    json_error(StatusCode::FORBIDDEN, "query relaying is disabled")
}

/// Fallback for unknown paths and methods
pub(crate) async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "invalid endpoint")
}

/// `POST /write?db=<name>&rp=<policy>&precision=<unit>`
pub(crate) async fn write(
    State(state): State<Arc<ListenerState>>,
    Query(params): Query<WriteParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let database = match params.db.as_deref() {
        Some(db) if !db.is_empty() => db,
        _ => return json_error(StatusCode::BAD_REQUEST, "missing parameter: db"),
    };
    let precision = match params.precision.as_deref() {
        Some(precision) if !precision.is_empty() => precision,
        _ => return json_error(StatusCode::BAD_REQUEST, "missing parameter: precision"),
    };
    let retention_policy = match params.rp.as_deref() {
        Some(rp) if !rp.is_empty() => rp,
        _ => &state.default_retention_policy,
    };

    let text = match decode_body(&headers, &body) {
        Ok(text) => text,
        Err(response) => return *response,
    };

    let batch = match Batch::parse_lines(database, retention_policy, precision, &text) {
        Ok(batch) => batch,
        Err(e) => {
            return json_error(StatusCode::BAD_REQUEST, format!("failed parsing points: {e}"));
        }
    };

    if state.debug {
        tracing::debug!(
            database,
            points = batch.num_points(),
            bytes = body.len(),
            "accepted write"
        );
    }

    if let Some(backend) = &state.backend {
        if let Err(e) = backend.post(&batch).await {
            let status = if e.is_unavailable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            return json_error(status, e.to_string());
        }
    }

    StatusCode::NO_CONTENT.into_response()
}

/// Inflate a gzip body when the request says so, then require UTF-8
fn decode_body(headers: &HeaderMap, body: &Bytes) -> Result<String, Box<Response>> {
    let is_gzip = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|encoding| encoding.eq_ignore_ascii_case("gzip"));

    if is_gzip {
        let mut text = String::new();
        let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
        decoder.read_to_string(&mut text).map_err(|_| {
            Box::new(json_error(
                StatusCode::BAD_REQUEST,
                "unable to decode gzip body",
            ))
        })?;
        return Ok(text);
    }

    String::from_utf8(body.to_vec()).map_err(|_| {
        Box::new(json_error(
            StatusCode::BAD_REQUEST,
            "body is not valid UTF-8",
        ))
    })
}
