use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{debug_handler, Json};
use bytes::Bytes;
use tracing::instrument;

use crate::api::errors::FlagError;
use crate::metrics_consts::FLAG_LOOKUPS_COUNTER;
use crate::metrics_utils::inc;
use crate::request_handler::{outcome_label, process_request};
use crate::router;

/// Market flag lookup endpoint.
///
/// Takes `{"Market": "<market>"}` and answers with that market's flag as JSON. Preflight
/// requests get an empty 204; CORS headers are added by the router for every response.
#[instrument(skip_all, fields(method, user_agent, content_type))]
#[debug_handler]
pub async fn flags(
    state: State<router::State>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, FlagError> {
    let user_agent = headers
        .get("user-agent")
        .map_or("unknown", |v| v.to_str().unwrap_or("unknown"));
    let content_type = headers
        .get("content-type")
        .map_or("unknown", |v| v.to_str().unwrap_or("unknown"));

    tracing::Span::current().record("method", method.as_str());
    tracing::Span::current().record("user_agent", user_agent);
    tracing::Span::current().record("content_type", content_type);

    if method == Method::OPTIONS {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let result = process_request(&state.flag_store, body).await;

    inc(
        FLAG_LOOKUPS_COUNTER,
        &[("outcome".to_string(), outcome_label(&result).to_string())],
        1,
    );

    let flag = result?;
    Ok(Json(flag).into_response())
}
