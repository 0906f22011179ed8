use std::{future::ready, sync::Arc};

use axum::{
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderValue, StatusCode,
    },
    routing::{any, get},
    Router,
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::{
    api::endpoint,
    config::Config,
    flags::flag_store::FlagStoreLoader,
    metrics_utils::{setup_metrics_recorder, track_metrics},
};

pub const ALLOWED_METHODS: &str = "POST, GET, OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type";

#[derive(Clone)]
pub struct State {
    pub flag_store: Arc<FlagStoreLoader>,
}

pub fn router(flag_store: Arc<FlagStoreLoader>, config: Config) -> Router {
    let state = State {
        flag_store: flag_store.clone(),
    };

    // liveness/readiness checks
    let status_router = Router::new()
        .route("/_liveness", get(|| ready("ok")))
        .route("/_readiness", get(move || readiness(flag_store.clone())));

    // flags endpoint, served at the root as well for clients that call the bare host.
    // One semaphore covers all three paths.
    let flags_router = Router::new()
        .route("/", any(endpoint::flags))
        .route("/flags", any(endpoint::flags))
        .route("/flags/", any(endpoint::flags))
        .layer(GlobalConcurrencyLimitLayer::new(config.max_concurrency));

    let mut router = Router::new().merge(status_router).merge(flags_router);

    // Don't install metrics unless asked to
    // Global metrics recorders can play poorly with e.g. tests
    if *config.enable_metrics {
        match setup_metrics_recorder() {
            Ok(recorder_handle) => {
                router = router.route("/metrics", get(move || ready(recorder_handle.render())));
            }
            Err(e) => tracing::error!("failed to install metrics recorder: {}", e),
        }
    }

    // Headers are overridden on the way out, so every response carries them, errors included.
    router
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            config.access_control_allow_origin.0.clone(),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state)
}

pub async fn readiness(
    flag_store: Arc<FlagStoreLoader>,
) -> Result<&'static str, (StatusCode, &'static str)> {
    flag_store.probe().await.map_err(|e| {
        tracing::warn!("readiness probe failed: {}", e);
        (StatusCode::SERVICE_UNAVAILABLE, "flag store unavailable")
    })?;

    Ok("ready")
}
