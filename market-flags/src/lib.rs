pub mod api;
pub mod config;
pub mod flags;
pub mod metrics_consts;
pub mod metrics_utils;
pub mod request_handler;
pub mod router;
pub mod server;

// Public so the integration tests under tests/ can share the mock clients.
pub mod test_utils;
