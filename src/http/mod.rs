//! HTTP and WebSocket surface of the relay

pub mod routes;
pub mod ws;

pub use routes::{create_router, ApiError, HttpServer, HttpServerConfig, HttpState};
pub use ws::run_ws_session;
