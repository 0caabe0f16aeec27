//! HTTP boundary
//!
//! Thin axum layer over [`Gateway`](crate::Gateway): routes translate
//! requests into gateway calls and map errors onto status codes.

pub mod config;
pub mod error;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use error::ApiError;
pub use listener::GatewayServer;
pub use routes::router;
