//! HTTP API: thin wrapper around the session controller.

pub mod logs;
pub mod server;
pub mod types;
