//! Flagline daemon library
//!
//! Core components of `ctfd`:
//! - REST and SSE handlers over the scoring engine
//! - Layered configuration
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
