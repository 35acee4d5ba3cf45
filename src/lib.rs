//! # OpenAlex MCP
//!
//! A Model Context Protocol (MCP) server that translates tool calls into
//! OpenAlex API requests and normalizes the answers.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`query`]: Filter compilation, identifier classification and request descriptors
//! - [`client`]: Search, query, fetch and batch operations, cursor traversal
//! - [`transport`]: HTTP and mock transports, with rate limiting and retries layered on top
//! - [`models`]: Entity kinds, provider payloads and normalized records
//! - [`mcp`]: MCP tool registry and server
//! - [`utils`]: Token bucket, retry with backoff, circuit breaker
//! - [`config`]: Configuration management
//! - [`error`]: Error taxonomy and caller-facing envelopes

pub mod client;
pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
pub mod query;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use client::{OpenAlexClient, QueryParams, QueryResult, SearchParams};
pub use error::{ApiError, ErrorEnvelope, ErrorKind};
pub use models::{EntityKind, NormalizedRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
