//! # Data Retrieval Module
//!
//! HTTP-side access to the EcoVerse backend.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: a generic `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, with automatic retries and exponential backoff.
//!   Both the degraded-mode poller and the REST client sit on top of it.
//! - **`dashboard_api`**: typed wrappers for the dashboard's REST endpoints.
//! - **`endpoint`**: derivation of the stream URL from the REST base URL.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Typed dashboard REST endpoints.
pub mod dashboard_api;
/// REST base URL to stream URL mapping.
pub mod endpoint;
/// Generic HTTP API client with retry middleware.
pub mod ky_http;

pub use dashboard_api::{DashboardApi, DataRange};
pub use endpoint::stream_url_from_api_base;
pub use ky_http::{ApiClient, ApiResponse};
