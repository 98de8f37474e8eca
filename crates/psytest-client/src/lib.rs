//! psytest-client — Collaborators for the session engine.
//!
//! Implements `QuestionSource` and `SubmissionEndpoint` over HTTP, loads
//! client configuration, and ships a mock backend for tests.

pub mod config;
pub mod error;
pub mod http;
pub mod mock;

pub use config::{load_config, load_config_from, ApiConfig, PsytestConfig, StorageConfig};
pub use http::HttpBackend;
pub use mock::MockBackend;
