//! DocShare Server
//!
//! Document sharing backend: accounts, uploads with per-user storage quotas,
//! public search, bookmarks, access statistics and an activity log.
//!
//! The binary lives in `main.rs`; the router is exposed here so it can be
//! driven directly by integration tests.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod state;
pub mod storage;

pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
