//! Storage module for uploaded document files
//!
//! Files live on local disk under the configured upload directory and are
//! exposed read-only at `/uploads/*`.

mod local;

pub use local::{FileStore, StoredFile, UPLOADS_URL_PREFIX};
