//! psytest-store — Durable answer mirrors on the local filesystem.

pub mod file;

pub use file::{FileMirror, StoredSession};
