pub mod clear;
pub mod init;
pub mod input;
pub mod render;
pub mod sessions;
pub mod status;
pub mod submit;
pub mod take;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use psytest_client::config::{load_config_from, PsytestConfig};
use psytest_client::HttpBackend;
use psytest_core::clock::SystemClock;
use psytest_core::model::TestKind;
use psytest_core::session::Session;
use psytest_store::FileMirror;

/// Configuration plus the collaborators built from it.
pub struct SessionContext {
    pub config: PsytestConfig,
    pub backend: Arc<HttpBackend>,
    pub mirror: Arc<FileMirror>,
}

impl SessionContext {
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = load_config_from(config_path)?;
        let backend = Arc::new(HttpBackend::new(&config.api)?);
        let mirror = Arc::new(open_mirror(&config)?);
        Ok(Self {
            config,
            backend,
            mirror,
        })
    }

    /// Fetch the session for `token` from the server and restore local answers.
    pub async fn load_session(&self, kind: TestKind, token: &str) -> Result<Session> {
        Session::load(
            kind,
            token,
            self.backend.as_ref(),
            self.mirror.clone(),
            Arc::new(SystemClock),
        )
        .await
        .with_context(|| format!("failed to load {kind} session"))
    }
}

pub fn open_mirror(config: &PsytestConfig) -> Result<FileMirror> {
    FileMirror::open(&config.storage.dir).with_context(|| {
        format!(
            "failed to open storage directory {}",
            config.storage.dir.display()
        )
    })
}
