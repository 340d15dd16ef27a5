// Process-wide state shared read-only by every session.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::DaemonConfig;
use crate::sandbox::PathSandbox;
use crate::search::{ProcessCollaborator, SearchAdapter, SearchCollaborator, SearchLimits};
use crate::security::ensure_private_dir;
use crate::store::{DocumentStore, StagingArea};

pub struct DaemonContext {
    pub config: Arc<DaemonConfig>,
    pub sandbox: PathSandbox,
    pub store: DocumentStore,
    pub search: SearchAdapter,
}

impl DaemonContext {
    /// Build the context with the production search pipeline.
    pub fn from_config(config: DaemonConfig) -> Result<Self> {
        let collaborator = Arc::new(ProcessCollaborator::from_config(&config.search));
        Self::new(config, collaborator)
    }

    /// Build the context with an injected search collaborator. Creates the
    /// staging directory with owner-only permissions.
    pub fn new(config: DaemonConfig, collaborator: Arc<dyn SearchCollaborator>) -> Result<Self> {
        if !config.root.is_dir() {
            bail!("document root `{}` is not a directory", config.root.display());
        }

        let staging_dir = config.staging_dir();
        ensure_private_dir(&staging_dir).context("failed to prepare staging directory")?;

        let sandbox = PathSandbox::new(&config.root)
            .context("failed to resolve document root")?
            .with_reserved(&staging_dir);
        let store = DocumentStore::new(config.document.format(), StagingArea::new(staging_dir));
        let search = SearchAdapter::new(collaborator, SearchLimits::from(&config.search));

        Ok(Self { config: Arc::new(config), sandbox, store, search })
    }

    pub fn editing_enabled(&self) -> bool {
        self.config.editing.enabled
    }
}
