//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::PanelConfig;
use crate::document::{self, ConfigDocument};
use crate::reconcile::Reconciler;
use crate::services::{InboundService, OutboundService};
use crate::store::PanelStore;

/// Shared services and resolved paths.
///
/// Frontends create this once from a [`PanelConfig`] and pass it to commands.
#[derive(Debug, Clone)]
pub struct AppContext {
    data_dir: PathBuf,
    database_path: PathBuf,
    store: Arc<PanelStore>,
    default_template: ConfigDocument,
}

impl AppContext {
    /// Resolve paths from `config` and open the file-backed store.
    pub fn from_config(config: &PanelConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = config.resolved_data_dir()?;
        let database_path = config.database_path()?;
        let default_template = match &config.default_template {
            Some(path) => load_template_file(path)?,
            None => document::default_template().context("Built-in template is invalid")?,
        };

        Ok(Self {
            store: Arc::new(PanelStore::open(database_path.clone())),
            data_dir,
            database_path,
            default_template,
        })
    }

    /// Context over an in-memory store (for testing).
    pub fn in_memory(default_template: ConfigDocument) -> Self {
        Self {
            data_dir: PathBuf::new(),
            database_path: PathBuf::new(),
            store: Arc::new(PanelStore::in_memory()),
            default_template,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn store(&self) -> &Arc<PanelStore> {
        &self.store
    }

    pub fn default_template(&self) -> &ConfigDocument {
        &self.default_template
    }

    /// Get a Reconciler over the shared store.
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::with_template(Arc::clone(&self.store), self.default_template.clone())
    }

    /// Get an OutboundService.
    pub fn outbound_service(&self) -> OutboundService {
        OutboundService::new(Arc::clone(&self.store), self.default_template.clone())
    }

    /// Get an InboundService.
    pub fn inbound_service(&self) -> InboundService {
        InboundService::new(Arc::clone(&self.store))
    }
}

fn load_template_file(path: &Path) -> Result<ConfigDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template file: {}", path.display()))?;
    document::decode(&text)
        .with_context(|| format!("Failed to parse template file: {}", path.display()))
}
