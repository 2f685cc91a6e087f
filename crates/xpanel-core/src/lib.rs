//! Xpanel Core Library
//!
//! Keeps the proxy engine's advanced-settings document and the panel's
//! database-managed inbounds and outbounds in agreement, so that edits made
//! through either channel never overwrite or orphan the other's entries.

pub mod config;
pub mod context;
pub mod document;
pub mod model;
pub mod reconcile;
pub mod services;
pub mod store;
pub mod types;
pub mod validate;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::PanelConfig;
    pub use crate::context::AppContext;

    // Documents
    pub use crate::document::{ConfigDocument, ConfigEntry, DocumentError, Field};

    // Records
    pub use crate::model::{Inbound, ManagedRecord, Outbound};

    // Reconciliation
    pub use crate::reconcile::{ApplyReport, DemotedEntry, ReconcileError, Reconciler, SyncReport};

    // Storage
    pub use crate::store::{PanelStore, RecordStore, StoreError, TemplateStore, Transaction};

    // Services
    pub use crate::services::{InboundService, OutboundService, ServiceError};

    // Validation
    pub use crate::validate::{ConfigInvalid, ConfigValidator, EngineValidator};

    pub use crate::types::ResourceKind;
}
