use std::sync::Arc;

use serde::Serialize;

use crate::db::Store;
use crate::registry::CancelRegistry;
use crate::scheduler::ScanLauncher;

pub mod health;
pub mod routes;
pub mod scan;
pub mod schedule;

/// Shared handler state. Everything is behind an `Arc` so cloning per
/// request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<CancelRegistry>,
    pub launcher: Arc<dyn ScanLauncher>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<CancelRegistry>,
        launcher: Arc<dyn ScanLauncher>,
    ) -> Self {
        Self {
            store,
            registry,
            launcher,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
