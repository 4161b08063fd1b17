//! Shared application state for API handlers

use caseflow_engine::{AuditTrail, LifecycleManager, WorkflowQueries};
use caseflow_store::{CaseflowStore, TemplateStore, UserDirectory};
use std::sync::Arc;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub queries: Arc<WorkflowQueries>,
    pub audit: Arc<AuditTrail>,
    pub templates: Arc<dyn TemplateStore>,
    pub directory: Arc<dyn UserDirectory>,
}

impl AppState {
    /// Wire every component against one store implementation.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: CaseflowStore + 'static,
    {
        Self {
            lifecycle: Arc::new(LifecycleManager::from_store(store.clone())),
            queries: Arc::new(WorkflowQueries::new(
                store.clone(),
                store.clone(),
                store.clone(),
            )),
            audit: Arc::new(AuditTrail::new(store.clone())),
            templates: store.clone(),
            directory: store,
        }
    }
}
