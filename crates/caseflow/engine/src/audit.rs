//! Audit trail: the read surface over append-only history.
//!
//! Records are written only inside lifecycle commits; this component
//! exposes the query paths and a path-reconstruction check for the
//! unbroken-chain invariant.

use caseflow_store::HistoryStore;
use caseflow_types::{EngineError, EngineResult, InstanceId, StepId, UserId, WorkflowHistory};
use std::sync::Arc;

/// Query surface over workflow history
pub struct AuditTrail {
    history: Arc<dyn HistoryStore>,
}

impl AuditTrail {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self { history }
    }

    /// History for one instance in chronological order
    pub async fn for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> EngineResult<Vec<WorkflowHistory>> {
        Ok(self.history.history_for_instance(instance_id).await?)
    }

    /// All records performed by one user, newest first
    pub async fn by_performer(&self, user: &UserId) -> EngineResult<Vec<WorkflowHistory>> {
        Ok(self.history.history_by_performer(user).await?)
    }

    /// All records for one action name, newest first
    pub async fn by_action(&self, action: &str) -> EngineResult<Vec<WorkflowHistory>> {
        Ok(self.history.history_by_action(action).await?)
    }

    /// Reconstruct the step path of an instance from its history.
    ///
    /// Verifies the chain invariant: each entry's `to_step` must equal the
    /// next entry's `from_step`. Quorum entries collapse into the step
    /// they were recorded on. A gap means the audit trail was corrupted
    /// and is reported as a validation error.
    pub async fn path_for_instance(&self, instance_id: &InstanceId) -> EngineResult<Vec<StepId>> {
        let entries = self.history.history_for_instance(instance_id).await?;
        let mut path: Vec<StepId> = Vec::new();

        for entry in &entries {
            match (&entry.from_step, path.last()) {
                // First entry opens the chain at its source step.
                (Some(from), None) => {
                    path.push(from.clone());
                }
                (None, None) => {}
                (Some(from), Some(last)) if from == last => {}
                (from, Some(last)) => {
                    return Err(EngineError::Validation(format!(
                        "history chain broken for instance {instance_id}: entry {} starts at \
                         {:?} but the path is at {last}",
                        entry.sequence, from
                    )));
                }
            }
            if path.last() != Some(&entry.to_step) {
                path.push(entry.to_step.clone());
            }
        }

        Ok(path)
    }
}
