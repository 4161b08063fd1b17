//! Instance lifecycle: the central state machine.
//!
//! Every mutation of an instance flows through here. The manager loads
//! current state, validates permission and transition legality against the
//! template graph, then hands the store one [`TransitionCommit`] carrying
//! all dependent writes. A lost optimistic-version race is re-read and
//! reported as the state the winner produced (`AlreadyClosed` or
//! `InvalidAction`); a caller can never observe a half-applied action.

use crate::dispatcher::TaskDispatcher;
use caseflow_store::{
    HistoryAppend, HistoryStore, InstanceStore, InstanceWrite, StorageError, TaskClose,
    TaskStore, TemplateStore, TransitionCommit, UserDirectory,
};
use caseflow_types::{
    AssignedTask, EngineError, EngineResult, InstanceId, InstanceStatus, Priority, StepOutcome,
    TaskDetails, TransitionCondition, UserId, WorkflowInstance, WorkflowStep, WorkflowTemplate,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// The action every template must define out of its initial step
pub const SUBMIT_ACTION: &str = "submit";
/// Action name recorded for explicit cancellation
pub const CANCEL_ACTION: &str = "cancel";

/// Result of a processed action
#[derive(Clone, Debug)]
pub enum ActionOutcome {
    /// The instance moved to a non-final step
    Advanced(WorkflowInstance),
    /// The instance reached a final step and closed
    Completed(WorkflowInstance),
    /// The vote was recorded but the step's quorum is not met yet
    QuorumPending {
        instance: WorkflowInstance,
        approvals_recorded: u32,
        approvals_required: u32,
    },
}

impl ActionOutcome {
    pub fn instance(&self) -> &WorkflowInstance {
        match self {
            Self::Advanced(instance) | Self::Completed(instance) => instance,
            Self::QuorumPending { instance, .. } => instance,
        }
    }
}

/// Creates and advances workflow instances
pub struct LifecycleManager {
    templates: Arc<dyn TemplateStore>,
    instances: Arc<dyn InstanceStore>,
    tasks: Arc<dyn TaskStore>,
    history: Arc<dyn HistoryStore>,
    directory: Arc<dyn UserDirectory>,
    dispatcher: TaskDispatcher,
}

impl LifecycleManager {
    /// Build a manager from individually injected store capabilities
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        instances: Arc<dyn InstanceStore>,
        tasks: Arc<dyn TaskStore>,
        history: Arc<dyn HistoryStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let dispatcher = TaskDispatcher::new(directory.clone(), tasks.clone());
        Self {
            templates,
            instances,
            tasks,
            history,
            directory,
            dispatcher,
        }
    }

    /// Build a manager from one store implementing every capability
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: caseflow_store::CaseflowStore + 'static,
    {
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
        )
    }

    // ── Initiation ───────────────────────────────────────────────────

    /// Start a new case from the template identified by `template_key`
    /// (a `workflow_type` first, a template name second).
    ///
    /// The instance lands on the target of the initial step's "submit"
    /// transition. Instance, first task, and the "submit" history entry
    /// commit together; any failure leaves nothing behind.
    pub async fn initiate_workflow(
        &self,
        template_key: &str,
        details: TaskDetails,
        initiator: UserId,
        priority: Priority,
        due_date: Option<DateTime<Utc>>,
    ) -> EngineResult<WorkflowInstance> {
        let template = self.resolve_template(template_key).await?;

        let initial = template.initial_step().ok_or_else(|| {
            EngineError::Configuration(format!("template {} has no initial step", template.id))
        })?;
        let submit = template
            .transition_for_action(&initial.id, SUBMIT_ACTION)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "template {} defines no '{SUBMIT_ACTION}' transition from its initial step",
                    template.id
                ))
            })?;
        let target = template.step(&submit.to_step).ok_or_else(|| {
            EngineError::Configuration(format!(
                "template {} transition targets unknown step {}",
                template.id, submit.to_step
            ))
        })?;

        let mut instance = WorkflowInstance::new(
            template.id.clone(),
            target.id.clone(),
            details,
            initiator.clone(),
        )
        .with_priority(priority);
        if let Some(due_date) = due_date {
            instance = instance.with_due_date(due_date);
        }
        if let Some(condition) = &submit.condition {
            if !condition_holds(condition, &instance) {
                return Err(EngineError::InvalidAction {
                    step: initial.id.clone(),
                    action: SUBMIT_ACTION.to_string(),
                });
            }
        }
        // Zero-step workflows are legal: the submit target may be final.
        instance.status = if target.is_final {
            terminal_status(target)
        } else {
            InstanceStatus::InProgress
        };

        let create_task = if target.is_final {
            None
        } else {
            let assignee = self
                .dispatcher
                .select_assignee(target, &instance.details, &[])
                .await?;
            Some(AssignedTask::new(
                instance.id.clone(),
                target.id.clone(),
                assignee,
            ))
        };

        let commit = TransitionCommit {
            history: HistoryAppend {
                instance_id: instance.id.clone(),
                from_step: Some(initial.id.clone()),
                to_step: target.id.clone(),
                action: SUBMIT_ACTION.to_string(),
                performed_by: initiator,
                comment: String::new(),
            },
            instance: InstanceWrite::Create(instance),
            close_task: None,
            create_task,
        };
        let written = self.instances.commit_transition(commit).await?;

        tracing::info!(
            instance_id = %written.id,
            template_id = %written.template_id,
            step = %written.current_step_id,
            "workflow instance initiated"
        );
        Ok(written)
    }

    // ── Action processing ────────────────────────────────────────────

    /// Process one action by one performer against an instance.
    pub async fn process_action(
        &self,
        instance_id: &InstanceId,
        action: &str,
        performer: &UserId,
        comment: &str,
    ) -> EngineResult<ActionOutcome> {
        let instance = self
            .instances
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(instance_id.clone()))?;
        if instance.is_terminal() {
            return Err(EngineError::AlreadyClosed(instance_id.clone()));
        }

        let template = self.template_of(&instance).await?;
        let step = template
            .step(&instance.current_step_id)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "instance {} sits on step {} unknown to template {}",
                    instance.id, instance.current_step_id, template.id
                ))
            })?
            .clone();

        let live_task = match self.tasks.open_task_for_instance(&instance.id).await? {
            Some(task) => task,
            // A concurrent action may have closed the task between our two
            // reads; report the winner's state, not a phantom corruption.
            None => {
                return Err(match self.instances.get_instance(&instance.id).await? {
                    Some(fresh) if fresh.is_terminal() => {
                        EngineError::AlreadyClosed(instance.id.clone())
                    }
                    Some(fresh) if fresh.version != instance.version => {
                        EngineError::InvalidAction {
                            step: fresh.current_step_id,
                            action: action.to_string(),
                        }
                    }
                    _ => EngineError::Configuration(format!(
                        "open instance {} has no live task",
                        instance.id
                    )),
                });
            }
        };

        self.check_permission(&step, performer, &live_task.assignee)
            .await?;

        let transition = template
            .transition_for_action(&step.id, action)
            .ok_or_else(|| EngineError::InvalidAction {
                step: step.id.clone(),
                action: action.to_string(),
            })?;
        if let Some(condition) = &transition.condition {
            if !condition_holds(condition, &instance) {
                return Err(EngineError::InvalidAction {
                    step: step.id.clone(),
                    action: action.to_string(),
                });
            }
        }
        let target = template
            .step(&transition.to_step)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "template {} transition targets unknown step {}",
                    template.id, transition.to_step
                ))
            })?
            .clone();

        // Quorum: a step requiring N approvals only transitions once N
        // distinct performers have recorded the action.
        let required = self.required_approvals(&step).await?;
        if required > 1 {
            let voters = self.quorum_voters(&instance, &step, action).await?;
            if voters.contains(performer) {
                return Err(EngineError::PermissionDenied {
                    user: performer.clone(),
                    step: step.id.clone(),
                });
            }
            let recorded = voters.len() as u32 + 1;
            if recorded < required {
                return self
                    .record_quorum_vote(
                        instance, step, live_task, voters, action, performer, comment, recorded,
                        required,
                    )
                    .await;
            }
        }

        // Quorum met (or not required): fire the transition.
        let new_status = if target.is_final {
            terminal_status(&target)
        } else {
            InstanceStatus::InProgress
        };
        let create_task = if target.is_final {
            None
        } else {
            let assignee = self
                .dispatcher
                .select_assignee(&target, &instance.details, &[])
                .await?;
            Some(AssignedTask::new(
                instance.id.clone(),
                target.id.clone(),
                assignee,
            ))
        };

        let commit = TransitionCommit {
            instance: InstanceWrite::Advance {
                instance_id: instance.id.clone(),
                expected_version: instance.version,
                new_step: target.id.clone(),
                new_status,
                closes: target.is_final,
            },
            close_task: Some(TaskClose::Complete(live_task.id)),
            create_task,
            history: HistoryAppend {
                instance_id: instance.id.clone(),
                from_step: Some(step.id.clone()),
                to_step: target.id.clone(),
                action: action.to_string(),
                performed_by: performer.clone(),
                comment: comment.to_string(),
            },
        };
        let written = self.commit_guarded(commit, instance_id, action).await?;

        tracing::info!(
            instance_id = %written.id,
            action,
            performer = %performer,
            from = %step.id,
            to = %target.id,
            "workflow action processed"
        );
        Ok(if target.is_final {
            ActionOutcome::Completed(written)
        } else {
            ActionOutcome::Advanced(written)
        })
    }

    // ── Cancellation ─────────────────────────────────────────────────

    /// Cancel an open instance. Only the case creator may cancel.
    /// Cancellation is absorbing: every later action fails `AlreadyClosed`.
    pub async fn cancel_instance(
        &self,
        instance_id: &InstanceId,
        performer: &UserId,
        reason: &str,
    ) -> EngineResult<WorkflowInstance> {
        let instance = self
            .instances
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(instance_id.clone()))?;
        if instance.is_terminal() {
            return Err(EngineError::AlreadyClosed(instance_id.clone()));
        }
        if &instance.created_by != performer {
            return Err(EngineError::PermissionDenied {
                user: performer.clone(),
                step: instance.current_step_id.clone(),
            });
        }

        let live_task = self.tasks.open_task_for_instance(&instance.id).await?;
        let commit = TransitionCommit {
            instance: InstanceWrite::Advance {
                instance_id: instance.id.clone(),
                expected_version: instance.version,
                new_step: instance.current_step_id.clone(),
                new_status: InstanceStatus::Cancelled,
                closes: true,
            },
            close_task: live_task.map(|t| TaskClose::Skip(t.id)),
            create_task: None,
            history: HistoryAppend {
                instance_id: instance.id.clone(),
                from_step: Some(instance.current_step_id.clone()),
                to_step: instance.current_step_id.clone(),
                action: CANCEL_ACTION.to_string(),
                performed_by: performer.clone(),
                comment: reason.to_string(),
            },
        };
        let written = self.commit_guarded(commit, instance_id, CANCEL_ACTION).await?;

        tracing::info!(
            instance_id = %written.id,
            performer = %performer,
            "workflow instance cancelled"
        );
        Ok(written)
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn resolve_template(&self, key: &str) -> EngineResult<WorkflowTemplate> {
        if let Some(template) = self.templates.get_template_by_type(key).await? {
            return Ok(template);
        }
        self.templates
            .get_template_by_name(key)
            .await?
            .ok_or_else(|| EngineError::TemplateNotFound(key.to_string()))
    }

    /// Resolve an instance's template by id, ignoring the active flag so
    /// deactivation never strands a running case.
    async fn template_of(&self, instance: &WorkflowInstance) -> EngineResult<WorkflowTemplate> {
        self.templates
            .get_template(&instance.template_id)
            .await?
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "instance {} references missing template {}",
                    instance.id, instance.template_id
                ))
            })
    }

    async fn check_permission(
        &self,
        step: &WorkflowStep,
        performer: &UserId,
        assignee: &UserId,
    ) -> EngineResult<()> {
        if step.allowed_roles.is_empty() {
            // Context-routed step: only the assigned sender may act.
            if performer == assignee {
                return Ok(());
            }
            return Err(EngineError::PermissionDenied {
                user: performer.clone(),
                step: step.id.clone(),
            });
        }
        let user = self
            .directory
            .get_user(performer)
            .await?
            .filter(|u| u.active);
        match user {
            Some(user) if user.holds_any_role(&step.allowed_roles) => Ok(()),
            _ => Err(EngineError::PermissionDenied {
                user: performer.clone(),
                step: step.id.clone(),
            }),
        }
    }

    /// Distinct approvals required before the step's transition may fire.
    async fn required_approvals(&self, step: &WorkflowStep) -> EngineResult<u32> {
        if step.approval.requires_all_approvers {
            let eligible = self.dispatcher.eligible_users(step).await?;
            return Ok((eligible.len() as u32).max(1));
        }
        Ok(step.approval.min_approvals.max(1))
    }

    /// Users who already recorded this action at the current step since
    /// the instance last arrived there. Derived from history: quorum votes
    /// are the `from == to == step` entries after the latest arrival.
    async fn quorum_voters(
        &self,
        instance: &WorkflowInstance,
        step: &WorkflowStep,
        action: &str,
    ) -> EngineResult<HashSet<UserId>> {
        let history = self.history.history_for_instance(&instance.id).await?;
        let arrival = history
            .iter()
            .rposition(|h| h.to_step == step.id && !h.is_quorum_entry());
        let since = match arrival {
            Some(index) => &history[index + 1..],
            None => &history[..],
        };
        Ok(since
            .iter()
            .filter(|h| h.is_quorum_entry() && h.to_step == step.id && h.action == action)
            .map(|h| h.performed_by.clone())
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_quorum_vote(
        &self,
        instance: WorkflowInstance,
        step: WorkflowStep,
        live_task: AssignedTask,
        voters: HashSet<UserId>,
        action: &str,
        performer: &UserId,
        comment: &str,
        recorded: u32,
        required: u32,
    ) -> EngineResult<ActionOutcome> {
        let mut excluded: Vec<UserId> = voters.into_iter().collect();
        excluded.push(performer.clone());
        let next = self
            .dispatcher
            .select_assignee(&step, &instance.details, &excluded)
            .await?;

        let commit = TransitionCommit {
            instance: InstanceWrite::Advance {
                instance_id: instance.id.clone(),
                expected_version: instance.version,
                new_step: step.id.clone(),
                new_status: instance.status,
                closes: false,
            },
            close_task: Some(TaskClose::Complete(live_task.id)),
            create_task: Some(AssignedTask::new(
                instance.id.clone(),
                step.id.clone(),
                next,
            )),
            history: HistoryAppend {
                instance_id: instance.id.clone(),
                from_step: Some(step.id.clone()),
                to_step: step.id.clone(),
                action: action.to_string(),
                performed_by: performer.clone(),
                comment: comment.to_string(),
            },
        };
        let written = self.commit_guarded(commit, &instance.id, action).await?;

        tracing::info!(
            instance_id = %written.id,
            step = %step.id,
            recorded,
            required,
            "quorum vote recorded"
        );
        Ok(ActionOutcome::QuorumPending {
            instance: written,
            approvals_recorded: recorded,
            approvals_required: required,
        })
    }

    /// Commit an advance; a lost version race is re-read and reported as
    /// the winner's state, never as a raw conflict.
    async fn commit_guarded(
        &self,
        commit: TransitionCommit,
        instance_id: &InstanceId,
        action: &str,
    ) -> EngineResult<WorkflowInstance> {
        match self.instances.commit_transition(commit).await {
            Ok(written) => Ok(written),
            Err(StorageError::Conflict(_)) => {
                match self.instances.get_instance(instance_id).await? {
                    Some(fresh) if fresh.is_terminal() => {
                        Err(EngineError::AlreadyClosed(instance_id.clone()))
                    }
                    Some(fresh) => Err(EngineError::InvalidAction {
                        step: fresh.current_step_id,
                        action: action.to_string(),
                    }),
                    None => Err(EngineError::InstanceNotFound(instance_id.clone())),
                }
            }
            Err(other) => Err(other.into()),
        }
    }
}

fn terminal_status(step: &WorkflowStep) -> InstanceStatus {
    match step.outcome {
        StepOutcome::Completed => InstanceStatus::Completed,
        StepOutcome::Rejected => InstanceStatus::Rejected,
    }
}

fn condition_holds(condition: &TransitionCondition, instance: &WorkflowInstance) -> bool {
    match condition {
        TransitionCondition::TaskTypeIs(task_type) => &instance.details.task_type == task_type,
        TransitionCondition::PriorityAtLeast(priority) => instance.priority >= *priority,
        TransitionCondition::SenderDepartmentIs(department) => {
            &instance.details.sender.department == department
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_types::SenderInfo;

    fn make_instance(priority: Priority, department: &str) -> WorkflowInstance {
        let details = TaskDetails::new(
            "task-1",
            "leave_request",
            SenderInfo::new("u-1", "Ann").with_department(department),
        );
        WorkflowInstance::new(
            caseflow_types::TemplateId::new("tpl-1"),
            caseflow_types::StepId::new("pending_manager"),
            details,
            UserId::new("u-1"),
        )
        .with_priority(priority)
    }

    #[test]
    fn test_condition_task_type() {
        let instance = make_instance(Priority::Normal, "R&D");
        assert!(condition_holds(
            &TransitionCondition::TaskTypeIs("leave_request".into()),
            &instance
        ));
        assert!(!condition_holds(
            &TransitionCondition::TaskTypeIs("expense_claim".into()),
            &instance
        ));
    }

    #[test]
    fn test_condition_priority_floor() {
        let instance = make_instance(Priority::High, "R&D");
        assert!(condition_holds(
            &TransitionCondition::PriorityAtLeast(Priority::Normal),
            &instance
        ));
        assert!(condition_holds(
            &TransitionCondition::PriorityAtLeast(Priority::High),
            &instance
        ));
        assert!(!condition_holds(
            &TransitionCondition::PriorityAtLeast(Priority::Urgent),
            &instance
        ));
    }

    #[test]
    fn test_condition_department() {
        let instance = make_instance(Priority::Normal, "R&D");
        assert!(condition_holds(
            &TransitionCondition::SenderDepartmentIs("R&D".into()),
            &instance
        ));
        assert!(!condition_holds(
            &TransitionCondition::SenderDepartmentIs("Sales".into()),
            &instance
        ));
    }
}
