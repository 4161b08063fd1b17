//! Workflow templates: the blueprint a running case follows.
//!
//! A template is a directed graph where steps are states and transitions
//! are named, role-guarded edges. Templates are immutable once published:
//! deactivate and create a replacement rather than editing in place, so
//! in-flight instances never see a shifting graph.

use crate::directory::{RoleId, UserId};
use crate::error::{EngineError, EngineResult};
use crate::instance::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow template
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a step within a template
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a transition
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub String);

impl TransitionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TransitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Workflow Template ────────────────────────────────────────────────

/// A workflow template: steps plus named transitions between them
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Unique identifier
    pub id: TemplateId,
    /// Human-readable name
    pub name: String,
    /// Description of the process this template models
    pub description: String,
    /// Category tag; at most one *active* template per category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    /// Inactive templates are invisible to initiation lookups
    pub active: bool,
    /// Who published this template
    pub created_by: UserId,
    /// The steps (states) of the graph
    pub steps: Vec<WorkflowStep>,
    /// The transitions (named edges) of the graph
    pub transitions: Vec<WorkflowTransition>,
    /// When the template was created
    pub created_at: DateTime<Utc>,
    /// When the template was last touched (activation flag only)
    pub updated_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    /// Create a new empty template
    pub fn new(name: impl Into<String>, created_by: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: TemplateId::generate(),
            name: name.into(),
            description: String::new(),
            workflow_type: None,
            active: true,
            created_by,
            steps: Vec::new(),
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    /// Add a step to the graph
    pub fn add_step(&mut self, step: WorkflowStep) -> EngineResult<()> {
        if self.steps.iter().any(|s| s.id == step.id) {
            return Err(EngineError::DuplicateStepId(step.id));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Add a transition to the graph
    ///
    /// Both endpoints must already exist, and the action name must be
    /// unique among transitions leaving the same step, so action dispatch
    /// stays unambiguous.
    pub fn add_transition(&mut self, transition: WorkflowTransition) -> EngineResult<()> {
        if !self.steps.iter().any(|s| s.id == transition.from_step) {
            return Err(EngineError::StepNotFound(transition.from_step));
        }
        if !self.steps.iter().any(|s| s.id == transition.to_step) {
            return Err(EngineError::StepNotFound(transition.to_step));
        }
        if self
            .transitions
            .iter()
            .any(|t| t.from_step == transition.from_step && t.action == transition.action)
        {
            return Err(EngineError::DuplicateAction {
                step: transition.from_step,
                action: transition.action,
            });
        }
        self.transitions.push(transition);
        Ok(())
    }

    // ── Graph queries ────────────────────────────────────────────────

    /// The single initial step, if the graph declares one
    pub fn initial_step(&self) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.initial)
    }

    /// All final steps
    pub fn final_steps(&self) -> Vec<&WorkflowStep> {
        self.steps.iter().filter(|s| s.is_final).collect()
    }

    /// Get a step by id
    pub fn step(&self, id: &StepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Transitions leaving a step
    pub fn transitions_from(&self, step_id: &StepId) -> Vec<&WorkflowTransition> {
        self.transitions
            .iter()
            .filter(|t| &t.from_step == step_id)
            .collect()
    }

    /// The transition for a named action leaving a step, if defined
    pub fn transition_for_action(
        &self,
        step_id: &StepId,
        action: &str,
    ) -> Option<&WorkflowTransition> {
        self.transitions
            .iter()
            .find(|t| &t.from_step == step_id && t.action == action)
    }

    /// Validate the template graph for structural correctness
    pub fn validate(&self) -> EngineResult<()> {
        if self.steps.is_empty() {
            return Err(EngineError::Validation(
                "template must have at least one step".into(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(&step.id) {
                return Err(EngineError::DuplicateStepId(step.id.clone()));
            }
        }

        let initial_count = self.steps.iter().filter(|s| s.initial).count();
        if initial_count != 1 {
            return Err(EngineError::InitialStepCount(initial_count));
        }

        for transition in &self.transitions {
            if self.step(&transition.from_step).is_none() {
                return Err(EngineError::StepNotFound(transition.from_step.clone()));
            }
            if self.step(&transition.to_step).is_none() {
                return Err(EngineError::StepNotFound(transition.to_step.clone()));
            }
        }

        let mut actions = HashSet::new();
        for transition in &self.transitions {
            if !actions.insert((&transition.from_step, transition.action.as_str())) {
                return Err(EngineError::DuplicateAction {
                    step: transition.from_step.clone(),
                    action: transition.action.clone(),
                });
            }
        }

        // At least one final step must be reachable from the initial step.
        let initial = self.initial_step().map(|s| s.id.clone());
        let reachable = match initial {
            Some(ref id) => self.reachable_from(id),
            None => HashSet::new(),
        };
        let final_reachable = self
            .steps
            .iter()
            .any(|s| s.is_final && reachable.contains(&s.id));
        if !final_reachable {
            return Err(EngineError::NoReachableFinalStep);
        }

        Ok(())
    }

    /// All step ids reachable from a given step via BFS
    fn reachable_from(&self, start: &StepId) -> HashSet<StepId> {
        let mut visited = HashSet::new();
        let mut queue = vec![start.clone()];

        while let Some(current) = queue.pop() {
            if visited.insert(current.clone()) {
                for transition in self.transitions_from(&current) {
                    if !visited.contains(&transition.to_step) {
                        queue.push(transition.to_step.clone());
                    }
                }
            }
        }

        visited
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }
}

// ── Workflow Step ────────────────────────────────────────────────────

/// A step in the workflow graph: one state a case can sit on
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique identifier within the template
    pub id: StepId,
    /// Human-readable name
    pub name: String,
    /// Display/sort order within the template
    pub order_index: u32,
    /// Exactly one step per template is the entry point
    pub initial: bool,
    /// Final steps close the instance on arrival
    pub is_final: bool,
    /// Roles permitted to act on this step; an empty set routes the step
    /// back to the business sender
    pub allowed_roles: Vec<RoleId>,
    /// How many distinct approvals the step needs before transitioning
    pub approval: ApprovalPolicy,
    /// Terminal status reached through this step (final steps only)
    pub outcome: StepOutcome,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: StepId::new(id),
            name: name.into(),
            order_index: 0,
            initial: false,
            is_final: false,
            allowed_roles: Vec::new(),
            approval: ApprovalPolicy::default(),
            outcome: StepOutcome::Completed,
        }
    }

    /// Create the entry-point step
    pub fn initial(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut step = Self::new(id, name);
        step.initial = true;
        step
    }

    /// Create a final step with the given terminal outcome
    pub fn terminal(
        id: impl Into<String>,
        name: impl Into<String>,
        outcome: StepOutcome,
    ) -> Self {
        let mut step = Self::new(id, name);
        step.is_final = true;
        step.outcome = outcome;
        step
    }

    pub fn with_order(mut self, order_index: u32) -> Self {
        self.order_index = order_index;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.allowed_roles.push(RoleId::new(role));
        self
    }

    pub fn with_approval(mut self, approval: ApprovalPolicy) -> Self {
        self.approval = approval;
        self
    }

    /// Check whether a role is allowed to act on this step
    pub fn allows_role(&self, role: &RoleId) -> bool {
        self.allowed_roles.contains(role)
    }
}

/// Approval quorum declared on a step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Every eligible user must approve before the transition fires
    pub requires_all_approvers: bool,
    /// Minimum distinct approvals required (ignored when
    /// `requires_all_approvers` is set)
    pub min_approvals: u32,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            requires_all_approvers: false,
            min_approvals: 1,
        }
    }
}

impl ApprovalPolicy {
    /// Any single eligible user may advance the step
    pub fn any_one() -> Self {
        Self::default()
    }

    /// A fixed number of distinct approvals is required
    pub fn quorum(min_approvals: u32) -> Self {
        Self {
            requires_all_approvers: false,
            min_approvals: min_approvals.max(1),
        }
    }

    /// Every eligible user must approve
    pub fn all_approvers() -> Self {
        Self {
            requires_all_approvers: true,
            min_approvals: 1,
        }
    }
}

/// Terminal instance status produced by arriving at a final step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The case ran to successful completion
    #[default]
    Completed,
    /// The case was turned down
    Rejected,
}

// ── Workflow Transition ──────────────────────────────────────────────

/// A named, directed edge between two steps
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowTransition {
    /// Unique identifier
    pub id: TransitionId,
    /// Source step
    pub from_step: StepId,
    /// Target step
    pub to_step: StepId,
    /// Action name requested by callers (e.g. "submit", "approve")
    pub action: String,
    /// Optional guard; the action is only legal when the guard holds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<TransitionCondition>,
}

impl WorkflowTransition {
    pub fn new(
        from_step: impl Into<String>,
        to_step: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: TransitionId::generate(),
            from_step: StepId::new(from_step),
            to_step: StepId::new(to_step),
            action: action.into(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: TransitionCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Guard condition on a transition, evaluated against the instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition_type", content = "value", rename_all = "snake_case")]
pub enum TransitionCondition {
    /// The instance's business task type must equal the value
    TaskTypeIs(String),
    /// The instance priority must be at least the value
    PriorityAtLeast(Priority),
    /// The business sender's department must equal the value
    SenderDepartmentIs(String),
}
