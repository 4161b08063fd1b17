//! Caseflow engine.
//!
//! The engine advances cases through the graphs their templates declare.
//! It enforces permission and finality rules at every transition, keeps
//! the one-live-task invariant, and leaves one immutable history record
//! per action.
//!
//! # Key Principle
//!
//! **Only the lifecycle manager mutates an instance.** The dispatcher and
//! audit trail are invoked by it; nothing else ever races it to update
//! `current_step_id` or status. Every multi-record effect goes through a
//! single atomic store commit.
//!
//! # Architecture
//!
//! - [`LifecycleManager`] — initiates, advances, and cancels instances
//! - [`TaskDispatcher`] — picks exactly one assignee for a step
//! - [`AuditTrail`] — read surface over the append-only history
//! - [`WorkflowQueries`] — "my tasks", business-task correlation, history
//!
//! # Example
//!
//! ```rust,no_run
//! use caseflow_engine::LifecycleManager;
//! use caseflow_store::memory::InMemoryStore;
//! use caseflow_types::{Priority, SenderInfo, TaskDetails, UserId};
//! use std::sync::Arc;
//!
//! # async fn run() -> caseflow_types::EngineResult<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let lifecycle = LifecycleManager::from_store(store);
//!
//! let instance = lifecycle
//!     .initiate_workflow(
//!         "leave_request",
//!         TaskDetails::new("leave-42", "leave_request", SenderInfo::new("u-7", "Carol")),
//!         UserId::new("u-7"),
//!         Priority::Normal,
//!         None,
//!     )
//!     .await?;
//!
//! lifecycle
//!     .process_action(&instance.id, "approve", &UserId::new("mgr-1"), "ok")
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod audit;
pub mod dispatcher;
pub mod lifecycle;
pub mod queries;

pub use audit::AuditTrail;
pub use dispatcher::TaskDispatcher;
pub use lifecycle::{ActionOutcome, LifecycleManager, CANCEL_ACTION, SUBMIT_ACTION};
pub use queries::WorkflowQueries;
