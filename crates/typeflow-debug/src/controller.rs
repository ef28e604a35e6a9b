//! The debug controller.
//!
//! Sessions persist in the store between operations, so a client can drive
//! an execution across many RPC calls. The paused state is a single row;
//! resuming rebuilds the frontier from `next_node_ids` and replays no work.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use typeflow_executor::{
  ExecutionEngine, ExecutionState, RunOutcome, RunSession, StepPolicy, rebuild_state,
};
use typeflow_model::{DebugSession, DebugStatus, ExecutionItem, TriggerType, Workflow};
use typeflow_store::Store;

use crate::error::DebugError;

/// Step-wise execution over persisted sessions.
pub struct DebugController {
  store: Arc<dyn Store>,
  engine: Arc<ExecutionEngine>,
}

impl DebugController {
  pub fn new(store: Arc<dyn Store>, engine: Arc<ExecutionEngine>) -> Self {
    Self { store, engine }
  }

  /// Create a new active session.
  #[instrument(name = "debug_create", skip(self, trigger_data))]
  pub async fn create_session(
    &self,
    organization_id: &str,
    workflow_id: &str,
    breakpoints: BTreeSet<String>,
    trigger_data: Option<serde_json::Value>,
  ) -> Result<DebugSession, DebugError> {
    // Fail fast if the workflow is missing.
    self.store.get_workflow(organization_id, workflow_id).await?;

    let session = DebugSession::new(
      uuid::Uuid::new_v4().to_string(),
      workflow_id,
      organization_id,
      breakpoints,
      trigger_data,
    );
    self.store.save_debug_session(&session).await?;
    info!(session_id = %session.session_id, workflow_id = %workflow_id, "debug_session_created");
    Ok(session)
  }

  /// Run from the beginning, yielding at breakpoints.
  pub async fn start(&self, session_id: &str) -> Result<DebugSession, DebugError> {
    let (mut session, workflow) = self.load(session_id).await?;
    let mut state = self.fresh_state(&workflow, &session)?;
    let policy = StepPolicy {
      breakpoints: session.breakpoints.iter().cloned().collect(),
      resume_node: None,
      max_nodes: None,
    };
    self.drive(&workflow, &mut session, &mut state, &policy).await
  }

  /// Execute exactly one node from the frontier, then pause.
  pub async fn step_over(&self, session_id: &str) -> Result<DebugSession, DebugError> {
    let (mut session, workflow) = self.load(session_id).await?;
    let mut state = self.session_state(&workflow, &session)?;
    let policy = StepPolicy {
      breakpoints: BTreeSet::new(),
      resume_node: None,
      max_nodes: Some(1),
    };
    self.drive(&workflow, &mut session, &mut state, &policy).await
  }

  /// Resume until the next breakpoint, completion, or failure.
  ///
  /// The node the session paused in front of executes first without
  /// re-triggering its breakpoint.
  pub async fn continue_session(&self, session_id: &str) -> Result<DebugSession, DebugError> {
    let (mut session, workflow) = self.load(session_id).await?;
    let mut state = self.session_state(&workflow, &session)?;
    let policy = StepPolicy {
      breakpoints: session.breakpoints.iter().cloned().collect(),
      resume_node: session.current_node_id.clone(),
      max_nodes: None,
    };
    self.drive(&workflow, &mut session, &mut state, &policy).await
  }

  /// End the session; no further operations are accepted.
  #[instrument(name = "debug_terminate", skip(self))]
  pub async fn terminate(&self, session_id: &str) -> Result<DebugSession, DebugError> {
    let (mut session, _workflow) = self.load(session_id).await?;
    session.status = DebugStatus::Terminated;
    session.current_node_id = None;
    session.next_node_ids.clear();
    session.updated_at = Utc::now();
    self.store.save_debug_session(&session).await?;
    info!(session_id = %session_id, "debug_session_terminated");
    Ok(session)
  }

  /// Read the persisted session row.
  pub async fn get_state(&self, session_id: &str) -> Result<DebugSession, DebugError> {
    Ok(self.store.get_debug_session(session_id).await?)
  }

  pub async fn list_sessions(&self, workflow_id: &str) -> Result<Vec<DebugSession>, DebugError> {
    Ok(self.store.list_debug_sessions(workflow_id).await?)
  }

  /// Idempotently add or remove a breakpoint on the workflow's metadata.
  #[instrument(name = "debug_toggle_breakpoint", skip(self))]
  pub async fn toggle_breakpoint(
    &self,
    organization_id: &str,
    workflow_id: &str,
    node_id: &str,
    enabled: bool,
  ) -> Result<Vec<String>, DebugError> {
    let mut workflow = self.store.get_workflow(organization_id, workflow_id).await?;
    let breakpoints = &mut workflow.metadata.breakpoints;
    let present = breakpoints.iter().any(|b| b == node_id);
    if enabled && !present {
      breakpoints.push(node_id.to_string());
    } else if !enabled && present {
      breakpoints.retain(|b| b != node_id);
    }
    self.store.save_workflow(&workflow).await?;
    Ok(workflow.metadata.breakpoints)
  }

  pub async fn get_breakpoints(
    &self,
    organization_id: &str,
    workflow_id: &str,
  ) -> Result<Vec<String>, DebugError> {
    let workflow = self.store.get_workflow(organization_id, workflow_id).await?;
    Ok(workflow.metadata.breakpoints)
  }

  /// Load the session and its workflow, rejecting ended sessions.
  async fn load(&self, session_id: &str) -> Result<(DebugSession, Workflow), DebugError> {
    let session = self.store.get_debug_session(session_id).await?;
    if session.status.is_ended() {
      return Err(DebugError::SessionEnded {
        session_id: session_id.to_string(),
      });
    }
    let workflow = self
      .store
      .get_workflow(&session.organization_id, &session.workflow_id)
      .await?;
    Ok((session, workflow))
  }

  /// A fresh plan for a session that has not executed anything yet.
  fn fresh_state(
    &self,
    workflow: &Workflow,
    session: &DebugSession,
  ) -> Result<ExecutionState, DebugError> {
    let entry_items = vec![ExecutionItem::from_trigger_data(session.trigger_data.clone())];
    Ok(ExecutionState::plan(
      workflow,
      format!("debug-{}", session.session_id),
      TriggerType::Debug,
      entry_items,
      None,
    )?)
  }

  /// Rebuild scheduler state from the persisted session, or plan fresh if
  /// nothing ran yet.
  fn session_state(
    &self,
    workflow: &Workflow,
    session: &DebugSession,
  ) -> Result<ExecutionState, DebugError> {
    if session.node_results.is_empty() && session.next_node_ids.is_empty() {
      return self.fresh_state(workflow, session);
    }
    Ok(rebuild_state(
      workflow,
      &format!("debug-{}", session.session_id),
      session.trigger_data.clone(),
      &session.node_results,
      &session.next_node_ids,
    )?)
  }

  /// Advance and persist the session snapshot.
  async fn drive(
    &self,
    workflow: &Workflow,
    session: &mut DebugSession,
    state: &mut ExecutionState,
    policy: &StepPolicy,
  ) -> Result<DebugSession, DebugError> {
    let mut run_session = RunSession::new(0);
    let outcome = self
      .engine
      .advance(workflow, state, policy, &mut run_session, &CancellationToken::new())
      .await;
    run_session.close().await;
    let outcome = outcome?;

    session.node_results = state.node_results.clone();
    session.call_stack.clear();
    match &outcome {
      RunOutcome::Completed => {
        session.status = DebugStatus::Completed;
        session.current_node_id = None;
        session.next_node_ids.clear();
        info!(session_id = %session.session_id, "debug_session_completed");
      }
      RunOutcome::Paused { node_id } => {
        session.status = DebugStatus::Paused;
        session.current_node_id = Some(node_id.clone());
        session.next_node_ids = state.frontier.iter().cloned().collect();
        info!(session_id = %session.session_id, node_id = %node_id, "debug_session_paused");
      }
      RunOutcome::Failed { node_id, .. } => {
        // The failure stays recorded on node_results; the session ends.
        session.status = DebugStatus::Terminated;
        session.current_node_id = Some(node_id.clone());
        session.next_node_ids.clear();
        info!(session_id = %session.session_id, node_id = %node_id, "debug_session_failed");
      }
      RunOutcome::Cancelled => {
        session.status = DebugStatus::Terminated;
        session.current_node_id = None;
        session.next_node_ids.clear();
      }
    }
    session.updated_at = Utc::now();
    self.store.save_debug_session(session).await?;
    Ok(session.clone())
  }
}
