//! The graph executor.
//!
//! One execution advances one node at a time: pop the frontier, re-enqueue
//! while predecessors are unresolved, execute, record, enqueue downstream.
//! The same loop drives normal runs, run-until plans, and debug stepping;
//! the [`StepPolicy`] decides where it stops.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use typeflow_credentials::{CredentialService, HandlePool, methods_for_kind};
use typeflow_model::{
  CallFrame, Execution, ExecutionItem, ExecutionStatus, LogEntry, Node, NodeKind, NodeRunResult,
  NodeRunStatus, TriggerType, Workflow, sanitize_label,
};
use typeflow_sandbox::{CodeInvocation, PredecessorBinding, Sandbox, SandboxConfig, SandboxError};
use typeflow_store::Store;

use crate::branch::evaluate_if;
use crate::error::ExecutorError;
use crate::items::normalize_output;
use crate::merge::{merge_items, remove_duplicates};
use crate::state::ExecutionState;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Root of the per-organization package directories.
  pub packages_root: PathBuf,
  /// Wall-clock limit per code-node call.
  pub code_timeout: Duration,
  /// Sub-workflow nesting limit.
  pub max_subworkflow_depth: usize,
  /// Cap on captured console entries per execution.
  pub max_log_entries: usize,
}

impl EngineConfig {
  pub fn new(packages_root: impl Into<PathBuf>) -> Self {
    Self {
      packages_root: packages_root.into(),
      code_timeout: Duration::from_secs(5),
      max_subworkflow_depth: 16,
      max_log_entries: 1000,
    }
  }
}

/// Where the scheduling loop stops.
#[derive(Debug, Clone, Default)]
pub struct StepPolicy {
  /// Pause before executing any of these nodes.
  pub breakpoints: BTreeSet<String>,
  /// A breakpoint node to execute without re-triggering (the resume node).
  pub resume_node: Option<String>,
  /// Stop after this many executed nodes (`Some(1)` = step over).
  pub max_nodes: Option<usize>,
}

impl StepPolicy {
  pub fn run_to_completion() -> Self {
    Self::default()
  }
}

/// How an advance call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
  Completed,
  /// Stopped before executing `node_id`; the frontier starts with it.
  Paused { node_id: String },
  Failed { node_id: String, error: String },
  Cancelled,
}

/// Per-run resources: the sandbox, the credential handle pool, and the
/// sub-workflow call stack.
pub struct RunSession {
  sandbox: Option<Sandbox>,
  handle_pool: Option<Arc<HandlePool>>,
  depth: usize,
  call_stack: Vec<CallFrame>,
}

impl RunSession {
  pub fn new(depth: usize) -> Self {
    Self {
      sandbox: None,
      handle_pool: None,
      depth,
      call_stack: Vec::new(),
    }
  }

  pub fn call_stack(&self) -> &[CallFrame] {
    &self.call_stack
  }

  /// Drain console logs captured so far.
  pub fn take_logs(&self) -> Vec<LogEntry> {
    match &self.sandbox {
      Some(sandbox) => sandbox.take_logs(),
      None => Vec::new(),
    }
  }

  /// Release per-execution resources. Runs on every exit path.
  pub async fn close(&mut self) {
    if let Some(pool) = self.handle_pool.take() {
      pool.close_all().await;
    }
    self.sandbox = None;
  }
}

enum NodeOutcome {
  Success {
    output: Vec<ExecutionItem>,
    active: Vec<String>,
  },
  Failure {
    message: String,
  },
}

/// The workflow execution engine.
pub struct ExecutionEngine {
  store: Arc<dyn Store>,
  credentials: Option<Arc<CredentialService>>,
  config: EngineConfig,
}

impl ExecutionEngine {
  pub fn new(
    store: Arc<dyn Store>,
    credentials: Option<Arc<CredentialService>>,
    config: EngineConfig,
  ) -> Self {
    Self {
      store,
      credentials,
      config,
    }
  }

  pub fn store(&self) -> &Arc<dyn Store> {
    &self.store
  }

  /// Run a workflow to completion (or failure/cancellation) and persist the
  /// execution row.
  #[instrument(
    name = "workflow_execute",
    skip(self, workflow, trigger_data, cancel),
    fields(workflow_id = %workflow.workflow_id)
  )]
  pub async fn execute(
    &self,
    workflow: &Workflow,
    trigger_type: TriggerType,
    trigger_data: Option<Value>,
    run_until: Option<&str>,
    cancel: CancellationToken,
  ) -> Result<Execution, ExecutorError> {
    let execution_id = uuid::Uuid::new_v4().to_string();
    info!(
      execution_id = %execution_id,
      trigger_type = %trigger_type.as_str(),
      "workflow_started"
    );

    let mut execution = Execution::start(
      &execution_id,
      &workflow.workflow_id,
      &workflow.organization_id,
      trigger_type,
      trigger_data.clone(),
    );
    self.store.create_execution(&execution).await?;

    let entry_items = vec![ExecutionItem::from_trigger_data(trigger_data)];
    let mut state = match ExecutionState::plan(
      workflow,
      &execution_id,
      trigger_type,
      entry_items,
      run_until,
    ) {
      Ok(state) => state,
      Err(e) => {
        self.finalize_error(&mut execution, &e).await;
        return Err(e);
      }
    };

    let mut session = RunSession::new(0);
    let outcome = self
      .advance(
        workflow,
        &mut state,
        &StepPolicy::run_to_completion(),
        &mut session,
        &cancel,
      )
      .await;
    execution.logs = session.take_logs();
    session.close().await;

    let outcome = match outcome {
      Ok(outcome) => outcome,
      Err(e) => {
        self.finalize_error(&mut execution, &e).await;
        return Err(e);
      }
    };

    finalize(&mut execution, workflow, &state, &outcome);
    self.store.update_execution(&execution).await?;

    match &execution.status {
      ExecutionStatus::Completed => info!(execution_id = %execution_id, "workflow_completed"),
      ExecutionStatus::Cancelled => warn!(execution_id = %execution_id, "workflow_cancelled"),
      _ => error!(
        execution_id = %execution_id,
        error = %execution.error.as_deref().unwrap_or(""),
        "workflow_failed"
      ),
    }

    Ok(execution)
  }

  /// Drive the scheduling loop until the policy stops it.
  pub async fn advance(
    &self,
    workflow: &Workflow,
    state: &mut ExecutionState,
    policy: &StepPolicy,
    session: &mut RunSession,
    cancel: &CancellationToken,
  ) -> Result<RunOutcome, ExecutorError> {
    let mut resume_pass = policy.resume_node.clone();
    let mut executed = 0usize;
    let mut stalls = 0usize;

    loop {
      if cancel.is_cancelled() || self.cancelled_out_of_band(&state.execution_id).await? {
        warn!(execution_id = %state.execution_id, "execution cancelled");
        return Ok(RunOutcome::Cancelled);
      }

      let Some(node_id) = state.frontier.pop_front() else {
        return Ok(RunOutcome::Completed);
      };
      if state.resolved(&node_id) {
        continue;
      }

      // Readiness: every in-plan predecessor must be resolved.
      let unresolved = workflow.incoming(&node_id).iter().any(|c| {
        state.plan.contains(&c.source_node_id) && !state.resolved(&c.source_node_id)
      });
      if unresolved {
        stalls += 1;
        if stalls > state.frontier.len() + 1 {
          return Err(ExecutorError::InvalidGraph {
            message: format!("frontier stalled at node '{}'", node_id),
          });
        }
        state.frontier.push_back(node_id);
        continue;
      }
      stalls = 0;

      // Breakpoints pause before execution; the resume node passes once.
      if policy.breakpoints.contains(&node_id) && resume_pass.as_deref() != Some(node_id.as_str())
      {
        state.frontier.push_front(node_id.clone());
        info!(execution_id = %state.execution_id, node_id = %node_id, "paused_at_breakpoint");
        return Ok(RunOutcome::Paused { node_id });
      }
      if resume_pass.as_deref() == Some(node_id.as_str()) {
        resume_pass = None;
      }

      // Liveness: at least one incoming edge delivered items, or this is
      // the entry. Dead nodes resolve as skipped and propagate.
      let is_entry = node_id == state.entry_node_id;
      let live = is_entry
        || workflow
          .incoming(&node_id)
          .iter()
          .any(|c| state.edge_live(&c.source_node_id, &c.source_handle));
      if !live {
        state.record(NodeRunResult::skipped(&node_id));
        for connection in workflow.outgoing(&node_id) {
          state.enqueue(&connection.target_node_id);
        }
        continue;
      }

      let node = workflow
        .get_node(&node_id)
        .ok_or_else(|| ExecutorError::NodeNotFound {
          node_id: node_id.clone(),
        })?;

      let started = Instant::now();
      let outcome = self
        .execute_node(workflow, node, state, session, cancel)
        .await?;
      let duration_ms = started.elapsed().as_millis() as i64;

      match outcome {
        NodeOutcome::Success { output, active } => {
          info!(
            execution_id = %state.execution_id,
            node_id = %node_id,
            items = output.len(),
            duration_ms,
            "node_completed"
          );
          state.active_handles.insert(node_id.clone(), active);
          state.record(NodeRunResult::completed(&node_id, output, duration_ms));
          for connection in workflow.outgoing(&node_id) {
            state.enqueue(&connection.target_node_id);
          }

          executed += 1;
          if policy.max_nodes.is_some_and(|max| executed >= max) {
            return Ok(match state.frontier.front() {
              Some(next) => RunOutcome::Paused {
                node_id: next.clone(),
              },
              None => RunOutcome::Completed,
            });
          }
        }
        NodeOutcome::Failure { message } => {
          error!(
            execution_id = %state.execution_id,
            node_id = %node_id,
            error = %message,
            "node_failed"
          );
          state.record(NodeRunResult::failed(&node_id, &message, duration_ms));
          return Ok(RunOutcome::Failed {
            node_id,
            error: message,
          });
        }
      }
    }
  }

  /// Dispatch one node by kind.
  async fn execute_node(
    &self,
    workflow: &Workflow,
    node: &Node,
    state: &ExecutionState,
    session: &mut RunSession,
    cancel: &CancellationToken,
  ) -> Result<NodeOutcome, ExecutorError> {
    let inputs = assemble_input(workflow, state, &node.node_id);

    let outcome = match node.kind {
      // Reaching a trigger kind here means it is the entry node; the others
      // were pre-resolved as skipped at plan time.
      NodeKind::Trigger | NodeKind::Webhook | NodeKind::WorkflowInput => NodeOutcome::Success {
        output: state.entry_items.clone(),
        active: node.output_handles(),
      },

      NodeKind::Code => {
        self
          .run_code_node(workflow, node, inputs, state, session)
          .await?
      }

      NodeKind::If => match node.if_config() {
        Ok(config) => {
          let handle = evaluate_if(&config, &inputs);
          NodeOutcome::Success {
            output: inputs,
            active: vec![handle],
          }
        }
        Err(e) => NodeOutcome::Failure {
          message: e.to_string(),
        },
      },

      NodeKind::Merge => match node.merge_config() {
        Ok(config) => {
          let per_edge = assemble_per_edge(workflow, state, &node.node_id);
          NodeOutcome::Success {
            output: merge_items(&config, &per_edge),
            active: node.output_handles(),
          }
        }
        Err(e) => NodeOutcome::Failure {
          message: e.to_string(),
        },
      },

      NodeKind::RemoveDuplicates => match node.remove_duplicates_config() {
        Ok(config) => NodeOutcome::Success {
          output: remove_duplicates(&config, &inputs),
          active: node.output_handles(),
        },
        Err(e) => NodeOutcome::Failure {
          message: e.to_string(),
        },
      },

      NodeKind::ExecuteWorkflow => {
        self
          .run_sub_workflow(workflow, node, &inputs, state, session, cancel)
          .await?
      }

      // Pass-through kinds: their position in the graph is their meaning.
      NodeKind::WorkflowOutput | NodeKind::WebhookResponse | NodeKind::Generic => {
        NodeOutcome::Success {
          output: inputs,
          active: node.output_handles(),
        }
      }

      NodeKind::Utilities => NodeOutcome::Failure {
        message: format!("utilities node '{}' cannot be scheduled", node.node_id),
      },
    };

    Ok(outcome)
  }

  async fn run_code_node(
    &self,
    workflow: &Workflow,
    node: &Node,
    inputs: Vec<ExecutionItem>,
    state: &ExecutionState,
    session: &mut RunSession,
  ) -> Result<NodeOutcome, ExecutorError> {
    let config = match node.script_config() {
      Ok(config) => config,
      Err(e) => {
        return Ok(NodeOutcome::Failure {
          message: e.to_string(),
        });
      }
    };

    let sandbox = match self.ensure_sandbox(session, workflow).await {
      Ok(sandbox) => sandbox,
      Err(e) => {
        return Ok(NodeOutcome::Failure {
          message: e.to_string(),
        });
      }
    };

    let invocation = CodeInvocation {
      node_id: node.node_id.clone(),
      code: config.code,
      items: inputs.clone(),
      predecessors: predecessor_bindings(workflow, state, &node.node_id),
    };

    match sandbox.run_code(invocation).await {
      Ok(result) => Ok(NodeOutcome::Success {
        output: normalize_output(result, &inputs),
        active: node.output_handles(),
      }),
      Err(e) => Ok(NodeOutcome::Failure {
        message: classify_sandbox_error(e),
      }),
    }
  }

  async fn run_sub_workflow(
    &self,
    workflow: &Workflow,
    node: &Node,
    inputs: &[ExecutionItem],
    state: &ExecutionState,
    session: &mut RunSession,
    cancel: &CancellationToken,
  ) -> Result<NodeOutcome, ExecutorError> {
    let config = match node.execute_workflow_config() {
      Ok(config) => config,
      Err(e) => {
        return Ok(NodeOutcome::Failure {
          message: e.to_string(),
        });
      }
    };

    let next_depth = session.depth + 1;
    if next_depth > self.config.max_subworkflow_depth {
      return Ok(NodeOutcome::Failure {
        message: format!(
          "sub-workflow depth limit {} exceeded",
          self.config.max_subworkflow_depth
        ),
      });
    }

    let callee = match self
      .store
      .get_workflow(&workflow.organization_id, &config.workflow_id)
      .await
    {
      Ok(callee) => callee,
      Err(typeflow_store::Error::NotFound(_)) => {
        return Ok(NodeOutcome::Failure {
          message: format!("workflow '{}' not found", config.workflow_id),
        });
      }
      Err(e) => return Err(e.into()),
    };

    session.call_stack.push(CallFrame {
      caller_execution_id: state.execution_id.clone(),
      caller_node_id: node.node_id.clone(),
      workflow_id: config.workflow_id.clone(),
    });

    let result = match config.mode {
      typeflow_model::InvokeMode::Once => {
        self
          .invoke_sub(
            &callee,
            inputs.to_vec(),
            state.execution_id.clone(),
            next_depth,
            cancel,
          )
          .await
      }
      typeflow_model::InvokeMode::Foreach => {
        let mut collected: Vec<ExecutionItem> = Vec::new();
        let mut failure: Option<String> = None;
        for (index, item) in inputs.iter().enumerate() {
          match self
            .invoke_sub(
              &callee,
              vec![item.clone()],
              state.execution_id.clone(),
              next_depth,
              cancel,
            )
            .await?
          {
            Ok(items) => {
              collected.extend(items.into_iter().map(|item| item.with_paired(index)));
            }
            Err(message) => {
              failure = Some(message);
              break;
            }
          }
        }
        match failure {
          Some(message) => Ok(Err(message)),
          None => Ok(Ok(collected)),
        }
      }
    };
    session.call_stack.pop();

    match result? {
      Ok(output) => Ok(NodeOutcome::Success {
        output,
        active: node.output_handles(),
      }),
      Err(message) => Ok(NodeOutcome::Failure { message }),
    }
  }

  /// Run a callee workflow with a fresh, linked execution.
  ///
  /// The inner result is the callee's output or its failure message, which
  /// becomes the caller node's failure.
  fn invoke_sub<'a>(
    &'a self,
    callee: &'a Workflow,
    items: Vec<ExecutionItem>,
    parent_execution_id: String,
    depth: usize,
    cancel: &'a CancellationToken,
  ) -> Pin<Box<dyn Future<Output = Result<Result<Vec<ExecutionItem>, String>, ExecutorError>> + Send + 'a>>
  {
    Box::pin(async move {
      let execution_id = uuid::Uuid::new_v4().to_string();
      info!(
        execution_id = %execution_id,
        workflow_id = %callee.workflow_id,
        parent_execution_id = %parent_execution_id,
        "sub_workflow_started"
      );

      let mut execution = Execution::start(
        &execution_id,
        &callee.workflow_id,
        &callee.organization_id,
        TriggerType::SubWorkflow,
        None,
      );
      execution.parent_execution_id = Some(parent_execution_id);
      self.store.create_execution(&execution).await?;

      let mut state = match ExecutionState::plan(
        callee,
        &execution_id,
        TriggerType::SubWorkflow,
        items,
        None,
      ) {
        Ok(state) => state,
        Err(e) => {
          self.finalize_error(&mut execution, &e).await;
          return Ok(Err(e.to_string()));
        }
      };

      let mut session = RunSession::new(depth);
      let outcome = self
        .advance(
          callee,
          &mut state,
          &StepPolicy::run_to_completion(),
          &mut session,
          cancel,
        )
        .await;
      execution.logs = session.take_logs();
      session.close().await;

      let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
          self.finalize_error(&mut execution, &e).await;
          return Err(e);
        }
      };

      finalize(&mut execution, callee, &state, &outcome);
      self.store.update_execution(&execution).await?;

      match outcome {
        RunOutcome::Completed | RunOutcome::Paused { .. } => {
          Ok(Ok(final_output(callee, &state)))
        }
        RunOutcome::Failed { error, .. } => Ok(Err(error)),
        RunOutcome::Cancelled => Err(ExecutorError::Cancelled),
      }
    })
  }

  /// Build the sandbox on first use: credential bindings from the
  /// organization, utility modules from the workflow.
  async fn ensure_sandbox<'s>(
    &self,
    session: &'s mut RunSession,
    workflow: &Workflow,
  ) -> Result<&'s Sandbox, ExecutorError> {
    if session.sandbox.is_none() {
      let organization_id = &workflow.organization_id;

      let (pool, credential_methods) = match &self.credentials {
        Some(service) => {
          let pool = Arc::new(HandlePool::new(service.clone(), organization_id));
          let credentials = service
            .list(organization_id)
            .await
            .map_err(|e| ExecutorError::Sandbox(e.to_string()))?;
          let methods = credentials
            .iter()
            .map(|c| {
              (
                c.name.clone(),
                methods_for_kind(c.kind)
                  .iter()
                  .map(|m| m.to_string())
                  .collect::<Vec<_>>(),
              )
            })
            .collect();
          (Some(pool), methods)
        }
        None => (None, Vec::new()),
      };

      let mut config = SandboxConfig::new(self.config.packages_root.join(organization_id));
      config.timeout = self.config.code_timeout;
      config.max_log_entries = self.config.max_log_entries;

      let sandbox = Sandbox::new(config, pool.clone(), credential_methods)
        .await
        .map_err(|e| ExecutorError::Sandbox(e.to_string()))?;

      for utility in workflow.nodes_of_kind(NodeKind::Utilities) {
        let script = utility
          .script_config()
          .map_err(|e| ExecutorError::Sandbox(e.to_string()))?;
        sandbox
          .register_utility(&sanitize_label(&utility.label), &script.code)
          .await
          .map_err(|e| {
            ExecutorError::Sandbox(format!("utility '{}': {}", utility.label, e))
          })?;
      }

      session.handle_pool = pool;
      session.sandbox = Some(sandbox);
    }

    session
      .sandbox
      .as_ref()
      .ok_or_else(|| ExecutorError::Sandbox("sandbox unavailable".to_string()))
  }

  /// Out-of-band cancellation: someone flipped the execution row.
  async fn cancelled_out_of_band(&self, execution_id: &str) -> Result<bool, ExecutorError> {
    match self.store.get_execution(execution_id).await {
      Ok(execution) => Ok(execution.status == ExecutionStatus::Cancelled),
      // Debug sessions advance without an execution row.
      Err(typeflow_store::Error::NotFound(_)) => Ok(false),
      Err(e) => Err(e.into()),
    }
  }

  async fn finalize_error(&self, execution: &mut Execution, error: &ExecutorError) {
    execution.status = ExecutionStatus::Failed;
    execution.error = Some(error.to_string());
    execution.completed_at = Some(Utc::now());
    execution.duration_ms = Some(
      (Utc::now() - execution.started_at)
        .num_milliseconds()
        .max(0),
    );
    if let Err(e) = self.store.update_execution(execution).await {
      error!(execution_id = %execution.execution_id, error = %e, "failed to persist execution");
    }
  }
}

/// Items arriving at a node: live incoming edges concatenated in
/// deterministic source order.
pub fn assemble_input(
  workflow: &Workflow,
  state: &ExecutionState,
  node_id: &str,
) -> Vec<ExecutionItem> {
  assemble_per_edge(workflow, state, node_id)
    .into_iter()
    .flatten()
    .collect()
}

/// One item list per incoming edge; dead edges contribute empty sequences.
fn assemble_per_edge(
  workflow: &Workflow,
  state: &ExecutionState,
  node_id: &str,
) -> Vec<Vec<ExecutionItem>> {
  workflow
    .incoming(node_id)
    .iter()
    .map(|connection| {
      if state.edge_live(&connection.source_node_id, &connection.source_handle) {
        state.output_of(&connection.source_node_id).to_vec()
      } else {
        Vec::new()
      }
    })
    .collect()
}

/// `$<label>` bindings for a code node: every transitive predecessor,
/// completed or not (unexecuted ones bind empty item lists).
fn predecessor_bindings(
  workflow: &Workflow,
  state: &ExecutionState,
  node_id: &str,
) -> Vec<PredecessorBinding> {
  let graph = workflow.graph();
  let mut ancestors: Vec<String> = graph.ancestors(node_id).into_iter().collect();
  ancestors.sort();

  ancestors
    .into_iter()
    .filter_map(|ancestor_id| {
      let node = workflow.get_node(&ancestor_id)?;
      Some(PredecessorBinding {
        label: sanitize_label(&node.label),
        items: state.output_of(&ancestor_id).to_vec(),
      })
    })
    .collect()
}

fn classify_sandbox_error(error: SandboxError) -> String {
  match &error {
    SandboxError::TypeValidation { .. } => format!("TypeValidationError: {}", error),
    SandboxError::Timeout { .. } => format!("TimeoutError: {}", error),
    SandboxError::Runtime { message } => format!("RuntimeError: {}", message),
    SandboxError::Internal(message) => format!("RuntimeError: {}", message),
  }
}

/// Final output items: `webhookResponse` wins, then `workflowOutput`, then
/// the last completed node in scheduling order.
pub fn final_output(workflow: &Workflow, state: &ExecutionState) -> Vec<ExecutionItem> {
  for kind in [NodeKind::WebhookResponse, NodeKind::WorkflowOutput] {
    for node in workflow.nodes_of_kind(kind) {
      if state.status(&node.node_id) == Some(NodeRunStatus::Completed) {
        return state.output_of(&node.node_id).to_vec();
      }
    }
  }
  state
    .node_results
    .iter()
    .rev()
    .find(|r| r.status == NodeRunStatus::Completed)
    .map(|r| r.output.clone())
    .unwrap_or_default()
}

/// Apply an outcome to the execution row.
pub fn finalize(
  execution: &mut Execution,
  workflow: &Workflow,
  state: &ExecutionState,
  outcome: &RunOutcome,
) {
  execution.node_results = state.node_results.clone();
  execution.result = final_output(workflow, state);
  execution.status = match outcome {
    RunOutcome::Completed | RunOutcome::Paused { .. } => ExecutionStatus::Completed,
    RunOutcome::Failed { .. } => ExecutionStatus::Failed,
    RunOutcome::Cancelled => ExecutionStatus::Cancelled,
  };
  execution.error = match outcome {
    RunOutcome::Failed { error, .. } => Some(error.clone()),
    _ => state.first_error(),
  };
  execution.completed_at = Some(Utc::now());
  execution.duration_ms = Some(
    (Utc::now() - execution.started_at)
      .num_milliseconds()
      .max(0),
  );
}

/// Rebuild scheduler state from persisted debug-session data.
///
/// Control-node activations are recomputed deterministically by replaying
/// recorded results in scheduling order; no node re-executes.
pub fn rebuild_state(
  workflow: &Workflow,
  execution_id: &str,
  trigger_data: Option<Value>,
  node_results: &[NodeRunResult],
  frontier: &[String],
) -> Result<ExecutionState, ExecutorError> {
  let entry_items = vec![ExecutionItem::from_trigger_data(trigger_data)];
  let mut state = ExecutionState::plan(
    workflow,
    execution_id,
    TriggerType::Debug,
    entry_items,
    None,
  )?;
  state.frontier.clear();

  for result in node_results {
    if result.status == NodeRunStatus::Completed {
      let active = match workflow.get_node(&result.node_id) {
        Some(node) if node.kind == NodeKind::If => match node.if_config() {
          Ok(config) => {
            let inputs = assemble_input(workflow, &state, &result.node_id);
            vec![evaluate_if(&config, &inputs)]
          }
          Err(_) => node.output_handles(),
        },
        Some(node) => node.output_handles(),
        None => vec!["main".to_string()],
      };
      state.active_handles.insert(result.node_id.clone(), active);
    }
    state.record(result.clone());
  }

  state.frontier = frontier.iter().cloned().collect();
  Ok(state)
}
