//! Resumable execution state.
//!
//! The scheduler's whole world (frontier, recorded results, resolved
//! statuses, and the handles each control node activated) lives in this
//! serializable struct so the debug controller can persist it between
//! operations and resume without replaying work.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use typeflow_model::{
  ExecutionItem, NodeKind, NodeRunResult, NodeRunStatus, TriggerType, Workflow,
};

use crate::error::ExecutorError;

/// Scheduler state for one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
  pub execution_id: String,
  pub entry_node_id: String,
  /// The item list the entry node emits (trigger data, or a sub-workflow
  /// caller's batch).
  pub entry_items: Vec<ExecutionItem>,
  /// FIFO of nodes awaiting readiness checks.
  pub frontier: VecDeque<String>,
  /// Results in scheduling order.
  pub node_results: Vec<NodeRunResult>,
  /// Resolution status per node, including pre-skipped triggers that never
  /// appear in `node_results`.
  pub statuses: HashMap<String, NodeRunStatus>,
  /// Handles each completed node activated on its outgoing edges.
  pub active_handles: HashMap<String, Vec<String>>,
  /// Nodes the planner selected; readiness only considers in-plan edges.
  pub plan: BTreeSet<String>,
  pub failed_node: Option<String>,
}

impl ExecutionState {
  /// Build the initial state for an invocation.
  ///
  /// The entry node is the trigger node matching the invocation kind. For a
  /// run-until invocation the plan shrinks to the target's ancestors plus
  /// the target itself.
  pub fn plan(
    workflow: &Workflow,
    execution_id: impl Into<String>,
    trigger_type: TriggerType,
    entry_items: Vec<ExecutionItem>,
    run_until: Option<&str>,
  ) -> Result<Self, ExecutorError> {
    let entry = find_entry(workflow, trigger_type)?;

    let mut plan: BTreeSet<String> = match run_until {
      Some(target) => {
        if workflow.get_node(target).is_none() {
          return Err(ExecutorError::NodeNotFound {
            node_id: target.to_string(),
          });
        }
        let mut set: BTreeSet<String> = workflow.graph().ancestors(target).into_iter().collect();
        set.insert(target.to_string());
        set
      }
      None => workflow.nodes.iter().map(|n| n.node_id.clone()).collect(),
    };

    // Utilities never participate in item flow.
    for node in workflow.nodes_of_kind(NodeKind::Utilities) {
      plan.remove(&node.node_id);
    }

    if !plan.contains(&entry) {
      return Err(ExecutorError::InvalidGraph {
        message: format!(
          "entry node '{}' is not an ancestor of the run-until target",
          entry
        ),
      });
    }

    let mut state = Self {
      execution_id: execution_id.into(),
      entry_node_id: entry.clone(),
      entry_items,
      frontier: VecDeque::from([entry]),
      node_results: Vec::new(),
      statuses: HashMap::new(),
      active_handles: HashMap::new(),
      plan,
      failed_node: None,
    };

    // In-plan nodes with no path from the entry (other triggers that did
    // not fire, and everything only they feed) resolve as skipped up front
    // so joins on them do not wait forever. They never enter the frontier
    // and never appear in node_results.
    let mut reachable: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([state.entry_node_id.as_str()]);
    reachable.insert(state.entry_node_id.clone());
    while let Some(current) = queue.pop_front() {
      for connection in workflow.outgoing(current) {
        let target = &connection.target_node_id;
        if state.plan.contains(target) && reachable.insert(target.clone()) {
          queue.push_back(target);
        }
      }
    }
    for node_id in &state.plan {
      if !reachable.contains(node_id) {
        state
          .statuses
          .insert(node_id.clone(), NodeRunStatus::Skipped);
      }
    }

    Ok(state)
  }

  /// Whether a node has reached a terminal status.
  pub fn resolved(&self, node_id: &str) -> bool {
    matches!(
      self.statuses.get(node_id),
      Some(NodeRunStatus::Completed | NodeRunStatus::Failed | NodeRunStatus::Skipped)
    )
  }

  pub fn status(&self, node_id: &str) -> Option<NodeRunStatus> {
    self.statuses.get(node_id).copied()
  }

  /// Output items of a completed node (empty otherwise).
  pub fn output_of(&self, node_id: &str) -> &[ExecutionItem] {
    self
      .node_results
      .iter()
      .find(|r| r.node_id == node_id && r.status == NodeRunStatus::Completed)
      .map(|r| r.output.as_slice())
      .unwrap_or(&[])
  }

  /// Record a node result, updating the status index.
  pub fn record(&mut self, result: NodeRunResult) {
    self
      .statuses
      .insert(result.node_id.clone(), result.status);
    if result.status == NodeRunStatus::Failed {
      self.failed_node = Some(result.node_id.clone());
    }
    match self
      .node_results
      .iter_mut()
      .find(|r| r.node_id == result.node_id)
    {
      Some(existing) => *existing = result,
      None => self.node_results.push(result),
    }
  }

  /// Whether an edge from `source` over `handle` delivered items.
  pub fn edge_live(&self, source: &str, handle: &str) -> bool {
    self.status(source) == Some(NodeRunStatus::Completed)
      && self
        .active_handles
        .get(source)
        .is_some_and(|handles| handles.iter().any(|h| h == handle))
  }

  /// First failing node's error message, if any.
  pub fn first_error(&self) -> Option<String> {
    let failed = self.failed_node.as_deref()?;
    self
      .node_results
      .iter()
      .find(|r| r.node_id == failed)
      .and_then(|r| r.error.clone())
  }

  /// Enqueue a node unless it is resolved, out of plan, or already queued.
  pub fn enqueue(&mut self, node_id: &str) {
    if !self.plan.contains(node_id) || self.resolved(node_id) {
      return;
    }
    if self.frontier.iter().any(|queued| queued == node_id) {
      return;
    }
    self.frontier.push_back(node_id.to_string());
  }
}

/// The trigger node a given invocation enters through.
fn find_entry(workflow: &Workflow, trigger_type: TriggerType) -> Result<String, ExecutorError> {
  let preferred = match trigger_type {
    TriggerType::Webhook => NodeKind::Webhook,
    TriggerType::SubWorkflow => NodeKind::WorkflowInput,
    TriggerType::Manual | TriggerType::Schedule | TriggerType::Debug => NodeKind::Trigger,
  };

  if let Some(node) = workflow.entry_node(preferred) {
    return Ok(node.node_id.clone());
  }
  // Fall back to any trigger kind so a manual run of a webhook-only
  // workflow still has an entry.
  for kind in [NodeKind::Trigger, NodeKind::Webhook, NodeKind::WorkflowInput] {
    if let Some(node) = workflow.entry_node(kind) {
      return Ok(node.node_id.clone());
    }
  }
  Err(ExecutorError::InvalidGraph {
    message: "workflow has no trigger node".to_string(),
  })
}
