//! Typeflow Executor
//!
//! The graph executor: plan construction, frontier scheduling with
//! deterministic item routing, conditional branches, merges, sub-workflow
//! calls, and execution persistence.
//!
//! [`ExecutionEngine::execute`] drives a full run; [`ExecutionEngine::advance`]
//! over an [`ExecutionState`] is the stepping core the debug controller
//! shares.

mod branch;
mod engine;
mod error;
mod items;
mod merge;
mod state;

pub use branch::evaluate_if;
pub use engine::{
  EngineConfig, ExecutionEngine, RunOutcome, RunSession, StepPolicy, assemble_input, final_output,
  finalize, rebuild_state,
};
pub use error::ExecutorError;
pub use items::normalize_output;
pub use merge::{merge_items, remove_duplicates};
pub use state::ExecutionState;
