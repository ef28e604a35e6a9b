//! Bounded log sink fed by code-node `console` calls.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use typeflow_model::LogEntry;

/// Collects console output for one execution, dropping entries past the cap.
#[derive(Clone)]
pub struct LogSink {
  entries: Arc<Mutex<Vec<LogEntry>>>,
  capacity: usize,
}

impl LogSink {
  pub fn new(capacity: usize) -> Self {
    Self {
      entries: Arc::new(Mutex::new(Vec::new())),
      capacity,
    }
  }

  pub fn push(&self, level: &str, message: String, node_id: Option<String>) {
    let Ok(mut entries) = self.entries.lock() else {
      return;
    };
    if entries.len() >= self.capacity {
      return;
    }
    entries.push(LogEntry {
      level: level.to_string(),
      message,
      node_id,
      timestamp: Utc::now(),
    });
  }

  /// Drain all collected entries.
  pub fn take(&self) -> Vec<LogEntry> {
    match self.entries.lock() {
      Ok(mut entries) => std::mem::take(&mut *entries),
      Err(_) => Vec::new(),
    }
  }

  pub fn snapshot(&self) -> Vec<LogEntry> {
    match self.entries.lock() {
      Ok(entries) => entries.clone(),
      Err(_) => Vec::new(),
    }
  }
}
