//! The per-execution QuickJS sandbox.
//!
//! One [`Sandbox`] is created per workflow execution. Code nodes share its
//! context, so utility modules and the module cache persist across nodes,
//! but nothing leaks between executions because every execution gets a
//! fresh runtime.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rquickjs::prelude::{Async, Func};
use rquickjs::{AsyncContext, AsyncRuntime, CatchResultExt, CaughtError, async_with};
use rquickjs::promise::Promise;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use typeflow_credentials::HandlePool;
use typeflow_model::{ExecutionItem, LogEntry};

use crate::check::{is_suppressed, map_diagnostic};
use crate::error::{Diagnostic, SandboxError};
use crate::logsink::LogSink;
use crate::prepare::{PreparedScript, wrap_for_check, wrap_for_run, wrap_utility};
use crate::resolver::ModuleResolver;

/// Sentinel the run wrapper returns for an `undefined` result.
const UNDEFINED_SENTINEL: &str = "\u{0}undefined";

/// Extra slack on the outer timer so the interrupt handler fires first for
/// busy loops; the outer timer only catches never-resolving promises.
const OUTER_TIMEOUT_GRACE: Duration = Duration::from_millis(250);

const MEMORY_LIMIT: usize = 64 * 1024 * 1024;
const STACK_LIMIT: usize = 1024 * 1024;

/// Sandbox settings.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
  /// Organization-scoped package directory for `require`.
  pub packages_root: PathBuf,
  /// Wall-clock limit per code-node call.
  pub timeout: Duration,
  /// Cap on captured console entries.
  pub max_log_entries: usize,
}

impl SandboxConfig {
  pub fn new(packages_root: impl Into<PathBuf>) -> Self {
    Self {
      packages_root: packages_root.into(),
      timeout: Duration::from_secs(5),
      max_log_entries: 1000,
    }
  }
}

/// Armed while a script runs; the interrupt handler polls it.
struct Deadline {
  origin: Instant,
  deadline_ms: AtomicU64,
}

impl Deadline {
  fn new() -> Self {
    Self {
      origin: Instant::now(),
      deadline_ms: AtomicU64::new(0),
    }
  }

  fn arm(&self, timeout: Duration) {
    let deadline = self.origin.elapsed() + timeout;
    // 0 means disarmed, so an armed deadline is always at least 1ms out.
    self
      .deadline_ms
      .store((deadline.as_millis() as u64).max(1), Ordering::Relaxed);
  }

  fn disarm(&self) {
    self.deadline_ms.store(0, Ordering::Relaxed);
  }

  fn expired(&self) -> bool {
    let deadline = self.deadline_ms.load(Ordering::Relaxed);
    deadline != 0 && self.origin.elapsed().as_millis() as u64 > deadline
  }
}

/// One code-node invocation.
#[derive(Debug, Clone)]
pub struct CodeInvocation {
  pub node_id: String,
  pub code: String,
  /// Items arriving on this node's incoming edges, in edge order.
  pub items: Vec<ExecutionItem>,
  /// Sanitized label → output items, for every transitive predecessor.
  pub predecessors: Vec<PredecessorBinding>,
}

#[derive(Debug, Clone)]
pub struct PredecessorBinding {
  pub label: String,
  pub items: Vec<ExecutionItem>,
}

/// The per-execution QuickJS sandbox.
pub struct Sandbox {
  #[allow(dead_code)]
  runtime: AsyncRuntime,
  context: AsyncContext,
  config: SandboxConfig,
  deadline: Arc<Deadline>,
  log_sink: LogSink,
  current_node: Arc<Mutex<Option<String>>>,
  injected_labels: Mutex<HashSet<String>>,
  utility_labels: Mutex<HashSet<String>>,
}

impl Sandbox {
  /// Build a sandbox with the injected base environment.
  ///
  /// `credential_methods` lists `(name, methods)` for every credential in
  /// the organization; handles connect lazily through `credentials` on
  /// first call.
  pub async fn new(
    config: SandboxConfig,
    credentials: Option<Arc<HandlePool>>,
    credential_methods: Vec<(String, Vec<String>)>,
  ) -> Result<Self, SandboxError> {
    let runtime = AsyncRuntime::new().map_err(internal)?;
    runtime.set_memory_limit(MEMORY_LIMIT).await;
    runtime.set_max_stack_size(STACK_LIMIT).await;

    let deadline = Arc::new(Deadline::new());
    let handler_deadline = deadline.clone();
    runtime
      .set_interrupt_handler(Some(Box::new(move || handler_deadline.expired())))
      .await;

    let context = AsyncContext::full(&runtime).await.map_err(internal)?;

    let sandbox = Self {
      runtime,
      context,
      log_sink: LogSink::new(config.max_log_entries),
      config,
      deadline,
      current_node: Arc::new(Mutex::new(None)),
      injected_labels: Mutex::new(HashSet::new()),
      utility_labels: Mutex::new(HashSet::new()),
    };
    sandbox
      .install_host_environment(credentials, credential_methods)
      .await?;
    Ok(sandbox)
  }

  /// Register host functions and the base prelude.
  async fn install_host_environment(
    &self,
    credentials: Option<Arc<HandlePool>>,
    credential_methods: Vec<(String, Vec<String>)>,
  ) -> Result<(), SandboxError> {
    let resolver = ModuleResolver::new(&self.config.packages_root);
    let sink = self.log_sink.clone();
    let current_node = self.current_node.clone();

    async_with!(self.context => |ctx| {
      let globals = ctx.globals();

      globals
        .set(
          "__consoleLog",
          Func::from(move |level: String, message: String| {
            let node_id = current_node.lock().ok().and_then(|n| n.clone());
            debug!(level = %level, node_id = ?node_id, "console: {}", message);
            sink.push(&level, message, node_id);
          }),
        )
        .catch(&ctx)
        .map_err(caught_internal)?;

      globals
        .set(
          "__loadModule",
          Func::from(move |spec: String| -> String {
            match resolver.load(&spec) {
              Ok(src) => serde_json::json!({ "src": src }).to_string(),
              Err(err) => serde_json::json!({ "err": err }).to_string(),
            }
          }),
        )
        .catch(&ctx)
        .map_err(caught_internal)?;

      globals
        .set(
          "__credCall",
          Func::from(Async(move |name: String, method: String, args: String| {
            let pool = credentials.clone();
            async move {
              let response = match &pool {
                Some(pool) => {
                  let args: Vec<Value> = serde_json::from_str(&args).unwrap_or_default();
                  match pool.call(&name, &method, &args).await {
                    Ok(value) => serde_json::json!({ "ok": value }),
                    Err(e) => serde_json::json!({ "err": e.to_string() }),
                  }
                }
                None => serde_json::json!({
                  "err": format!("credential '{}' is not available", name)
                }),
              };
              response.to_string()
            }
          })),
        )
        .catch(&ctx)
        .map_err(caught_internal)?;

      let prelude = base_prelude(&credential_methods);
      ctx
        .eval::<(), _>(prelude)
        .catch(&ctx)
        .map_err(caught_internal)?;

      Ok::<(), SandboxError>(())
    })
    .await
  }

  /// Compile-check a code body without running it.
  pub async fn check(&self, code: &str) -> Result<(), SandboxError> {
    let prepared = wrap_for_check(code);
    let diagnostics = self.compile_diagnostics(prepared).await;
    let diagnostics: Vec<Diagnostic> = diagnostics
      .into_iter()
      .filter(|d| !is_suppressed(&d.message))
      .collect();
    if diagnostics.is_empty() {
      Ok(())
    } else {
      Err(SandboxError::TypeValidation { diagnostics })
    }
  }

  async fn compile_diagnostics(&self, prepared: PreparedScript) -> Vec<Diagnostic> {
    let offset = prepared.line_offset;
    async_with!(self.context => |ctx| {
      match ctx.eval::<(), _>(prepared.source.as_str()).catch(&ctx) {
        Ok(()) => Vec::new(),
        Err(caught) => vec![diagnostic_from_caught(caught, offset)],
      }
    })
    .await
  }

  /// Execute a code node.
  ///
  /// Returns `None` when the script result was `undefined` (pass-through)
  /// and the raw JSON value otherwise.
  #[instrument(name = "sandbox_run_code", skip(self, invocation), fields(node_id = %invocation.node_id))]
  pub async fn run_code(
    &self,
    invocation: CodeInvocation,
  ) -> Result<Option<Value>, SandboxError> {
    self.check(&invocation.code).await?;

    let prelude = node_prelude(&invocation, &self.previous_labels(&invocation));
    self.remember_labels(&invocation);
    let prepared = wrap_for_run(&invocation.code);

    self.set_current_node(Some(invocation.node_id.clone()));
    let outcome = self.eval_to_string(prelude, prepared.source).await;
    self.set_current_node(None);

    match outcome? {
      s if s == UNDEFINED_SENTINEL => Ok(None),
      s => serde_json::from_str(&s)
        .map(Some)
        .map_err(|e| SandboxError::Internal(format!("result decode: {}", e))),
    }
  }

  /// Compile and register a utilities node's exports as `$<label>`.
  ///
  /// The module is evaluated once; later calls for the same label are
  /// no-ops.
  #[instrument(name = "sandbox_register_utility", skip(self, code))]
  pub async fn register_utility(&self, label: &str, code: &str) -> Result<(), SandboxError> {
    {
      let Ok(mut labels) = self.utility_labels.lock() else {
        return Err(SandboxError::Internal("utility label lock".to_string()));
      };
      if !labels.insert(label.to_string()) {
        return Ok(());
      }
    }

    self.check(code).await?;
    let binding = format!("${}", label);
    let prepared = wrap_utility(code, &binding);
    self.eval_to_string(String::new(), prepared.source).await?;
    debug!(utility = %label, "utility module registered");
    Ok(())
  }

  /// Logs captured so far, draining the sink.
  pub fn take_logs(&self) -> Vec<LogEntry> {
    self.log_sink.take()
  }

  /// Evaluate an optional prelude then a script that resolves to a string.
  async fn eval_to_string(
    &self,
    prelude: String,
    source: String,
  ) -> Result<String, SandboxError> {
    self.deadline.arm(self.config.timeout);
    let outer = self.config.timeout + OUTER_TIMEOUT_GRACE;

    let result = tokio::time::timeout(
      outer,
      async_with!(self.context => |ctx| {
        if !prelude.is_empty() {
          ctx
            .eval::<(), _>(prelude.as_str())
            .catch(&ctx)
            .map_err(caught_internal)?;
        }

        let promise: Promise<String> = ctx
          .eval(source.as_str())
          .catch(&ctx)
          .map_err(runtime_error)?;

        match promise.await {
          Ok(value) => Ok(value),
          Err(e) => {
            let caught = CaughtError::from_error(&ctx, e);
            Err(runtime_error(caught))
          }
        }
      }),
    )
    .await;
    // Read expiry before disarming; an interrupted script surfaces as a
    // runtime error and reclassifies as a timeout when the deadline caused
    // the interrupt.
    let deadline_expired = self.deadline.expired();
    self.deadline.disarm();

    let timeout_ms = self.config.timeout.as_millis() as u64;
    match result {
      Err(_) => {
        warn!(timeout_ms, "code node hit the outer timeout");
        Err(SandboxError::Timeout { timeout_ms })
      }
      Ok(Err(SandboxError::Runtime { .. })) if deadline_expired => {
        Err(SandboxError::Timeout { timeout_ms })
      }
      Ok(other) => other,
    }
  }

  fn set_current_node(&self, node_id: Option<String>) {
    if let Ok(mut current) = self.current_node.lock() {
      *current = node_id;
    }
  }

  /// Labels injected for the previous node that the new prelude must clear.
  fn previous_labels(&self, invocation: &CodeInvocation) -> Vec<String> {
    let next: HashSet<&str> = invocation
      .predecessors
      .iter()
      .map(|p| p.label.as_str())
      .collect();
    match self.injected_labels.lock() {
      Ok(labels) => labels
        .iter()
        .filter(|label| !next.contains(label.as_str()))
        .cloned()
        .collect(),
      Err(_) => Vec::new(),
    }
  }

  fn remember_labels(&self, invocation: &CodeInvocation) {
    if let Ok(mut labels) = self.injected_labels.lock() {
      labels.clear();
      labels.extend(invocation.predecessors.iter().map(|p| p.label.clone()));
    }
  }
}

fn internal(e: rquickjs::Error) -> SandboxError {
  SandboxError::Internal(e.to_string())
}

fn caught_internal(caught: CaughtError<'_>) -> SandboxError {
  SandboxError::Internal(caught.to_string())
}

fn runtime_error(caught: CaughtError<'_>) -> SandboxError {
  SandboxError::Runtime {
    message: caught_message(&caught),
  }
}

fn caught_message(caught: &CaughtError<'_>) -> String {
  match caught {
    CaughtError::Exception(exception) => {
      let message: Option<String> = exception.get("message").ok();
      match message {
        Some(message) => message,
        None => caught.to_string(),
      }
    }
    other => other.to_string(),
  }
}

fn diagnostic_from_caught(caught: CaughtError<'_>, line_offset: usize) -> Diagnostic {
  match &caught {
    CaughtError::Exception(exception) => {
      let message: String = exception
        .get::<_, Option<String>>("message")
        .ok()
        .flatten()
        .unwrap_or_else(|| "syntax error".to_string());
      let line: Option<i64> = exception.get::<_, Option<i64>>("lineNumber").ok().flatten();
      let col: Option<i64> = exception
        .get::<_, Option<i64>>("columnNumber")
        .ok()
        .flatten();
      let stack: Option<String> = exception.get::<_, Option<String>>("stack").ok().flatten();
      map_diagnostic(message, line, col, stack.as_deref(), line_offset)
    }
    other => Diagnostic {
      line: 1,
      col: 0,
      message: other.to_string(),
    },
  }
}

/// JS installed once per sandbox: module cache + `require`, `console`, and
/// the `$credentials` method table.
fn base_prelude(credential_methods: &[(String, Vec<String>)]) -> String {
  let creds_json = serde_json::to_string(credential_methods).unwrap_or_else(|_| "[]".to_string());
  format!(
    r#""use strict";
globalThis.__defaultOf = (m) => (m && m.default !== undefined) ? m.default : m;
globalThis.__moduleCache = Object.create(null);
globalThis.require = function require(spec) {{
  if (spec in __moduleCache) return __moduleCache[spec];
  const loaded = JSON.parse(__loadModule(spec));
  if (loaded.err !== undefined) throw new Error(loaded.err);
  const module = {{ exports: {{}} }};
  __moduleCache[spec] = module.exports;
  (new Function("module", "exports", "require", loaded.src))(module, module.exports, require);
  __moduleCache[spec] = module.exports;
  return module.exports;
}};
globalThis.__fmt = (v) => typeof v === "string" ? v : JSON.stringify(v);
globalThis.console = {{
  log: (...a) => __consoleLog("info", a.map(__fmt).join(" ")),
  info: (...a) => __consoleLog("info", a.map(__fmt).join(" ")),
  warn: (...a) => __consoleLog("warn", a.map(__fmt).join(" ")),
  error: (...a) => __consoleLog("error", a.map(__fmt).join(" ")),
  debug: (...a) => __consoleLog("debug", a.map(__fmt).join(" ")),
}};
globalThis.$credentials = {{}};
for (const [name, methods] of {creds}) {{
  const handle = {{}};
  for (const method of methods) {{
    handle[method] = (...args) =>
      __credCall(name, method, JSON.stringify(args)).then((s) => {{
        const r = JSON.parse(s);
        if (r.err !== undefined) throw new Error(r.err);
        return r.ok;
      }});
  }}
  $credentials[name] = handle;
}}
"#,
    creds = creds_json
  )
}

/// JS evaluated before each code node: input bindings plus `$<label>`
/// predecessor bindings, clearing labels from the previous node.
fn node_prelude(invocation: &CodeInvocation, stale_labels: &[String]) -> String {
  let items = serde_json::to_string(&invocation.items).unwrap_or_else(|_| "[]".to_string());
  let mut prelude = String::new();
  for label in stale_labels {
    prelude.push_str(&format!("delete globalThis[\"${}\"];\n", label));
  }
  prelude.push_str(&format!("globalThis.$input = {};\n", items));
  prelude.push_str(
    "globalThis.$json = ($input[0] && $input[0].json) || {};\nglobalThis.$inputItem = $json;\nglobalThis.$inputAll = $input;\n",
  );
  for binding in &invocation.predecessors {
    let items = serde_json::to_string(&binding.items).unwrap_or_else(|_| "[]".to_string());
    prelude.push_str(&format!(
      "globalThis[\"${label}\"] = (function (items) {{ return {{ json: (items[0] && items[0].json) || {{}}, input: items }}; }})({items});\n",
      label = binding.label,
      items = items,
    ));
  }
  prelude
}
