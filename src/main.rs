use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use typeflow_credentials::{CredentialCipher, CredentialService};
use typeflow_debug::DebugController;
use typeflow_executor::{EngineConfig, ExecutionEngine};
use typeflow_model::{TriggerType, Workflow, validate_workflow};
use typeflow_queue::{InMemoryQueue, JobQueue, QueueWorker, WorkerConfig};
use typeflow_store::SqliteStore;
use typeflow_webhook::{IngressState, router};

/// Typeflow - a workflow automation engine
#[derive(Parser)]
#[command(name = "typeflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.typeflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Serve the webhook ingress and (optionally) the queue worker
  Serve {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1:8420")]
    bind: String,
  },

  /// Run a workflow from a file; the trigger payload is read from stdin
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Validate a workflow file against the save-time rules
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Drive a debug session over a stored workflow
  Debug {
    #[command(subcommand)]
    action: DebugAction,
  },
}

#[derive(Subcommand)]
enum DebugAction {
  /// Create a session and run until the first breakpoint; the trigger
  /// payload is read from stdin
  Start {
    #[arg(long)]
    organization: String,
    #[arg(long)]
    workflow: String,
    /// Node id to break on (repeatable)
    #[arg(long = "breakpoint")]
    breakpoints: Vec<String>,
  },

  /// Execute exactly one node, then pause
  Step { session_id: String },

  /// Resume until the next breakpoint, completion, or failure
  Continue { session_id: String },

  /// Print the persisted session state
  State { session_id: String },

  /// End the session
  Terminate { session_id: String },
}

fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "typeflow=info".into()),
    )
    .init();

  let cli = Cli::parse();

  let data_dir = cli
    .data_dir
    .or_else(|| std::env::var("TYPEFLOW_DATA_DIR").ok().map(PathBuf::from))
    .unwrap_or_else(|| {
      dirs::home_dir()
        .expect("could not determine home directory")
        .join(".typeflow")
    });

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Serve { bind }) => rt.block_on(serve(bind, data_dir)),
    Some(Commands::Run { workflow_file }) => rt.block_on(run_workflow(workflow_file, data_dir)),
    Some(Commands::Validate { workflow_file }) => validate_file(workflow_file),
    Some(Commands::Debug { action }) => rt.block_on(run_debug(action, data_dir)),
    None => {
      println!("typeflow - use --help to see available commands");
      Ok(())
    }
  }
}

/// Build the shared services from the environment.
async fn bootstrap(data_dir: &PathBuf) -> Result<(Arc<SqliteStore>, Arc<ExecutionEngine>)> {
  std::fs::create_dir_all(data_dir)
    .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

  let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
    format!(
      "sqlite://{}?mode=rwc",
      data_dir.join("typeflow.db").display()
    )
  });
  let store = Arc::new(
    SqliteStore::connect(&database_url)
      .await
      .context("failed to open the database")?,
  );

  let credentials = match std::env::var("TYPEFLOW_ENCRYPTION_KEY") {
    Ok(hex_key) => {
      let cipher =
        CredentialCipher::from_hex_key(&hex_key).context("TYPEFLOW_ENCRYPTION_KEY is invalid")?;
      Some(Arc::new(CredentialService::new(store.clone(), cipher)))
    }
    Err(_) => {
      tracing::warn!("TYPEFLOW_ENCRYPTION_KEY not set; credentials are unavailable");
      None
    }
  };

  let engine = Arc::new(ExecutionEngine::new(
    store.clone(),
    credentials,
    EngineConfig::new(data_dir.join("packages")),
  ));
  Ok((store, engine))
}

async fn serve(bind: String, data_dir: PathBuf) -> Result<()> {
  let (store, engine) = bootstrap(&data_dir).await?;
  let cancel = CancellationToken::new();

  let queue_enabled = std::env::var("ENABLE_WORKER_QUEUE")
    .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
    .unwrap_or(false);

  let (queue, worker_handle) = if queue_enabled {
    let (queue, receiver) = InMemoryQueue::channel();
    let concurrency = std::env::var("WORKER_CONCURRENCY")
      .ok()
      .and_then(|v| v.parse().ok())
      .unwrap_or(5);
    let worker = QueueWorker::new(
      engine.clone(),
      WorkerConfig {
        concurrency,
        ..WorkerConfig::default()
      },
    );
    let worker_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
      worker.run(receiver, None, worker_cancel).await;
    });
    (Some(Arc::new(queue) as Arc<dyn JobQueue>), Some(handle))
  } else {
    (None, None)
  };

  let app = router(Arc::new(IngressState::new(store, engine, queue)));
  let listener = tokio::net::TcpListener::bind(&bind)
    .await
    .with_context(|| format!("failed to bind {}", bind))?;
  tracing::info!(bind = %bind, queue_enabled, "typeflow serving");

  let shutdown_cancel = cancel.clone();
  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      tokio::signal::ctrl_c().await.ok();
      shutdown_cancel.cancel();
    })
    .await
    .context("server error")?;

  // Drain in-flight jobs before exiting.
  cancel.cancel();
  if let Some(handle) = worker_handle {
    handle.await.ok();
  }
  Ok(())
}

async fn run_workflow(workflow_file: PathBuf, data_dir: PathBuf) -> Result<()> {
  let workflow = load_workflow(&workflow_file)?;
  validate_workflow(&workflow).context("workflow failed validation")?;

  let payload = read_payload_from_stdin()?;
  eprintln!("Running workflow: {}", workflow.name);

  let (_store, engine) = bootstrap(&data_dir).await?;
  let execution = engine
    .execute(
      &workflow,
      TriggerType::Manual,
      payload,
      None,
      CancellationToken::new(),
    )
    .await
    .context("execution failed")?;

  println!("{}", serde_json::to_string_pretty(&execution)?);
  Ok(())
}

async fn run_debug(action: DebugAction, data_dir: PathBuf) -> Result<()> {
  let (store, engine) = bootstrap(&data_dir).await?;
  let controller = DebugController::new(store, engine);

  let session = match action {
    DebugAction::Start {
      organization,
      workflow,
      breakpoints,
    } => {
      let payload = read_payload_from_stdin()?;
      let session = controller
        .create_session(
          &organization,
          &workflow,
          breakpoints.into_iter().collect(),
          payload,
        )
        .await?;
      controller.start(&session.session_id).await?
    }
    DebugAction::Step { session_id } => controller.step_over(&session_id).await?,
    DebugAction::Continue { session_id } => controller.continue_session(&session_id).await?,
    DebugAction::State { session_id } => controller.get_state(&session_id).await?,
    DebugAction::Terminate { session_id } => controller.terminate(&session_id).await?,
  };

  println!("{}", serde_json::to_string_pretty(&session)?);
  Ok(())
}

fn validate_file(workflow_file: PathBuf) -> Result<()> {
  let workflow = load_workflow(&workflow_file)?;
  validate_workflow(&workflow).context("workflow failed validation")?;
  println!("{} is valid", workflow_file.display());
  Ok(())
}

fn load_workflow(workflow_file: &PathBuf) -> Result<Workflow> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))
}

/// Read an optional JSON payload from stdin (empty input means none).
fn read_payload_from_stdin() -> Result<Option<serde_json::Value>> {
  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read stdin")?;
  let input = input.trim();
  if input.is_empty() {
    return Ok(None);
  }
  let payload = serde_json::from_str(input).context("stdin is not valid JSON")?;
  Ok(Some(payload))
}
