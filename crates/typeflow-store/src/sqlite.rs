use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::types::Json;
use typeflow_model::{
  Credential, DebugSession, Execution, ExecutionStatus, LogEntry, Package, Webhook,
  WebhookRequestRecord, Workflow,
};

use crate::rows::{
  CredentialRow, DebugSessionRow, ExecutionRow, PackageRow, WebhookRequestRow, WebhookRow,
  WorkflowRow, execution_columns, workflow_columns,
};
use crate::{Error, Store, StoredCredential};

/// Serialize a unit enum to its serde string form for a TEXT column.
fn enum_str<T: serde::Serialize>(value: &T) -> String {
  match serde_json::to_value(value) {
    Ok(Value::String(s)) => s,
    _ => String::new(),
  }
}

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Connect to a database URL and run migrations.
  pub async fn connect(database_url: &str) -> Result<Self, Error> {
    let pool = SqlitePool::connect(database_url).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("../../migrations")
      .run(&self.pool)
      .await
      .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn save_workflow(&self, workflow: &Workflow) -> Result<(), Error> {
    let (metadata, nodes, connections) = workflow_columns(workflow);
    sqlx::query(
      r#"
            INSERT INTO workflows (workflow_id, organization_id, name, description, version, active, metadata, nodes, connections, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (organization_id, workflow_id) DO UPDATE SET
              name = excluded.name,
              description = excluded.description,
              version = excluded.version,
              active = excluded.active,
              metadata = excluded.metadata,
              nodes = excluded.nodes,
              connections = excluded.connections,
              updated_at = excluded.updated_at
            "#,
    )
    .bind(&workflow.workflow_id)
    .bind(&workflow.organization_id)
    .bind(&workflow.name)
    .bind(&workflow.description)
    .bind(workflow.version)
    .bind(workflow.active)
    .bind(metadata)
    .bind(nodes)
    .bind(connections)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_workflow(
    &self,
    organization_id: &str,
    workflow_id: &str,
  ) -> Result<Workflow, Error> {
    let row: WorkflowRow = sqlx::query_as(
      r#"
            SELECT workflow_id, organization_id, name, description, version, active, metadata, nodes, connections
            FROM workflows
            WHERE organization_id = ? AND workflow_id = ?
            "#,
    )
    .bind(organization_id)
    .bind(workflow_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("workflow '{}'", workflow_id)))?;

    row.into_model()
  }

  async fn list_workflows(&self, organization_id: &str) -> Result<Vec<Workflow>, Error> {
    let rows: Vec<WorkflowRow> = sqlx::query_as(
      r#"
            SELECT workflow_id, organization_id, name, description, version, active, metadata, nodes, connections
            FROM workflows
            WHERE organization_id = ?
            ORDER BY name ASC
            "#,
    )
    .bind(organization_id)
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(|r| r.into_model()).collect()
  }

  async fn delete_workflow(&self, organization_id: &str, workflow_id: &str) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            DELETE FROM workflows
            WHERE organization_id = ? AND workflow_id = ?
            "#,
    )
    .bind(organization_id)
    .bind(workflow_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("workflow '{}'", workflow_id)));
    }
    Ok(())
  }

  async fn create_execution(&self, execution: &Execution) -> Result<(), Error> {
    let (node_results, result, logs) = execution_columns(execution);
    sqlx::query(
      r#"
            INSERT INTO executions (execution_id, workflow_id, organization_id, status, trigger_type, trigger_data, node_results, result, error, parent_execution_id, logs, started_at, completed_at, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&execution.execution_id)
    .bind(&execution.workflow_id)
    .bind(&execution.organization_id)
    .bind(execution.status.as_str())
    .bind(execution.trigger_type.as_str())
    .bind(execution.trigger_data.clone().map(Json))
    .bind(node_results)
    .bind(result)
    .bind(&execution.error)
    .bind(&execution.parent_execution_id)
    .bind(logs)
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .bind(execution.duration_ms)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn update_execution(&self, execution: &Execution) -> Result<(), Error> {
    let (node_results, result, logs) = execution_columns(execution);
    sqlx::query(
      r#"
            UPDATE executions
            SET status = ?, node_results = ?, result = ?, error = ?, logs = ?, completed_at = ?, duration_ms = ?
            WHERE execution_id = ?
            "#,
    )
    .bind(execution.status.as_str())
    .bind(node_results)
    .bind(result)
    .bind(&execution.error)
    .bind(logs)
    .bind(execution.completed_at)
    .bind(execution.duration_ms)
    .bind(&execution.execution_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn update_execution_status(
    &self,
    execution_id: &str,
    status: ExecutionStatus,
    completed_at: Option<DateTime<Utc>>,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE executions
            SET status = ?, completed_at = ?
            WHERE execution_id = ?
            "#,
    )
    .bind(status.as_str())
    .bind(completed_at)
    .bind(execution_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<Execution, Error> {
    let row: ExecutionRow = sqlx::query_as(
      r#"
            SELECT execution_id, workflow_id, organization_id, status, trigger_type, trigger_data, node_results, result, error, parent_execution_id, logs, started_at, completed_at, duration_ms
            FROM executions
            WHERE execution_id = ?
            "#,
    )
    .bind(execution_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("execution '{}'", execution_id)))?;

    row.into_model()
  }

  async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, Error> {
    let rows: Vec<ExecutionRow> = sqlx::query_as(
      r#"
            SELECT execution_id, workflow_id, organization_id, status, trigger_type, trigger_data, node_results, result, error, parent_execution_id, logs, started_at, completed_at, duration_ms
            FROM executions
            WHERE workflow_id = ?
            ORDER BY started_at DESC
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(|r| r.into_model()).collect()
  }

  async fn append_execution_log(&self, execution_id: &str, entry: &LogEntry) -> Result<(), Error> {
    let entry_json =
      serde_json::to_string(entry).map_err(|e| Error::Corrupt(format!("log entry: {}", e)))?;
    sqlx::query(
      r#"
            UPDATE executions
            SET logs = json_insert(logs, '$[#]', json(?))
            WHERE execution_id = ?
            "#,
    )
    .bind(entry_json)
    .bind(execution_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn save_webhook(&self, webhook: &Webhook) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO webhooks (webhook_id, organization_id, path, workflow_id, method, response_mode, is_active, auth_type, auth_config, rate_limit, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (organization_id, path) DO UPDATE SET
              workflow_id = excluded.workflow_id,
              method = excluded.method,
              response_mode = excluded.response_mode,
              is_active = excluded.is_active,
              auth_type = excluded.auth_type,
              auth_config = excluded.auth_config,
              rate_limit = excluded.rate_limit
            "#,
    )
    .bind(&webhook.webhook_id)
    .bind(&webhook.organization_id)
    .bind(&webhook.path)
    .bind(&webhook.workflow_id)
    .bind(&webhook.method)
    .bind(enum_str(&webhook.response_mode))
    .bind(webhook.is_active)
    .bind(enum_str(&webhook.auth_type))
    .bind(Json(
      serde_json::to_value(&webhook.auth_config).unwrap_or(Value::Null),
    ))
    .bind(webhook.rate_limit as i64)
    .bind(Utc::now())
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_webhook(&self, organization_id: &str, path: &str) -> Result<Webhook, Error> {
    let row: WebhookRow = sqlx::query_as(
      r#"
            SELECT webhook_id, organization_id, path, workflow_id, method, response_mode, is_active, auth_type, auth_config, rate_limit
            FROM webhooks
            WHERE organization_id = ? AND path = ?
            "#,
    )
    .bind(organization_id)
    .bind(path)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("webhook '{}/{}'", organization_id, path)))?;

    row.into_model()
  }

  async fn list_webhooks(&self, organization_id: &str) -> Result<Vec<Webhook>, Error> {
    let rows: Vec<WebhookRow> = sqlx::query_as(
      r#"
            SELECT webhook_id, organization_id, path, workflow_id, method, response_mode, is_active, auth_type, auth_config, rate_limit
            FROM webhooks
            WHERE organization_id = ?
            ORDER BY path ASC
            "#,
    )
    .bind(organization_id)
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(|r| r.into_model()).collect()
  }

  async fn delete_webhook(&self, webhook_id: &str) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM webhooks WHERE webhook_id = ?")
      .bind(webhook_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("webhook '{}'", webhook_id)));
    }
    Ok(())
  }

  async fn record_webhook_request(&self, request: &WebhookRequestRecord) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO webhook_requests (request_id, webhook_id, organization_id, path, method, url, headers, body, query, cookies, raw_body, received_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&request.request_id)
    .bind(&request.webhook_id)
    .bind(&request.organization_id)
    .bind(&request.path)
    .bind(&request.method)
    .bind(&request.url)
    .bind(Json(request.headers.clone()))
    .bind(Json(request.body.clone()))
    .bind(Json(request.query.clone()))
    .bind(Json(request.cookies.clone()))
    .bind(&request.raw_body)
    .bind(request.received_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn latest_webhook_request(
    &self,
    webhook_id: &str,
  ) -> Result<WebhookRequestRecord, Error> {
    let row: WebhookRequestRow = sqlx::query_as(
      r#"
            SELECT request_id, webhook_id, organization_id, path, method, url, headers, body, query, cookies, raw_body, received_at
            FROM webhook_requests
            WHERE webhook_id = ?
            ORDER BY received_at DESC
            LIMIT 1
            "#,
    )
    .bind(webhook_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("requests for webhook '{}'", webhook_id)))?;

    Ok(row.into_model())
  }

  async fn save_credential(&self, stored: &StoredCredential) -> Result<(), Error> {
    let credential = &stored.credential;
    sqlx::query(
      r#"
            INSERT INTO credentials (credential_id, organization_id, name, kind, config, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (organization_id, name) DO UPDATE SET
              kind = excluded.kind,
              config = excluded.config,
              updated_at = excluded.updated_at
            "#,
    )
    .bind(&credential.credential_id)
    .bind(&credential.organization_id)
    .bind(&credential.name)
    .bind(credential.kind.as_str())
    .bind(&stored.ciphertext)
    .bind(credential.created_at)
    .bind(credential.updated_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_credential(
    &self,
    organization_id: &str,
    name: &str,
  ) -> Result<StoredCredential, Error> {
    let row: CredentialRow = sqlx::query_as(
      r#"
            SELECT credential_id, organization_id, name, kind, config, created_at, updated_at
            FROM credentials
            WHERE organization_id = ? AND name = ?
            "#,
    )
    .bind(organization_id)
    .bind(name)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("credential '{}'", name)))?;

    row.into_model()
  }

  async fn list_credentials(&self, organization_id: &str) -> Result<Vec<Credential>, Error> {
    let rows: Vec<CredentialRow> = sqlx::query_as(
      r#"
            SELECT credential_id, organization_id, name, kind, config, created_at, updated_at
            FROM credentials
            WHERE organization_id = ?
            ORDER BY name ASC
            "#,
    )
    .bind(organization_id)
    .fetch_all(&self.pool)
    .await?;

    rows
      .into_iter()
      .map(|r| r.into_model().map(|s| s.credential))
      .collect()
  }

  async fn delete_credential(&self, credential_id: &str) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM credentials WHERE credential_id = ?")
      .bind(credential_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("credential '{}'", credential_id)));
    }
    Ok(())
  }

  async fn save_debug_session(&self, session: &DebugSession) -> Result<(), Error> {
    let state =
      serde_json::to_value(session).map_err(|e| Error::Corrupt(format!("debug session: {}", e)))?;
    sqlx::query(
      r#"
            INSERT INTO debug_sessions (session_id, workflow_id, organization_id, status, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (session_id) DO UPDATE SET
              status = excluded.status,
              state = excluded.state,
              updated_at = excluded.updated_at
            "#,
    )
    .bind(&session.session_id)
    .bind(&session.workflow_id)
    .bind(&session.organization_id)
    .bind(session.status.as_str())
    .bind(Json(state))
    .bind(session.created_at)
    .bind(session.updated_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_debug_session(&self, session_id: &str) -> Result<DebugSession, Error> {
    let row: DebugSessionRow = sqlx::query_as(
      r#"
            SELECT state
            FROM debug_sessions
            WHERE session_id = ?
            "#,
    )
    .bind(session_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("debug session '{}'", session_id)))?;

    row.into_model()
  }

  async fn list_debug_sessions(&self, workflow_id: &str) -> Result<Vec<DebugSession>, Error> {
    let rows: Vec<DebugSessionRow> = sqlx::query_as(
      r#"
            SELECT state
            FROM debug_sessions
            WHERE workflow_id = ?
            ORDER BY updated_at DESC
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(|r| r.into_model()).collect()
  }

  async fn save_package(&self, package: &Package) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO packages (organization_id, name, version, types, installed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (organization_id, name) DO UPDATE SET
              version = excluded.version,
              types = excluded.types,
              installed_at = excluded.installed_at
            "#,
    )
    .bind(&package.organization_id)
    .bind(&package.name)
    .bind(&package.version)
    .bind(&package.types)
    .bind(package.installed_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_packages(&self, organization_id: &str) -> Result<Vec<Package>, Error> {
    let rows: Vec<PackageRow> = sqlx::query_as(
      r#"
            SELECT organization_id, name, version, types, installed_at
            FROM packages
            WHERE organization_id = ?
            ORDER BY name ASC
            "#,
    )
    .bind(organization_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into_model()).collect())
  }

  async fn delete_package(&self, organization_id: &str, name: &str) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM packages WHERE organization_id = ? AND name = ?")
      .bind(organization_id)
      .bind(name)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("package '{}'", name)));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use typeflow_model::{NodeKind, TriggerType};

  async fn memory_store() -> SqliteStore {
    SqliteStore::connect("sqlite::memory:")
      .await
      .expect("in-memory store")
  }

  fn sample_workflow() -> Workflow {
    serde_json::from_value(serde_json::json!({
      "organization_id": "org1",
      "workflow_id": "wf1",
      "name": "Sample",
      "nodes": [
        {"node_id": "t", "kind": "trigger", "label": "Start"},
        {"node_id": "c", "kind": "code", "label": "Process", "config": {"code": "return $input;"}}
      ],
      "connections": [
        {"source_node_id": "t", "target_node_id": "c"}
      ]
    }))
    .expect("sample workflow")
  }

  #[tokio::test]
  async fn workflow_round_trip() {
    let store = memory_store().await;
    let workflow = sample_workflow();
    store.save_workflow(&workflow).await.unwrap();

    let loaded = store.get_workflow("org1", "wf1").await.unwrap();
    assert_eq!(loaded.name, "Sample");
    assert_eq!(loaded.nodes.len(), 2);
    assert_eq!(loaded.nodes[1].kind, NodeKind::Code);

    store.delete_workflow("org1", "wf1").await.unwrap();
    assert!(matches!(
      store.get_workflow("org1", "wf1").await,
      Err(Error::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn execution_round_trip() {
    let store = memory_store().await;
    store.save_workflow(&sample_workflow()).await.unwrap();

    let mut execution = Execution::start(
      "exec1",
      "wf1",
      "org1",
      TriggerType::Manual,
      Some(serde_json::json!({"a": 1})),
    );
    store.create_execution(&execution).await.unwrap();

    execution.status = ExecutionStatus::Completed;
    execution.completed_at = Some(Utc::now());
    execution.duration_ms = Some(12);
    store.update_execution(&execution).await.unwrap();

    let loaded = store.get_execution("exec1").await.unwrap();
    assert_eq!(loaded.status, ExecutionStatus::Completed);
    assert_eq!(loaded.trigger_data, Some(serde_json::json!({"a": 1})));
    assert_eq!(loaded.duration_ms, Some(12));
  }

  #[tokio::test]
  async fn webhook_upsert_is_keyed_by_org_and_path() {
    let store = memory_store().await;
    let mut webhook: typeflow_model::Webhook = serde_json::from_value(serde_json::json!({
      "webhook_id": "wh1",
      "organization_id": "org1",
      "path": "orders",
      "workflow_id": "wf1",
      "rate_limit": 5
    }))
    .unwrap();
    store.save_webhook(&webhook).await.unwrap();

    // Saving the same (org, path) replaces the row.
    webhook.rate_limit = 10;
    store.save_webhook(&webhook).await.unwrap();

    let loaded = store.get_webhook("org1", "orders").await.unwrap();
    assert_eq!(loaded.rate_limit, 10);
    assert_eq!(store.list_webhooks("org1").await.unwrap().len(), 1);

    store.delete_webhook("wh1").await.unwrap();
    assert!(matches!(
      store.get_webhook("org1", "orders").await,
      Err(Error::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn webhook_requests_order_by_recency() {
    let store = memory_store().await;
    for i in 0i64..2 {
      let record: typeflow_model::WebhookRequestRecord =
        serde_json::from_value(serde_json::json!({
          "request_id": format!("req{}", i),
          "webhook_id": "wh1",
          "organization_id": "org1",
          "path": "orders",
          "method": "POST",
          "url": "/api/webhooks/org1/orders",
          "headers": {},
          "body": {"seq": i},
          "query": {},
          "cookies": {},
          "raw_body": "",
          "received_at": chrono::Utc::now() + chrono::Duration::seconds(i)
        }))
        .unwrap();
      store.record_webhook_request(&record).await.unwrap();
    }

    let latest = store.latest_webhook_request("wh1").await.unwrap();
    assert_eq!(latest.request_id, "req1");
  }

  #[tokio::test]
  async fn credential_ciphertext_round_trips() {
    let store = memory_store().await;
    let stored = crate::StoredCredential {
      credential: typeflow_model::Credential {
        credential_id: "cred1".to_string(),
        organization_id: "org1".to_string(),
        name: "maindb".to_string(),
        kind: typeflow_model::CredentialKind::Postgres,
        created_at: Utc::now(),
        updated_at: Utc::now(),
      },
      ciphertext: vec![1, 2, 3, 255],
    };
    store.save_credential(&stored).await.unwrap();

    let loaded = store.get_credential("org1", "maindb").await.unwrap();
    assert_eq!(loaded.ciphertext, vec![1, 2, 3, 255]);
    assert_eq!(
      loaded.credential.kind,
      typeflow_model::CredentialKind::Postgres
    );

    let listed = store.list_credentials("org1").await.unwrap();
    assert_eq!(listed.len(), 1);

    store.delete_credential("cred1").await.unwrap();
    assert!(store.list_credentials("org1").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn debug_session_snapshot_round_trips() {
    let store = memory_store().await;
    let mut session = typeflow_model::DebugSession::new(
      "sess1",
      "wf1",
      "org1",
      std::collections::BTreeSet::from(["n3".to_string()]),
      Some(serde_json::json!({"go": true})),
    );
    store.save_debug_session(&session).await.unwrap();

    session.status = typeflow_model::DebugStatus::Paused;
    session.current_node_id = Some("n3".to_string());
    session.next_node_ids = vec!["n3".to_string(), "n4".to_string()];
    store.save_debug_session(&session).await.unwrap();

    let loaded = store.get_debug_session("sess1").await.unwrap();
    assert_eq!(loaded.status, typeflow_model::DebugStatus::Paused);
    assert_eq!(loaded.current_node_id.as_deref(), Some("n3"));
    assert_eq!(loaded.next_node_ids, vec!["n3", "n4"]);

    assert_eq!(store.list_debug_sessions("wf1").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn package_upsert_and_delete() {
    let store = memory_store().await;
    let mut package = typeflow_model::Package {
      organization_id: "org1".to_string(),
      name: "lodash".to_string(),
      version: "4.17.21".to_string(),
      types: Some("declare module 'lodash';".to_string()),
      installed_at: Utc::now(),
    };
    store.save_package(&package).await.unwrap();

    package.version = "4.17.22".to_string();
    store.save_package(&package).await.unwrap();

    let listed = store.list_packages("org1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].version, "4.17.22");

    store.delete_package("org1", "lodash").await.unwrap();
    assert!(store.list_packages("org1").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn append_log_accumulates_entries() {
    let store = memory_store().await;
    let execution = Execution::start("exec2", "wf1", "org1", TriggerType::Manual, None);
    store.create_execution(&execution).await.unwrap();

    for i in 0..3 {
      let entry = LogEntry {
        level: "info".to_string(),
        message: format!("line {}", i),
        node_id: Some("c".to_string()),
        timestamp: Utc::now(),
      };
      store.append_execution_log("exec2", &entry).await.unwrap();
    }

    let loaded = store.get_execution("exec2").await.unwrap();
    assert_eq!(loaded.logs.len(), 3);
    assert_eq!(loaded.logs[2].message, "line 2");
  }
}
