//! The webhook ingress pipeline.
//!
//! `METHOD /api/webhooks/{organization_id}/{path}` for any verb. The
//! pipeline stops at the first failure: lookup, rate limit, active checks,
//! auth, method gate, body parse, request capture, dispatch. Requests are
//! persisted before dispatch.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use chrono::Utc;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use typeflow_executor::ExecutionEngine;
use typeflow_model::{
  Execution, ExecutionStatus, ResponseMode, TriggerType, Webhook, WebhookRequestRecord,
};
use typeflow_queue::{JobQueue, WorkflowJob};
use typeflow_store::Store;

use crate::auth::authenticate;
use crate::body::{parse_body, parse_cookies, parse_query};
use crate::error::IngressError;
use crate::limit::WebhookRateLimiter;

/// Shared ingress state.
pub struct IngressState {
  pub store: Arc<dyn Store>,
  pub engine: Arc<ExecutionEngine>,
  /// Async dispatch target; `None` means the queue is disabled and every
  /// request executes inline.
  pub queue: Option<Arc<dyn JobQueue>>,
  pub limiter: WebhookRateLimiter,
}

impl IngressState {
  pub fn new(
    store: Arc<dyn Store>,
    engine: Arc<ExecutionEngine>,
    queue: Option<Arc<dyn JobQueue>>,
  ) -> Self {
    Self {
      store,
      engine,
      queue,
      limiter: WebhookRateLimiter::new(),
    }
  }
}

/// Build the ingress router.
pub fn router(state: Arc<IngressState>) -> Router {
  Router::new()
    .route("/api/webhooks/:organization_id/*path", any(handle_webhook))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn handle_webhook(
  State(state): State<Arc<IngressState>>,
  Path((organization_id, path)): Path<(String, String)>,
  method: Method,
  uri: Uri,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  match process(&state, &organization_id, &path, method, uri, headers, body).await {
    Ok(response) => response,
    Err(e) => e.into_response(),
  }
}

#[instrument(name = "webhook_request", skip_all, fields(organization_id = %organization_id, path = %path))]
async fn process(
  state: &IngressState,
  organization_id: &str,
  path: &str,
  method: Method,
  uri: Uri,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Response, IngressError> {
  // 1. Lookup.
  let webhook = match state.store.get_webhook(organization_id, path).await {
    Ok(webhook) => webhook,
    Err(typeflow_store::Error::NotFound(_)) => return Err(IngressError::NotFound),
    Err(e) => return Err(IngressError::Internal(e.to_string())),
  };

  // 2. Rate limit.
  state
    .limiter
    .check(organization_id, path, webhook.rate_limit)?;

  // 3. Active checks.
  if !webhook.is_active {
    return Err(IngressError::Inactive);
  }
  let workflow = state
    .store
    .get_workflow(organization_id, &webhook.workflow_id)
    .await?;
  if !workflow.active {
    return Err(IngressError::Inactive);
  }

  // 4. Auth.
  let query = parse_query(uri.query());
  authenticate(&webhook, &headers, &query)?;

  // 5. Method gate.
  if let Some(expected) = &webhook.method {
    if !expected.eq_ignore_ascii_case(method.as_str()) {
      return Err(IngressError::MethodNotAllowed);
    }
  }

  // 6. Body parse. Failures yield an empty body, never an abort.
  let content_type = header_str(&headers, "content-type").unwrap_or_default();
  let parsed_body = parse_body(&content_type, &body);
  let cookies = parse_cookies(header_str(&headers, "cookie").as_deref());
  let raw_body = String::from_utf8_lossy(&body).into_owned();
  let received_at = Utc::now();

  // 7. Persist the captured request before dispatch.
  let record = WebhookRequestRecord {
    request_id: uuid::Uuid::new_v4().to_string(),
    webhook_id: webhook.webhook_id.clone(),
    organization_id: organization_id.to_string(),
    path: path.to_string(),
    method: method.to_string(),
    url: uri.to_string(),
    headers: headers_to_json(&headers),
    body: parsed_body.clone(),
    query: query.clone(),
    cookies: cookies.clone(),
    raw_body: raw_body.clone(),
    received_at,
  };
  state
    .store
    .record_webhook_request(&record)
    .await
    .map_err(|e| IngressError::Internal(e.to_string()))?;

  let trigger_data = trigger_payload(
    &webhook,
    organization_id,
    path,
    &method,
    &uri,
    &headers,
    parsed_body,
    raw_body,
    query,
    cookies,
    &content_type,
    received_at,
  );

  // 8. Dispatch.
  if webhook.response_mode == ResponseMode::RespondImmediately {
    if let Some(queue) = &state.queue {
      let mut job = WorkflowJob::new(
        &webhook.workflow_id,
        organization_id,
        TriggerType::Webhook,
        Some(trigger_data),
      );
      job.webhook_path = Some(path.to_string());
      let job_id = queue
        .enqueue(job)
        .map_err(|e| IngressError::Queue(e.to_string()))?;
      info!(job_id = %job_id, "webhook request queued");
      return Ok(
        (
          StatusCode::ACCEPTED,
          Json(json!({ "success": true, "jobId": job_id, "status": "queued" })),
        )
          .into_response(),
      );
    }
  }

  // Inline: the engine creates the execution row, runs, and updates it.
  let execution = state
    .engine
    .execute(
      &workflow,
      TriggerType::Webhook,
      Some(trigger_data),
      None,
      CancellationToken::new(),
    )
    .await
    .map_err(|e| IngressError::Internal(e.to_string()))?;

  Ok(shape_response(&execution))
}

/// Shape the synchronous response from the execution's final output.
///
/// A first item whose json is exactly `{"value": v}` unwraps to `v`; a
/// failed execution answers 500 with the failing node's message.
fn shape_response(execution: &Execution) -> Response {
  if execution.status != ExecutionStatus::Completed {
    let message = execution
      .error
      .clone()
      .unwrap_or_else(|| "execution failed".to_string());
    return (
      StatusCode::INTERNAL_SERVER_ERROR,
      Json(json!({ "success": false, "error": message })),
    )
      .into_response();
  }

  let Some(first) = execution.result.first() else {
    return Json(json!({})).into_response();
  };

  if first.json.len() == 1 {
    if let Some(value) = first.json.get("value") {
      return Json(value.clone()).into_response();
    }
  }
  Json(Value::Object(first.json.clone())).into_response()
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(|s| s.to_string())
}

fn headers_to_json(headers: &HeaderMap) -> Value {
  let mut map = serde_json::Map::new();
  for (name, value) in headers {
    if let Ok(value) = value.to_str() {
      map.insert(name.to_string(), Value::String(value.to_string()));
    }
  }
  Value::Object(map)
}

#[allow(clippy::too_many_arguments)]
fn trigger_payload(
  webhook: &Webhook,
  organization_id: &str,
  path: &str,
  method: &Method,
  uri: &Uri,
  headers: &HeaderMap,
  body: Value,
  raw_body: String,
  query: Value,
  cookies: Value,
  content_type: &str,
  received_at: chrono::DateTime<Utc>,
) -> Value {
  let host = header_str(headers, "host").unwrap_or_default();
  let (hostname, port) = match host.split_once(':') {
    Some((hostname, port)) => (hostname.to_string(), port.to_string()),
    None => (host.clone(), String::new()),
  };
  let client_ip = header_str(headers, "x-forwarded-for")
    .map(|v| v.split(',').next().unwrap_or_default().trim().to_string())
    .or_else(|| header_str(headers, "x-real-ip"))
    .unwrap_or_default();

  json!({
    "method": method.to_string(),
    "url": uri.to_string(),
    "protocol": uri.scheme_str().unwrap_or("http"),
    "host": host,
    "hostname": hostname,
    "port": port,
    "pathname": uri.path(),
    "headers": headers_to_json(headers),
    "body": body,
    "rawBody": raw_body,
    "query": query,
    "cookies": cookies,
    "params": { "organizationId": organization_id, "path": path },
    "client": {
      "ip": client_ip,
      "userAgent": header_str(headers, "user-agent").unwrap_or_default(),
      "referer": header_str(headers, "referer").unwrap_or_default(),
      "origin": header_str(headers, "origin").unwrap_or_default(),
    },
    "webhookId": webhook.webhook_id,
    "receivedAt": received_at.to_rfc3339(),
    "contentType": content_type,
  })
}
