//! Ingress errors and their HTTP mapping.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Failures in the ingress pipeline. Each maps to one response code; none
/// of them reach the executor.
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
  /// No webhook registered at this path.
  #[error("webhook not found")]
  NotFound,

  /// The per-webhook rate limit rejected the request.
  #[error("rate limit exceeded")]
  RateLimited {
    retry_after_secs: u64,
    reset_at_epoch_secs: i64,
  },

  /// The webhook or its workflow is inactive.
  #[error("webhook is inactive")]
  Inactive,

  /// Authentication failed.
  #[error("authentication failed")]
  AuthFailed,

  /// The webhook restricts the HTTP method.
  #[error("method not allowed")]
  MethodNotAllowed,

  /// Enqueueing the job failed; the executor is unaffected.
  #[error("queue error: {0}")]
  Queue(String),

  /// Storage failure while handling the request.
  #[error("internal error: {0}")]
  Internal(String),
}

impl From<typeflow_store::Error> for IngressError {
  fn from(e: typeflow_store::Error) -> Self {
    match e {
      typeflow_store::Error::NotFound(_) => IngressError::NotFound,
      other => IngressError::Internal(other.to_string()),
    }
  }
}

impl IntoResponse for IngressError {
  fn into_response(self) -> Response {
    let status = match &self {
      IngressError::NotFound => StatusCode::NOT_FOUND,
      IngressError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
      IngressError::Inactive => StatusCode::FORBIDDEN,
      IngressError::AuthFailed => StatusCode::UNAUTHORIZED,
      IngressError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
      IngressError::Queue(_) | IngressError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = Json(json!({ "success": false, "error": self.to_string() }));
    let mut response = (status, body).into_response();

    if let IngressError::RateLimited {
      retry_after_secs,
      reset_at_epoch_secs,
    } = &self
    {
      let headers = response.headers_mut();
      if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        headers.insert("retry-after", value);
      }
      if let Ok(value) = HeaderValue::from_str(&reset_at_epoch_secs.to_string()) {
        headers.insert("x-ratelimit-reset", value);
      }
    }

    response
  }
}
