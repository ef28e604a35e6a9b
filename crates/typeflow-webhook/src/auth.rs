//! Webhook authentication.

use axum::http::HeaderMap;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use typeflow_model::{AuthType, Webhook};

use crate::error::IngressError;

const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

/// Enforce the webhook's auth scheme against the request.
pub fn authenticate(
  webhook: &Webhook,
  headers: &HeaderMap,
  query: &serde_json::Value,
) -> Result<(), IngressError> {
  match webhook.auth_type {
    AuthType::None => Ok(()),
    AuthType::ApiKey => check_api_key(webhook, headers, query),
    AuthType::Bearer => check_bearer(webhook, headers),
    AuthType::Basic => check_basic(webhook, headers),
  }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers.get(name).and_then(|v| v.to_str().ok())
}

fn check_api_key(
  webhook: &Webhook,
  headers: &HeaderMap,
  query: &serde_json::Value,
) -> Result<(), IngressError> {
  // An unconfigured key allows everything.
  let Some(expected) = webhook.auth_config.api_key.as_deref() else {
    return Ok(());
  };

  let header_name = webhook
    .auth_config
    .header_name
    .as_deref()
    .unwrap_or(DEFAULT_API_KEY_HEADER);

  if header_str(headers, header_name) == Some(expected) {
    return Ok(());
  }
  for param in ["api_key", "apiKey"] {
    if query.get(param).and_then(|v| v.as_str()) == Some(expected) {
      return Ok(());
    }
  }
  Err(IngressError::AuthFailed)
}

fn check_bearer(webhook: &Webhook, headers: &HeaderMap) -> Result<(), IngressError> {
  let Some(expected) = webhook.auth_config.token.as_deref() else {
    return Err(IngressError::AuthFailed);
  };
  let Some(authorization) = header_str(headers, "authorization") else {
    return Err(IngressError::AuthFailed);
  };

  // The scheme compares case-insensitively; the token does not.
  let mut parts = authorization.splitn(2, ' ');
  let scheme = parts.next().unwrap_or_default();
  let token = parts.next().unwrap_or_default().trim();
  if scheme.eq_ignore_ascii_case("bearer") && token == expected {
    Ok(())
  } else {
    Err(IngressError::AuthFailed)
  }
}

fn check_basic(webhook: &Webhook, headers: &HeaderMap) -> Result<(), IngressError> {
  let (Some(expected_user), Some(expected_pass)) = (
    webhook.auth_config.username.as_deref(),
    webhook.auth_config.password.as_deref(),
  ) else {
    return Err(IngressError::AuthFailed);
  };
  let Some(authorization) = header_str(headers, "authorization") else {
    return Err(IngressError::AuthFailed);
  };

  let mut parts = authorization.splitn(2, ' ');
  let scheme = parts.next().unwrap_or_default();
  if !scheme.eq_ignore_ascii_case("basic") {
    return Err(IngressError::AuthFailed);
  }
  let encoded = parts.next().unwrap_or_default().trim();
  let decoded = BASE64
    .decode(encoded)
    .ok()
    .and_then(|bytes| String::from_utf8(bytes).ok())
    .ok_or(IngressError::AuthFailed)?;

  match decoded.split_once(':') {
    Some((user, pass)) if user == expected_user && pass == expected_pass => Ok(()),
    _ => Err(IngressError::AuthFailed),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::HeaderValue;
  use serde_json::json;
  use typeflow_model::{AuthConfig, ResponseMode};

  fn webhook(auth_type: AuthType, auth_config: AuthConfig) -> Webhook {
    Webhook {
      webhook_id: "wh1".to_string(),
      organization_id: "org1".to_string(),
      path: "hook".to_string(),
      workflow_id: "wf1".to_string(),
      method: None,
      response_mode: ResponseMode::WaitForResult,
      is_active: true,
      auth_type,
      auth_config,
      rate_limit: 0,
    }
  }

  fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
      map.insert(
        axum::http::header::HeaderName::try_from(*name).unwrap(),
        HeaderValue::from_str(value).unwrap(),
      );
    }
    map
  }

  #[test]
  fn bearer_mismatch_is_rejected() {
    let wh = webhook(
      AuthType::Bearer,
      AuthConfig {
        token: Some("T".to_string()),
        ..Default::default()
      },
    );
    let result = authenticate(&wh, &headers(&[("authorization", "Bearer X")]), &json!({}));
    assert!(matches!(result, Err(IngressError::AuthFailed)));
  }

  #[test]
  fn bearer_scheme_is_case_insensitive() {
    let wh = webhook(
      AuthType::Bearer,
      AuthConfig {
        token: Some("T".to_string()),
        ..Default::default()
      },
    );
    authenticate(&wh, &headers(&[("authorization", "BEARER T")]), &json!({})).unwrap();
  }

  #[test]
  fn api_key_matches_header_or_query() {
    let wh = webhook(
      AuthType::ApiKey,
      AuthConfig {
        api_key: Some("secret".to_string()),
        ..Default::default()
      },
    );
    authenticate(&wh, &headers(&[("x-api-key", "secret")]), &json!({})).unwrap();
    authenticate(&wh, &headers(&[]), &json!({"apiKey": "secret"})).unwrap();
    assert!(authenticate(&wh, &headers(&[]), &json!({})).is_err());
  }

  #[test]
  fn unconfigured_api_key_allows() {
    let wh = webhook(AuthType::ApiKey, AuthConfig::default());
    authenticate(&wh, &headers(&[]), &json!({})).unwrap();
  }

  #[test]
  fn basic_auth_decodes_and_compares() {
    let wh = webhook(
      AuthType::Basic,
      AuthConfig {
        username: Some("ada".to_string()),
        password: Some("pw".to_string()),
        ..Default::default()
      },
    );
    let encoded = BASE64.encode("ada:pw");
    authenticate(
      &wh,
      &headers(&[("authorization", &format!("Basic {}", encoded))]),
      &json!({}),
    )
    .unwrap();

    let wrong = BASE64.encode("ada:nope");
    assert!(
      authenticate(
        &wh,
        &headers(&[("authorization", &format!("Basic {}", wrong))]),
        &json!({}),
      )
      .is_err()
    );
  }
}
