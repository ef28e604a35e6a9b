//! Request body and query parsing.
//!
//! Parse failures never abort the pipeline: the body falls back to an
//! empty object and the raw bytes stay available on the captured request.

use serde_json::{Map, Value, json};

/// Parse the body according to its content type.
pub fn parse_body(content_type: &str, raw: &[u8]) -> Value {
  let content_type = content_type
    .split(';')
    .next()
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase();

  match content_type.as_str() {
    "application/json" => serde_json::from_slice(raw).unwrap_or_else(|_| json!({})),
    "application/x-www-form-urlencoded" => parse_urlencoded(raw),
    ct if ct.starts_with("multipart/") => {
      json!({ "raw": String::from_utf8_lossy(raw) })
    }
    "text/plain" | "text/xml" | "application/xml" | "text/html" => {
      Value::String(String::from_utf8_lossy(raw).into_owned())
    }
    _ => {
      // Best effort: JSON first, raw text second, empty object for
      // undecodable bytes.
      if raw.is_empty() {
        json!({})
      } else if let Ok(value) = serde_json::from_slice(raw) {
        value
      } else {
        Value::String(String::from_utf8_lossy(raw).into_owned())
      }
    }
  }
}

fn parse_urlencoded(raw: &[u8]) -> Value {
  let mut map = Map::new();
  for (key, value) in url::form_urlencoded::parse(raw) {
    map.insert(key.into_owned(), Value::String(value.into_owned()));
  }
  Value::Object(map)
}

/// Parse a URI query string into an object.
pub fn parse_query(query: Option<&str>) -> Value {
  match query {
    Some(query) => parse_urlencoded(query.as_bytes()),
    None => json!({}),
  }
}

/// Parse the `Cookie` header into an object.
pub fn parse_cookies(header: Option<&str>) -> Value {
  let mut map = Map::new();
  if let Some(header) = header {
    for pair in header.split(';') {
      if let Some((name, value)) = pair.split_once('=') {
        map.insert(
          name.trim().to_string(),
          Value::String(value.trim().to_string()),
        );
      }
    }
  }
  Value::Object(map)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_bodies_parse() {
    let parsed = parse_body("application/json", br#"{"a": 1}"#);
    assert_eq!(parsed, json!({"a": 1}));
  }

  #[test]
  fn broken_json_falls_back_to_empty_object() {
    let parsed = parse_body("application/json", b"{nope");
    assert_eq!(parsed, json!({}));
  }

  #[test]
  fn urlencoded_bodies_parse() {
    let parsed = parse_body("application/x-www-form-urlencoded", b"a=1&b=two%20words");
    assert_eq!(parsed, json!({"a": "1", "b": "two words"}));
  }

  #[test]
  fn text_bodies_stay_strings() {
    let parsed = parse_body("text/xml", b"<doc/>");
    assert_eq!(parsed, json!("<doc/>"));
  }

  #[test]
  fn unknown_content_type_tries_json_first() {
    assert_eq!(parse_body("application/octet-stream", br#"{"x":1}"#), json!({"x": 1}));
    assert_eq!(parse_body("application/octet-stream", b"plain"), json!("plain"));
  }

  #[test]
  fn cookies_parse() {
    let parsed = parse_cookies(Some("session=abc; theme=dark"));
    assert_eq!(parsed, json!({"session": "abc", "theme": "dark"}));
  }

  #[test]
  fn query_parses() {
    let parsed = parse_query(Some("page=2&q=hello"));
    assert_eq!(parsed, json!({"page": "2", "q": "hello"}));
  }
}
