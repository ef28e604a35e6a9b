//! Typeflow Webhook
//!
//! HTTP ingress for inbound webhook requests: lookup, rate limiting,
//! authentication, method gating, body parsing, request capture, and
//! dispatch into the executor (inline) or the job queue (202).

mod auth;
mod body;
mod error;
mod ingress;
mod limit;

pub use auth::authenticate;
pub use body::{parse_body, parse_cookies, parse_query};
pub use error::IngressError;
pub use ingress::{IngressState, router};
pub use limit::WebhookRateLimiter;
