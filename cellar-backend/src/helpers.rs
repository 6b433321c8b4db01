use axum::http::HeaderMap;
use chrono::{Datelike, NaiveDate, Utc};
use rand::distr::{Alphanumeric, SampleString};
use rand::rng;
use std::net::SocketAddr;

/// Unix timestamp in seconds
pub fn now() -> i64 {
  Utc::now().timestamp()
}

pub fn today() -> NaiveDate {
  Utc::now().date_naive()
}

pub fn current_year() -> i32 {
  Utc::now().year()
}

/// Unique id for a JWT (`jti` claim)
pub fn generate_token_id() -> String {
  Alphanumeric.sample_string(&mut rng(), 32)
}

/// Suffix appended to an upload whose name is already taken
pub fn generate_file_suffix() -> String {
  Alphanumeric.sample_string(&mut rng(), 7)
}

/// Client IP used to key rate limits.
///
/// First entry of `X-Forwarded-For`, then `X-Real-IP`, then the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
  let forwarded = headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty());
  if let Some(ip) = forwarded {
    return ip.to_string();
  }

  let real_ip = headers
    .get("x-real-ip")
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty());
  if let Some(ip) = real_ip {
    return ip.to_string();
  }

  peer
    .map(|addr| addr.ip().to_string())
    .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::HeaderValue;

  #[test]
  fn test_client_ip_precedence() {
    let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();
    let mut headers = HeaderMap::new();
    assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.9");
    assert_eq!(client_ip(&headers, None), "unknown");

    headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.4"));
    assert_eq!(client_ip(&headers, Some(peer)), "192.168.1.4");

    headers.insert(
      "x-forwarded-for",
      HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
    );
    assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
  }

  #[test]
  fn test_generated_ids() {
    let suffix = generate_file_suffix();
    assert_eq!(suffix.len(), 7);
    assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_ne!(generate_token_id(), generate_token_id());
  }
}
