use log::{debug, error, warn};
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, Result};

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Correlation id sent with every request: `<millis>-<random>`.
pub fn request_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), &random[..9])
}

/// Pull a human-readable reason out of an error body (`detail` or `message`).
pub fn detail_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "message"].iter().find_map(|key| match value.get(*key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    })
}

/// Map a transport-level failure, logging what kind it was.
pub fn transport_error(url: &str, err: reqwest_middleware::Error) -> ApiError {
    error!("Failed HTTP request to {}: {}", url, err);
    if let reqwest_middleware::Error::Reqwest(inner) = &err {
        if inner.is_timeout() {
            error!("Request timed out");
        }
        if inner.is_connect() {
            error!("Connection error");
        }
    }
    ApiError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Read the body of a response, turning non-2xx statuses into `ApiError::Status`.
pub async fn read_body(url: &str, response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    if status.is_success() {
        debug!("{} -> {} ({} bytes)", url, status, body.len());
        return Ok(body);
    }

    let detail = detail_from_body(&body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body.clone()
        }
    });
    warn!("{} -> {}: {}", url, status, detail);
    Err(ApiError::Status {
        status: status.as_u16(),
        detail,
    })
}

/// Read and decode a JSON response.
pub async fn decode_json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
    let body = read_body(url, response).await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
