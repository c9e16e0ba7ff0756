//! Command implementations for the capture CLI.
//!
//! Each command module provides:
//! - Args struct for clap argument parsing
//! - execute() function that performs the command
//! - Human-readable and JSON output formatting

pub mod act;
pub mod ideas;
pub mod queue;
pub mod registry;
pub mod route;

use anyhow::Result;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Common error type for HTTP requests.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

/// Build the HTTP client shared by every command.
pub fn build_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().build()?)
}

/// Print output in JSON or human-readable format.
pub fn output<T: Serialize + HumanReadable>(value: &T, human: bool) -> Result<()> {
    if human {
        value.print_human();
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

/// Trait for types that can be printed in human-readable format.
pub trait HumanReadable {
    fn print_human(&self);
}

impl<T: HumanReadable> HumanReadable for Vec<T> {
    fn print_human(&self) {
        for item in self {
            item.print_human();
        }
    }
}

/// Send a request and decode the JSON body.
pub async fn make_request<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, CliError> {
    let response = check(request.send().await?).await?;
    Ok(response.json::<T>().await?)
}

/// Send a request whose success carries no body (`204 No Content`).
pub async fn make_empty_request(request: reqwest::RequestBuilder) -> Result<StatusCode, CliError> {
    let response = check(request.send().await?).await?;
    Ok(response.status())
}

/// Turn a non-2xx response into [`CliError::Server`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, CliError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CliError::Server {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Extract `error.message` from a server error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            let error = json.get("error")?;
            error
                .get("message")
                .or(Some(error))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Format a timestamp for human display.
pub fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Truncate a string for display, adding ellipsis if needed.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_envelope() {
        let body = r#"{"error":{"code":"NOT_FOUND","message":"Export job 1 not found"}}"#;
        assert_eq!(error_message(body), "Export job 1 not found");
    }

    #[test]
    fn test_error_message_plain_string() {
        assert_eq!(error_message(r#"{"error":"boom"}"#), "boom");
        assert_eq!(error_message("bad gateway"), "bad gateway");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ownership and borrowing", 10), "ownersh...");
        assert_eq!(truncate("đường sắt cao tốc", 8), "đường...");
    }
}
