//! Error taxonomy shared by the probes, the polling core and the adapters.

use thiserror::Error;

/// Longest response body kept in a transport error.
pub const MAX_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum VerifyError {
    /// A required setting is absent. Raised before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network failure or non-success status from an external system.
    #[error("{system} transport error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        system: String,
        status: Option<u16>,
        message: String,
    },

    /// The response arrived but did not have the expected shape.
    #[error("{system} returned an unexpected payload: {message}")]
    Decode { system: String, message: String },
}

pub type Result<T> = std::result::Result<T, VerifyError>;

impl VerifyError {
    pub fn transport(system: &str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("unreachable: {err}")
        } else {
            err.to_string()
        };
        VerifyError::Transport {
            system: system.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    pub fn http_status(system: &str, status: u16, body: &str) -> Self {
        VerifyError::Transport {
            system: system.to_string(),
            status: Some(status),
            message: truncate_body(body),
        }
    }

    pub fn decode(system: &str, err: impl std::fmt::Display) -> Self {
        VerifyError::Decode {
            system: system.to_string(),
            message: err.to_string(),
        }
    }

    /// True when the remote system never answered (as opposed to answering badly).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, VerifyError::Transport { status: None, .. })
    }

    /// Transport failures may clear up on the next poll; a malformed payload or bad config will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerifyError::Transport { .. })
    }
}

/// Trims a response body to [`MAX_BODY_CHARS`] characters for diagnostics.
pub fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_BODY_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(VerifyError::http_status("n8n", 502, "bad gateway").is_retryable());
        assert!(!VerifyError::decode("n8n", "missing field `data`").is_retryable());
        assert!(!VerifyError::Config("N8N_API_KEY not set".into()).is_retryable());
    }

    #[test]
    fn short_bodies_are_kept_verbatim() {
        assert_eq!(truncate_body("  {\"message\":\"unauthorized\"}\n"), "{\"message\":\"unauthorized\"}");
    }

    #[test]
    fn long_bodies_are_cut_on_char_boundaries() {
        let body = "é".repeat(500);
        let out = truncate_body(&body);
        assert_eq!(out.chars().count(), MAX_BODY_CHARS + 1);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn transport_display_includes_status() {
        let err = VerifyError::http_status("n8n", 401, "unauthorized");
        assert_eq!(err.to_string(), "n8n transport error (HTTP 401): unauthorized");
        assert!(!err.is_unreachable());
    }
}
