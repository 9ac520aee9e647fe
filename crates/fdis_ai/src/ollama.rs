use std::time::Duration;

use fdis_core::error::AppError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Connection settings for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    health_timeout: Duration,
}

impl OllamaClient {
    /// Create a client for Ollama. This is strictly limited to `127.0.0.1`.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let rest = if base_url == "http://127.0.0.1" {
            None
        } else if let Some(port) = base_url.strip_prefix("http://127.0.0.1:") {
            Some(port)
        } else {
            return Err(remote_not_allowed(&base_url));
        };
        if let Some(port) = rest {
            // Port only: no path, no userinfo, no host suffix.
            match port.parse::<u16>() {
                Ok(p) if p != 0 && port.bytes().all(|b| b.is_ascii_digit()) => {}
                _ => return Err(remote_not_allowed(&base_url)),
            }
        }

        Ok(Self {
            base_url,
            health_timeout: Duration::from_millis(800),
        })
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `/api/tags`. A non-200 answer is unhealthy; no answer is unreachable.
    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        match ureq::get(&url).timeout(self.health_timeout).call() {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(unhealthy(r.status())),
            Err(ureq::Error::Status(status, _)) => Err(unhealthy(status)),
            Err(ureq::Error::Transport(t)) => Err(AppError::new(
                "AI_OLLAMA_UNREACHABLE",
                "Failed to reach Ollama on 127.0.0.1",
            )
            .with_details(t.to_string())
            .with_retryable(true)),
        }
    }
}

fn unhealthy(status: u16) -> AppError {
    AppError::new("AI_OLLAMA_UNHEALTHY", "Ollama health check failed")
        .with_details(format!("status={status}"))
}

fn remote_not_allowed(base_url: &str) -> AppError {
    AppError::new(
        "AI_REMOTE_NOT_ALLOWED",
        "Ollama base URL must be localhost (127.0.0.1)",
    )
    .with_details(format!("base_url={base_url}"))
}

/// Map a ureq failure into a service error. Non-2xx statuses and transport
/// failures (including timeouts) are both fatal for the request.
pub(crate) fn service_error(code: &str, what: &str, err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            AppError::new(code, format!("{what} request failed"))
                .with_details(format!("status={status}; body={}", truncate(&body, 300)))
        }
        ureq::Error::Transport(t) => AppError::new(code, format!("Failed to call {what} endpoint"))
            .with_details(t.to_string())
            .with_retryable(true),
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
