//! Classification of registry HTTP failures into retryable and final ones.

use reqwest::StatusCode;

/// Maximum number of attempts for a registry request.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 500;

/// Registry responses that will not improve on retry.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 429, or 403 mentioning a rate limit
    RateLimitExceeded(String),
    /// HTTP 404: unknown project or release
    NotFound(String),
    /// Any other 4xx
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::RateLimitExceeded(msg) => {
                write!(f, "Registry rate limit exceeded: {}", msg)
            }
            NonRetryableError::NotFound(msg) => write!(f, "Not found in registry: {}", msg),
            NonRetryableError::ClientError(msg) => write!(f, "Registry request error: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Returns `Ok(())` when the error is worth retrying (connection problems,
/// timeouts, 5xx), otherwise the final error.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        return Ok(());
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(
            "Too many requests".to_string(),
        )),
        StatusCode::FORBIDDEN if error.to_string().contains("rate limit") => Err(
            NonRetryableError::RateLimitExceeded("Request throttled".to_string()),
        ),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(
            error
                .url()
                .map(|u| u.path().to_string())
                .unwrap_or_else(|| "requested release".to_string()),
        )),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} error",
            s.as_u16()
        ))),
        _ => Ok(()),
    }
}

/// Wraps an `error_for_status()` failure, tagging final errors so the retry
/// loop can stop early.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn status_error(status: usize) -> reqwest::Error {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/pypi/spam/1.0/json")
            .with_status(status)
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(format!("{}/pypi/spam/1.0/json", server.url()))
            .send()
            .await
            .unwrap();
        response.error_for_status().unwrap_err()
    }

    #[test]
    fn test_non_retryable_error_display() {
        let err = NonRetryableError::NotFound("/pypi/spam/1.0/json".to_string());
        assert_eq!(
            err.to_string(),
            "Not found in registry: /pypi/spam/1.0/json"
        );

        let err = NonRetryableError::ClientError("HTTP 400 error".to_string());
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[tokio::test]
    async fn test_classify_not_found_keeps_path() {
        let err = status_error(404).await;
        match classify_error(&err) {
            Err(NonRetryableError::NotFound(path)) => assert_eq!(path, "/pypi/spam/1.0/json"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_classify_too_many_requests() {
        let err = status_error(429).await;
        assert!(matches!(
            classify_error(&err),
            Err(NonRetryableError::RateLimitExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_classify_other_client_error() {
        let err = status_error(410).await;
        assert!(matches!(
            classify_error(&err),
            Err(NonRetryableError::ClientError(_))
        ));
    }

    #[tokio::test]
    async fn test_server_errors_are_retryable() {
        let err = status_error(503).await;
        assert!(classify_error(&err).is_ok());
        assert!(check_retryable(err).downcast_ref::<NonRetryableError>().is_none());
    }
}
