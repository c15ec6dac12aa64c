//! HTTP plumbing for registry queries: a reqwest wrapper with retry and
//! classification of responses that are not worth retrying.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable, classify_error};
