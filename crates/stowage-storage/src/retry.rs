use std::fmt;
use std::time::Duration;

use crate::RetryConfig;

/// Whether an HTTP error is transient and worth retrying.
pub fn is_retryable_http(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Transport(_) => true,
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
    }
}

/// Error type for a request plus its body read.
///
/// Kept free of the public store errors; each call site converts.
pub enum HttpRetryError {
    /// HTTP-level error (may be retryable: transport, 429, 5xx).
    Http(Box<ureq::Error>),
    /// Body read I/O error (may be retryable: connection reset, EOF, etc.).
    BodyIo(std::io::Error),
    /// Application error message (never retried).
    Permanent(String),
}

impl HttpRetryError {
    /// Wrap a `ureq::Error` (boxed to keep the enum small).
    pub fn http(e: ureq::Error) -> Self {
        HttpRetryError::Http(Box::new(e))
    }
}

impl fmt::Display for HttpRetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpRetryError::Http(e) => write!(f, "{e}"),
            HttpRetryError::BodyIo(e) => write!(f, "body read error: {e}"),
            HttpRetryError::Permanent(msg) => write!(f, "{msg}"),
        }
    }
}

/// Whether an I/O error is transient and worth retrying.
pub fn is_retryable_io(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
    )
}

fn is_retryable(err: &HttpRetryError) -> bool {
    match err {
        HttpRetryError::Http(e) => is_retryable_http(e.as_ref()),
        HttpRetryError::BodyIo(e) => is_retryable_io(e),
        HttpRetryError::Permanent(_) => false,
    }
}

/// Retry a closure that performs an HTTP request and reads its body, with
/// exponential backoff plus jitter between attempts.
///
/// Only used for idempotent reads; uploads and deletes go out exactly once.
pub fn retry_http_body<T>(
    config: &RetryConfig,
    op_name: &str,
    f: impl Fn() -> std::result::Result<T, HttpRetryError>,
) -> std::result::Result<T, HttpRetryError> {
    let mut delay_ms = config.retry_delay_ms;
    let mut attempt = 0usize;

    loop {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if is_retryable(&e) && attempt < config.max_retries => {
                attempt += 1;
                tracing::warn!(
                    "S3 {op_name}: transient error (attempt {attempt}/{}), retrying: {e}",
                    config.max_retries,
                );
                let jitter = rand::random::<u64>() % delay_ms.max(1);
                std::thread::sleep(Duration::from_millis(delay_ms + jitter));
                delay_ms = (delay_ms * 2).min(config.retry_max_delay_ms);
            }
            Err(e) => return Err(e),
        }
    }
}
