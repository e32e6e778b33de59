//! Cache client interface used by higher-level services (sessions, pending logins).
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command).
///
/// Note:
/// - Kept independent from `GatewayError` so callers decide how to fail
///   (sessions fail closed: an unreadable session is no session).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
}

/// A minimal, string-based cache interface.
///
/// Sessions need `SET EX`, `GET` and `DEL`; pending logins need an atomic
/// read-and-delete so a callback `state` can be consumed only once.
///
/// Object safe so the backend can be picked at startup (`Arc<dyn CacheClient>`).
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Get UTF-8 string value.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Set value with TTL, replacing any existing value.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    // Set value if the key does not exist, with TTL.
    //
    // Returns:
    // - `Ok(true)`  if the key was set (not seen before)
    // - `Ok(false)` if the key already exists
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool>;

    // Get and delete in one step. `None` if absent.
    async fn take_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Delete a key. Returns number of deleted keys.
    async fn del(&self, key: &str) -> CacheResult<u64>;
}

/// Convenience helper to build a TTL from seconds.
pub fn ttl_seconds(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_the_failing_step() {
        let connection = CacheError::BackendConnection("refused".into());
        let command = CacheError::BackendCommand("WRONGTYPE".into());

        assert_eq!(connection.to_string(), "cache connection error: refused");
        assert_eq!(command.to_string(), "cache command error: WRONGTYPE");
    }
}
