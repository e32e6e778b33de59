use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::services::cache::client::{CacheClient, CacheResult};

/// In-process cache for single-node deployments and tests.
///
/// Expired entries are dropped when touched, and all of them on every write,
/// so keys that are never read again (abandoned logins) do not pile up.
#[derive(Clone, Debug, Default)]
pub struct MemoryClient {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(map: &mut HashMap<String, (String, Instant)>, key: &str) -> Option<String> {
        match map.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                map.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    fn purge_expired(map: &mut HashMap<String, (String, Instant)>) {
        let now = Instant::now();
        map.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

#[async_trait]
impl CacheClient for MemoryClient {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut map = self.entries.lock();
        Ok(Self::live_value(&mut map, key))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut map = self.entries.lock();
        Self::purge_expired(&mut map);
        map.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let mut map = self.entries.lock();
        Self::purge_expired(&mut map);
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn take_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut map = self.entries.lock();
        let value = Self::live_value(&mut map, key);
        map.remove(key);
        Ok(value)
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let mut map = self.entries.lock();
        let existed = Self::live_value(&mut map, key).is_some();
        map.remove(key);
        Ok(u64::from(existed))
    }
}
