//! The limiter client.

use tracing::{debug, info, trace};

use super::limit::{Limit, RateLimitResult};
use super::reply;
use super::script::{GcraScript, ScriptArgs};
use crate::config::{RedrateConfig, DEFAULT_KEY_PREFIX};
use crate::error::Result;
use crate::store::{RedisStore, ScriptStore};

/// Decides whether events may happen now, against state held in a shared
/// store.
///
/// The limiter keeps no rate state of its own: every decision is one atomic
/// script run in the store, so any number of limiters in any number of
/// processes enforce one global limit per key. Errors from the store are
/// returned as-is; whether to fail open or closed is up to the caller.
#[derive(Debug, Clone)]
pub struct RateLimiter<S: ScriptStore = RedisStore> {
    store: S,
    key_prefix: String,
}

impl RateLimiter<RedisStore> {
    /// Connect to the store selected by `config.limiter.store`.
    pub async fn connect(config: &RedrateConfig) -> Result<Self> {
        let store = RedisStore::connect(config.limiter_store()?).await?;
        Ok(Self::new(store)
            .await?
            .with_key_prefix(config.limiter.key_prefix.clone()))
    }
}

impl<S: ScriptStore> RateLimiter<S> {
    /// Create a limiter over `store`.
    ///
    /// The store is probed once and both decision scripts are preloaded; an
    /// unreachable store fails construction instead of producing a limiter
    /// that errors on every call.
    pub async fn new(store: S) -> Result<Self> {
        store.ping().await?;
        for script in GcraScript::ALL {
            store.load_script(script).await?;
        }
        info!("Rate limiter initialized");

        Ok(Self {
            store,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    /// Use `prefix` instead of `"rate:"` in front of every key.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Shortcut for `allow_n(key, limit, 1)`.
    pub async fn allow(&self, key: &str, limit: Limit) -> Result<RateLimitResult> {
        self.allow_n(key, limit, 1).await
    }

    /// Admit exactly `n` events or none.
    ///
    /// A rejection leaves the stored state untouched, so `retry_after` stays
    /// accurate for the next attempt.
    pub async fn allow_n(&self, key: &str, limit: Limit, n: u64) -> Result<RateLimitResult> {
        self.run(GcraScript::AllowN, key, limit, n).await
    }

    /// Admit as many of `n` events as currently fit, possibly fewer than `n`.
    ///
    /// Returns `allowed == 0` only when not even one event fits.
    pub async fn allow_at_most(&self, key: &str, limit: Limit, n: u64) -> Result<RateLimitResult> {
        self.run(GcraScript::AllowAtMost, key, limit, n).await
    }

    /// Clear all state for `key`, returning it to fully replenished.
    pub async fn reset(&self, key: &str) -> Result<()> {
        let key = self.state_key(key);
        self.store.delete(&key).await?;
        debug!(key = %key, "Rate limit state reset");
        Ok(())
    }

    async fn run(
        &self,
        script: GcraScript,
        key: &str,
        limit: Limit,
        n: u64,
    ) -> Result<RateLimitResult> {
        let key = self.state_key(key);
        let args = ScriptArgs::new(&limit, n);

        trace!(script = %script, key = %key, limit = %limit, n, "Checking rate limit");

        let raw = self.store.eval_script(script, &key, &args).await?;
        let result = reply::decode(limit, raw)?;

        if !result.is_allowed() {
            debug!(
                key = %key,
                limit = %limit,
                retry_after = ?result.retry_after,
                "Rate limit exceeded"
            );
        }
        Ok(result)
    }

    fn state_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RedrateError;
    use crate::store::{ManualTimeSource, MemoryStore};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    async fn test_limiter() -> (RateLimiter<MemoryStore<ManualTimeSource>>, ManualTimeSource) {
        let clock = ManualTimeSource::new(300_000_000.0);
        let store = MemoryStore::with_clock(clock.clone());
        (RateLimiter::new(store).await.unwrap(), clock)
    }

    #[tokio::test]
    async fn test_limiter_prefixes_keys() {
        let (limiter, _clock) = test_limiter().await;
        assert_eq!(limiter.key_prefix(), "rate:");

        limiter.allow("u1", Limit::per_second(1)).await.unwrap();
        assert!(limiter.store().contains("rate:u1"));
        assert!(!limiter.store().contains("u1"));

        let limiter = limiter.with_key_prefix("api:");
        limiter.allow("u1", Limit::per_second(1)).await.unwrap();
        assert!(limiter.store().contains("api:u1"));
    }

    #[tokio::test]
    async fn test_scenario_per_second_two() {
        let (limiter, _clock) = test_limiter().await;
        let limit = Limit::per_second(2);

        let first = limiter.allow("u1", limit).await.unwrap();
        assert_eq!((first.allowed, first.remaining), (1, 1));
        assert_eq!(first.retry_after, None);

        let second = limiter.allow("u1", limit).await.unwrap();
        assert_eq!((second.allowed, second.remaining), (1, 0));

        let third = limiter.allow("u1", limit).await.unwrap();
        assert_eq!((third.allowed, third.remaining), (0, 0));
        assert_eq!(third.retry_after, Some(Duration::from_millis(500)));
        assert_eq!(third.reset_after, Duration::from_secs(1));
        assert_eq!(third.limit, limit);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let (limiter, _clock) = test_limiter().await;
        let limit = Limit::per_hour(1);

        assert!(limiter.allow("u1", limit).await.unwrap().is_allowed());
        assert!(!limiter.allow("u1", limit).await.unwrap().is_allowed());

        assert_ok!(limiter.reset("u1").await);
        assert!(limiter.allow("u1", limit).await.unwrap().is_allowed());
    }

    #[derive(Debug)]
    struct DownStore;

    #[async_trait]
    impl ScriptStore for DownStore {
        async fn ping(&self) -> Result<()> {
            Err(RedrateError::Timeout(Duration::from_secs(3)))
        }
        async fn load_script(&self, _script: GcraScript) -> Result<()> {
            Ok(())
        }
        async fn eval_script(
            &self,
            _script: GcraScript,
            _key: &str,
            _args: &ScriptArgs,
        ) -> Result<redis::Value> {
            Ok(redis::Value::Nil)
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_construction() {
        let err = assert_err!(RateLimiter::new(DownStore).await);
        assert!(matches!(err, RedrateError::Timeout(_)));
    }
}
