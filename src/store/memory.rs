//! In-process store.
//!
//! Runs the same decision arithmetic as the server-side scripts over a
//! mutex-guarded map, with key expiry. State is visible to one process only,
//! which makes this store suitable for tests and local development but not
//! for enforcing a limit across instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use redis::Value;
use tracing::trace;

use super::ScriptStore;
use crate::error::Result;
use crate::ratelimit::gcra;
use crate::ratelimit::{GcraScript, ScriptArgs, EPOCH_ANCHOR_SECS};

/// Source of the current time, in f64 seconds since the epoch anchor.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> f64 {
        let now = Utc::now();
        (now.timestamp() - EPOCH_ANCHOR_SECS) as f64
            + now.timestamp_subsec_micros() as f64 / 1_000_000.0
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<Mutex<f64>>,
}

impl ManualTimeSource {
    /// Start the clock at `secs` seconds past the epoch anchor.
    pub fn new(secs: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(secs)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by.as_secs_f64();
    }

    pub fn set(&self, secs: f64) {
        *self.now.lock() = secs;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    tat: f64,
    expires_at: f64,
}

/// A store holding rate state in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore<T: TimeSource = SystemTimeSource> {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: T,
}

impl MemoryStore<SystemTimeSource> {
    /// Create an empty store on the wall clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: TimeSource> MemoryStore<T> {
    /// Create an empty store driven by `clock`.
    pub fn with_clock(clock: T) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Whether `key` currently holds unexpired state.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|e| e.expires_at > now)
    }

    /// Remaining time to live of `key`, if it holds unexpired state.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        let entry = entries.get(key).filter(|e| e.expires_at > now)?;
        Duration::try_from_secs_f64(entry.expires_at - now).ok()
    }
}

#[async_trait]
impl<T: TimeSource> ScriptStore for MemoryStore<T> {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn load_script(&self, _script: GcraScript) -> Result<()> {
        Ok(())
    }

    async fn eval_script(&self, script: GcraScript, key: &str, args: &ScriptArgs) -> Result<Value> {
        let mut entries = self.entries.lock();
        let now = self.clock.now();

        let tat = match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.tat),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };

        let decision = gcra::decide(script, tat, now, args);
        if let Some((new_tat, ttl)) = decision.write {
            entries.insert(
                key.to_string(),
                Entry {
                    tat: new_tat,
                    expires_at: now + ttl as f64,
                },
            );
        }

        trace!(script = %script, key, tat = ?tat, allowed = decision.allowed, "memory store decision");

        // Shape the reply the way Redis converts a Lua table: numbers become
        // truncated integers, strings stay strings.
        Ok(Value::Bulk(vec![
            Value::Int(decision.allowed.trunc() as i64),
            Value::Int(decision.remaining.trunc() as i64),
            Value::Data(decision.retry_after.to_string().into_bytes()),
            Value::Data(decision.reset_after.to_string().into_bytes()),
        ]))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
