//! Shared store abstraction.
//!
//! The limiter only needs four things from its store: a health probe, script
//! preloading, atomic script execution against one key, and key deletion.
//! [`RedisStore`] provides them against a Redis-compatible server;
//! [`MemoryStore`] provides them inside a single process.

mod memory;
mod redis;

use async_trait::async_trait;

use crate::error::Result;
use crate::ratelimit::{GcraScript, ScriptArgs};

pub use self::memory::{ManualTimeSource, MemoryStore, SystemTimeSource, TimeSource};
pub use self::redis::RedisStore;

/// A store able to run the decision scripts atomically.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Make `script` available for cheap invocation.
    async fn load_script(&self, script: GcraScript) -> Result<()>;

    /// Run `script` against `key` as one atomic unit and return its raw reply.
    async fn eval_script(
        &self,
        script: GcraScript,
        key: &str,
        args: &ScriptArgs,
    ) -> Result<::redis::Value>;

    /// Delete `key` unconditionally.
    async fn delete(&self, key: &str) -> Result<()>;
}
