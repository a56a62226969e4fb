//! Redis-backed store.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script, Value};
use tracing::{debug, error, info, warn};

use super::ScriptStore;
use crate::config::StoreConfig;
use crate::error::{RedrateError, Result};
use crate::ratelimit::{GcraScript, ScriptArgs};

/// A store backed by a Redis-compatible server.
///
/// Cloning is cheap: clones share one multiplexed connection, which
/// reconnects on its own after a connection loss.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    allow_n: Script,
    allow_at_most: Script,
    response_timeout: Duration,
}

impl RedisStore {
    /// Connect to the store described by `config`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_info()?)?;

        info!(url = %redacted(&config.url), "Connecting to store");

        let connect_timeout = config.connect_timeout();
        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                error!(timeout = ?connect_timeout, "Store connection timed out");
                RedrateError::Timeout(connect_timeout)
            })??;

        Ok(Self {
            conn,
            allow_n: Script::new(GcraScript::AllowN.source()),
            allow_at_most: Script::new(GcraScript::AllowAtMost.source()),
            response_timeout: config.response_timeout(),
        })
    }

    fn script(&self, script: GcraScript) -> &Script {
        match script {
            GcraScript::AllowN => &self.allow_n,
            GcraScript::AllowAtMost => &self.allow_at_most,
        }
    }

    /// Await one store command under the response timeout and trace it.
    async fn run<T, F>(&self, op: &str, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        let started = Instant::now();
        match tokio::time::timeout(self.response_timeout, fut).await {
            Ok(Ok(value)) => {
                debug!(op, key, elapsed = ?started.elapsed(), "store command");
                Ok(value)
            }
            Ok(Err(e)) => {
                error!(op, key, error = %e, "store command failed");
                Err(e.into())
            }
            Err(_) => {
                error!(op, key, timeout = ?self.response_timeout, "store command timed out");
                Err(RedrateError::Timeout(self.response_timeout))
            }
        }
    }
}

#[async_trait]
impl ScriptStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = self
            .run("PING", "", redis::cmd("PING").query_async(&mut conn))
            .await?;
        if pong != "PONG" {
            return Err(RedrateError::MalformedReply(format!(
                "unexpected PING reply {:?}",
                pong
            )));
        }
        Ok(())
    }

    async fn load_script(&self, script: GcraScript) -> Result<()> {
        let mut conn = self.conn.clone();
        let sha: String = self
            .run(
                "SCRIPT LOAD",
                script.name(),
                redis::cmd("SCRIPT")
                    .arg("LOAD")
                    .arg(script.source())
                    .query_async(&mut conn),
            )
            .await?;

        let expected = self.script(script).get_hash();
        if sha != expected {
            // Invocation still works: EVALSHA misses fall back to EVAL.
            warn!(script = %script, sha = %sha, expected = %expected, "Script hash mismatch");
        }
        Ok(())
    }

    async fn eval_script(&self, script: GcraScript, key: &str, args: &ScriptArgs) -> Result<Value> {
        let mut conn = self.conn.clone();
        let mut invocation = self.script(script).key(key);
        invocation
            .arg(args.burst)
            .arg(args.rate)
            .arg(args.period_secs)
            .arg(args.cost);

        self.run(script.name(), key, invocation.invoke_async(&mut conn))
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self.run("DEL", key, conn.del(key)).await?;
        Ok(())
    }
}

/// Strip credentials from a store URL for logging.
fn redacted(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}***{}", &url[..scheme + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}
