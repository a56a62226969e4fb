use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use redrate::config::{RedrateConfig, StoreConfig};
use redrate::{Limit, RateLimitResult, RateLimiter};

/// Check and reset distributed rate limits from the command line.
#[derive(Debug, Parser)]
#[command(name = "redrate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "REDRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Store URL, replacing the configured limiter store
    #[arg(long, env = "REDRATE_REDIS_URL")]
    redis_url: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Admit one event
    Allow {
        key: String,
        #[command(flatten)]
        limit: LimitArgs,
    },
    /// Admit exactly N events or none
    AllowN {
        key: String,
        n: u64,
        #[command(flatten)]
        limit: LimitArgs,
    },
    /// Admit up to N events
    AllowAtMost {
        key: String,
        n: u64,
        #[command(flatten)]
        limit: LimitArgs,
    },
    /// Clear all state for a key
    Reset { key: String },
}

#[derive(Debug, Args)]
struct LimitArgs {
    /// Name of a limit from the configuration file
    #[arg(short, long, conflicts_with_all = ["rate", "period_secs", "burst"])]
    limit: Option<String>,

    /// Events per period
    #[arg(long)]
    rate: Option<u64>,

    /// Period length in seconds
    #[arg(long, default_value_t = 1.0)]
    period_secs: f64,

    /// Events admitted at once; defaults to the rate
    #[arg(long)]
    burst: Option<u64>,
}

impl LimitArgs {
    fn resolve(&self, config: &RedrateConfig) -> anyhow::Result<Limit> {
        if let Some(name) = &self.limit {
            return Ok(config.limits.limit(name)?);
        }
        let rate = self
            .rate
            .context("either --limit or --rate is required")?;
        anyhow::ensure!(rate > 0, "--rate must be positive");
        let period = Duration::try_from_secs_f64(self.period_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .context("--period-secs must be positive")?;
        Ok(Limit::new(rate, period, self.burst.unwrap_or(rate)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let mut config = match &cli.config {
        Some(path) => RedrateConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RedrateConfig::default(),
    };
    if let Some(url) = &cli.redis_url {
        config.stores = vec![StoreConfig::with_url(url.clone())];
        config.limiter.store = 0;
    }

    let limiter = RateLimiter::connect(&config)
        .await
        .context("initializing rate limiter")?;

    let (key, result) = match &cli.command {
        Command::Allow { key, limit } => {
            (key, limiter.allow(key, limit.resolve(&config)?).await?)
        }
        Command::AllowN { key, n, limit } => {
            (key, limiter.allow_n(key, limit.resolve(&config)?, *n).await?)
        }
        Command::AllowAtMost { key, n, limit } => (
            key,
            limiter.allow_at_most(key, limit.resolve(&config)?, *n).await?,
        ),
        Command::Reset { key } => {
            limiter.reset(key).await?;
            info!(key = %key, "Reset");
            println!("reset {}", key);
            return Ok(());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(key, &result);
    }
    Ok(())
}

fn print_result(key: &str, result: &RateLimitResult) {
    let verdict = if result.is_allowed() { "allowed" } else { "denied" };
    println!("{} {} under {}", key, verdict, result.limit);
    println!("  allowed:     {}", result.allowed);
    println!("  remaining:   {}", result.remaining);
    match result.retry_after {
        Some(wait) => println!("  retry after: {:?}", wait),
        None => println!("  retry after: -"),
    }
    println!("  reset after: {:?}", result.reset_after);
}
