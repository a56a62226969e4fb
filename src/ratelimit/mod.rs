//! Rate limiting policies, decision protocol and client.

pub mod gcra;
mod limit;
mod limiter;
pub mod reply;
mod rules;
pub mod script;

pub use limit::{Limit, RateLimitResult};
pub use limiter::RateLimiter;
pub use rules::{LimitRule, LimitRules, TimeUnit};
pub use script::{GcraScript, ScriptArgs, EPOCH_ANCHOR_SECS};
