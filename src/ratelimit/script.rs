//! Server-side decision scripts.
//!
//! Each script reads the theoretical arrival time (TAT) of one key, decides
//! how much of the requested cost fits, writes the new TAT with an expiry and
//! returns the decision. Redis runs a script as a single atomic unit, so no
//! other client can interleave between the read and the write.
//!
//! Reply layout, shared by both scripts:
//!
//! ```text
//! { allowed: integer, remaining: integer, retry_after: string, reset_after: string }
//! ```
//!
//! Durations travel as strings so Redis does not truncate their fractional
//! part when converting Lua numbers to integer replies. A `retry_after` of
//! `-1` means no retry is needed.

use std::fmt;

use super::limit::Limit;

/// Fixed epoch the scripts measure time from: 2017-01-01T00:00:00Z.
///
/// `TIME` returns epoch seconds plus microseconds; as a single double that
/// is 16 significant digits, which is at the edge of f64 precision. Rebasing
/// onto this anchor keeps sub-second arithmetic exact until
/// 2048-09-09T01:46:39Z, when the rebased value reaches 16 digits again.
pub const EPOCH_ANCHOR_SECS: i64 = 1_483_228_800;

/// Value of `retry_after` in a reply when no retry is needed.
pub const NO_RETRY: f64 = -1.0;

/// Spacing of f64 values between 2^29 and 2^30 seconds past the anchor
/// (2^-23 s), the coarsest TAT magnitude before the precision horizon.
///
/// Each increment added to a TAT rounds by at most this much, so a TAT built
/// from `k` increments is off by at most `k` of these.
pub const TAT_ULP: f64 = 1.0 / 8_388_608.0;

/// Largest fraction of one event the rounding tolerance may absorb.
pub const MAX_TOLERANCE: f64 = 0.1;

// Both scripts are adapted from redis-gcra:
//
// Copyright (c) 2017 Pavel Pravosud
// https://github.com/rwz/redis-gcra/blob/master/vendor/perform_gcra_ratelimit.lua
//
// Event counts computed from TAT are snapped up to a whole event when they
// fall short of it by less than the accumulated rounding error.

/// Strict admission: all of `cost` or nothing.
pub const ALLOW_N: &str = r#"
-- Copyright (c) 2017 Pavel Pravosud
-- https://github.com/rwz/redis-gcra/blob/master/vendor/perform_gcra_ratelimit.lua

-- this script has side-effects, so it requires replicate commands mode
redis.replicate_commands()

local rate_limit_key = KEYS[1]
local burst = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local period = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])

local emission_interval = period / rate
local increment = emission_interval * cost
local burst_offset = emission_interval * burst

-- one ulp (2^-23 s) of rounding per increment accumulated into tat
local tolerance = math.min((burst + 2) * 1.1920928955078125e-07 / emission_interval, 0.1)
local function whole(units)
  return math.max(units, math.floor(units + tolerance))
end

-- redis returns time as an array containing two integers: seconds of the epoch
-- time (10 digits) and microseconds (6 digits). for convenience we need to
-- convert them to a floating point number. the resulting number is 16 digits,
-- bordering on the limits of a 64-bit double-precision floating point number.
-- adjust the epoch to be relative to Jan 1, 2017 00:00:00 GMT to avoid floating
-- point problems. this approach is good until "now" is 2,483,228,799 (Wed, 09
-- Sep 2048 01:46:39 GMT), when the adjusted value is 16 digits.
local anchor = 1483228800
local now = redis.call("TIME")
now = (now[1] - anchor) + (now[2] / 1000000)

local tat = redis.call("GET", rate_limit_key)

if not tat then
  tat = now
else
  tat = tonumber(tat)
end

tat = math.max(tat, now)

local new_tat = tat + increment
local allow_at = new_tat - burst_offset

local diff = now - allow_at
local remaining = whole(diff / emission_interval)

if remaining < 0 then
  local reset_after = tat - now
  local retry_after = diff * -1
  return {
    0, -- allowed
    0, -- remaining
    tostring(retry_after),
    tostring(reset_after),
  }
end

local reset_after = new_tat - now
if reset_after > 0 then
  redis.call("SET", rate_limit_key, new_tat, "EX", math.ceil(reset_after))
end
local retry_after = -1
return {cost, remaining, tostring(retry_after), tostring(reset_after)}
"#;

/// Best-effort admission: as much of `cost` as currently fits.
pub const ALLOW_AT_MOST: &str = r#"
-- Copyright (c) 2017 Pavel Pravosud
-- https://github.com/rwz/redis-gcra/blob/master/vendor/perform_gcra_ratelimit.lua

-- this script has side-effects, so it requires replicate commands mode
redis.replicate_commands()

local rate_limit_key = KEYS[1]
local burst = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local period = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])

local emission_interval = period / rate
local burst_offset = emission_interval * burst

-- one ulp (2^-23 s) of rounding per increment accumulated into tat
local tolerance = math.min((burst + 2) * 1.1920928955078125e-07 / emission_interval, 0.1)
local function whole(units)
  return math.max(units, math.floor(units + tolerance))
end

-- redis returns time as an array containing two integers: seconds of the epoch
-- time (10 digits) and microseconds (6 digits). for convenience we need to
-- convert them to a floating point number. the resulting number is 16 digits,
-- bordering on the limits of a 64-bit double-precision floating point number.
-- adjust the epoch to be relative to Jan 1, 2017 00:00:00 GMT to avoid floating
-- point problems. this approach is good until "now" is 2,483,228,799 (Wed, 09
-- Sep 2048 01:46:39 GMT), when the adjusted value is 16 digits.
local anchor = 1483228800
local now = redis.call("TIME")
now = (now[1] - anchor) + (now[2] / 1000000)

local tat = redis.call("GET", rate_limit_key)

if not tat then
  tat = now
else
  tat = tonumber(tat)
end

tat = math.max(tat, now)

local diff = now - (tat - burst_offset)
local remaining = whole(diff / emission_interval)

if remaining < 1 then
  local reset_after = tat - now
  local retry_after = emission_interval - diff
  return {
    0, -- allowed
    0, -- remaining
    tostring(retry_after),
    tostring(reset_after),
  }
end

if remaining < cost then
  cost = remaining
  remaining = 0
else
  remaining = remaining - cost
end

local increment = emission_interval * cost
local new_tat = tat + increment

local reset_after = new_tat - now
if reset_after > 0 then
  redis.call("SET", rate_limit_key, new_tat, "EX", math.ceil(reset_after))
end

return {
  cost,
  remaining,
  tostring(-1),
  tostring(reset_after),
}
"#;

/// Which admission policy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcraScript {
    /// All-or-nothing admission
    AllowN,
    /// Admit up to the requested cost
    AllowAtMost,
}

impl GcraScript {
    /// Both scripts, in load order.
    pub const ALL: [GcraScript; 2] = [GcraScript::AllowN, GcraScript::AllowAtMost];

    /// Lua source of this script.
    pub fn source(&self) -> &'static str {
        match self {
            GcraScript::AllowN => ALLOW_N,
            GcraScript::AllowAtMost => ALLOW_AT_MOST,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GcraScript::AllowN => "allow_n",
            GcraScript::AllowAtMost => "allow_at_most",
        }
    }
}

impl fmt::Display for GcraScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Script arguments, in ARGV order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptArgs {
    pub burst: u64,
    pub rate: u64,
    /// Period length in seconds; fractional periods are allowed
    pub period_secs: f64,
    pub cost: u64,
}

impl ScriptArgs {
    /// Marshal a limit and a requested cost.
    pub fn new(limit: &Limit, cost: u64) -> Self {
        Self {
            burst: limit.burst,
            rate: limit.rate,
            period_secs: limit.period.as_secs_f64(),
            cost,
        }
    }

    /// Seconds one event costs at the steady rate.
    pub fn emission_interval(&self) -> f64 {
        self.period_secs / self.rate as f64
    }

    /// Fraction of an event below which a shortfall is treated as rounding
    /// error rather than a real wait.
    pub fn tolerance(&self) -> f64 {
        ((self.burst as f64 + 2.0) * TAT_ULP / self.emission_interval()).min(MAX_TOLERANCE)
    }
}
