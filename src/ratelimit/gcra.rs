//! GCRA decision arithmetic.
//!
//! Mirrors the server-side scripts operation for operation so an in-process
//! store reaches the same decisions Redis would. All quantities are f64
//! seconds since [`EPOCH_ANCHOR_SECS`](super::script::EPOCH_ANCHOR_SECS).

use super::script::{GcraScript, ScriptArgs, NO_RETRY};

/// A decision plus the state write it implies.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: f64,
    pub remaining: f64,
    pub retry_after: f64,
    pub reset_after: f64,
    /// New TAT and its expiry in whole seconds, if the state changes
    pub write: Option<(f64, u64)>,
}

impl Decision {
    fn reject(retry_after: f64, reset_after: f64) -> Self {
        Self {
            allowed: 0.0,
            remaining: 0.0,
            retry_after,
            reset_after,
            write: None,
        }
    }

    fn accept(allowed: f64, remaining: f64, new_tat: f64, now: f64) -> Self {
        let reset_after = new_tat - now;
        let write = (reset_after > 0.0).then(|| (new_tat, reset_after.ceil() as u64));
        Self {
            allowed,
            remaining,
            retry_after: NO_RETRY,
            reset_after,
            write,
        }
    }
}

/// Run `script` against the stored TAT (if any) at time `now`.
pub fn decide(script: GcraScript, tat: Option<f64>, now: f64, args: &ScriptArgs) -> Decision {
    match script {
        GcraScript::AllowN => allow_n(tat, now, args),
        GcraScript::AllowAtMost => allow_at_most(tat, now, args),
    }
}

/// Snap `units` up to the next whole event if it falls short by less than
/// `tolerance`.
fn whole(units: f64, tolerance: f64) -> f64 {
    units.max((units + tolerance).floor())
}

/// Strict admission. A boundary `diff` of zero, up to rounding, is admitted.
pub fn allow_n(tat: Option<f64>, now: f64, args: &ScriptArgs) -> Decision {
    let emission_interval = args.emission_interval();
    let cost = args.cost as f64;
    let increment = emission_interval * cost;
    let burst_offset = emission_interval * args.burst as f64;

    let tat = tat.unwrap_or(now).max(now);
    let new_tat = tat + increment;
    let allow_at = new_tat - burst_offset;

    let diff = now - allow_at;
    let remaining = whole(diff / emission_interval, args.tolerance());

    if remaining < 0.0 {
        return Decision::reject(-diff, tat - now);
    }

    Decision::accept(cost, remaining, new_tat, now)
}

/// Best-effort admission: clamps the cost to the capacity left.
pub fn allow_at_most(tat: Option<f64>, now: f64, args: &ScriptArgs) -> Decision {
    let emission_interval = args.emission_interval();
    let burst_offset = emission_interval * args.burst as f64;

    let tat = tat.unwrap_or(now).max(now);

    let diff = now - (tat - burst_offset);
    let capacity = whole(diff / emission_interval, args.tolerance());

    if capacity < 1.0 {
        return Decision::reject(emission_interval - diff, tat - now);
    }

    let requested = args.cost as f64;
    let (cost, remaining) = if capacity < requested {
        (capacity, 0.0)
    } else {
        (requested, capacity - requested)
    };

    let new_tat = tat + emission_interval * cost;
    Decision::accept(cost, remaining, new_tat, now)
}
