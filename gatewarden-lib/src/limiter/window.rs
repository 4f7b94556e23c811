//! The sliding-window counting algorithm, kept pure so its semantics are
//! identical on every replica and directly testable.

/// Outcome of sliding the window for one request arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Epoch milliseconds at which the client regains budget. Floored to
    /// one second past `now` so a just-denied client always gets a non-zero
    /// retry hint.
    pub reset_time_ms: i64,
    pub retry_after_secs: u64,
    /// The timestamp list to persist.
    pub timestamps: Vec<i64>,
}

/// Slide the window for a request arriving at `now_ms`.
///
/// Timestamps older than the window are evicted first; retention is strict
/// (`ts > now - period*1000`), so a timestamp exactly `period` old is
/// gone. If the surviving list is under `limit`, `now_ms` is appended and
/// the request is allowed; otherwise it is denied and the list is left as
/// is. The list is then truncated to the newest `limit` entries.
pub fn slide(stored: Vec<i64>, now_ms: i64, limit: u64, period_secs: u64) -> WindowDecision {
    let window_start = now_ms - (period_secs as i64) * 1000;
    let mut timestamps: Vec<i64> = stored.into_iter().filter(|&ts| ts > window_start).collect();

    let allowed = (timestamps.len() as u64) < limit;
    if allowed {
        timestamps.push(now_ms);
    }
    if timestamps.len() as u64 > limit {
        let excess = timestamps.len() - limit as usize;
        timestamps.drain(..excess);
    }

    let remaining = limit.saturating_sub(timestamps.len() as u64);
    let reset_time_ms = timestamps
        .first()
        .map(|&oldest| oldest + (period_secs as i64) * 1000)
        .unwrap_or(now_ms)
        .max(now_ms + 1000);
    let retry_after_secs = ((reset_time_ms - now_ms) / 1000).max(0) as u64;

    WindowDecision { allowed, limit, remaining, reset_time_ms, retry_after_secs, timestamps }
}

/// Read-only variant for introspection: evicts stale entries and reports
/// the budget without recording an arrival.
pub fn peek(stored: Vec<i64>, now_ms: i64, limit: u64, period_secs: u64) -> WindowDecision {
    let window_start = now_ms - (period_secs as i64) * 1000;
    let timestamps: Vec<i64> = stored.into_iter().filter(|&ts| ts > window_start).collect();

    let remaining = limit.saturating_sub(timestamps.len() as u64);
    let reset_time_ms = timestamps
        .first()
        .map(|&oldest| oldest + (period_secs as i64) * 1000)
        .unwrap_or(now_ms)
        .max(now_ms + 1000);
    let retry_after_secs = ((reset_time_ms - now_ms) / 1000).max(0) as u64;

    WindowDecision {
        allowed: remaining > 0,
        limit,
        remaining,
        reset_time_ms,
        retry_after_secs,
        timestamps,
    }
}
