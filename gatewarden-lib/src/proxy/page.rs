use crate::proxy::dispatcher::CounterVerdict;

/// Renders the human-visible rate-limit page served to browsers on denial.
/// The actual template is an external concern; hosts swap in their own
/// implementation.
pub trait RateLimitPage: Send + Sync {
    fn render(&self, verdict: &CounterVerdict) -> String;
}

/// Built-in minimal page: limit, period, formatted reset, countdown hint.
pub struct DefaultRateLimitPage;

impl RateLimitPage for DefaultRateLimitPage {
    fn render(&self, verdict: &CounterVerdict) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head><title>Rate limit exceeded</title></head>\n<body>\n\
             <h1>Rate limit exceeded</h1>\n\
             <p>You have exceeded the limit of {} requests per {} seconds.</p>\n\
             <p>Access resets at {}. Try again in {} seconds.</p>\n\
             </body>\n</html>\n",
            verdict.decision.limit,
            verdict.period_secs,
            format_reset(verdict.decision.reset_time_ms),
            verdict.decision.retry_after_secs,
        )
    }
}

/// Human-formatted reset time in UTC.
pub fn format_reset(reset_time_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(reset_time_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
