//! Call budget for the external search provider.
//!
//! Two counting windows share one record: a one-second window and a
//! calendar-month window. A permit check either charges both windows or
//! charges neither.

use crate::error::{AppError, Result};
use chrono::{DateTime, Datelike, Duration, Utc};
use parking_lot::Mutex;

/// Mutable counters behind a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub second_count: u32,
    pub month_count: u32,
    pub last_second_reset: DateTime<Utc>,
    /// (year, month) of the month currently being counted.
    pub current_month: (i32, u32),
}

impl RateLimitWindow {
    fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            second_count: 0,
            month_count: 0,
            last_second_reset: now,
            current_month: month_marker(now),
        }
    }
}

fn month_marker(at: DateTime<Utc>) -> (i32, u32) {
    (at.year(), at.month())
}

pub struct RateLimiter {
    per_second: u32,
    per_month: u32,
    window: Mutex<RateLimitWindow>,
}

impl RateLimiter {
    pub fn new(per_second: u32, per_month: u32) -> Self {
        Self::starting_at(per_second, per_month, Utc::now())
    }

    /// Create a limiter whose windows open at `now`.
    pub fn starting_at(per_second: u32, per_month: u32, now: DateTime<Utc>) -> Self {
        Self {
            per_second,
            per_month,
            window: Mutex::new(RateLimitWindow::starting_at(now)),
        }
    }

    /// Charge one call against both windows, or fail without charging.
    pub fn check_limit(&self) -> Result<()> {
        self.check_limit_at(Utc::now())
    }

    pub fn check_limit_at(&self, now: DateTime<Utc>) -> Result<()> {
        let mut window = self.window.lock();

        if now.signed_duration_since(window.last_second_reset) > Duration::seconds(1) {
            window.second_count = 0;
            window.last_second_reset = now;
        }

        // Calendar boundary, not a rolling 30-day span.
        let month = month_marker(now);
        if month != window.current_month {
            window.month_count = 0;
            window.current_month = month;
        }

        if window.second_count >= self.per_second {
            return Err(self.reject(format!(
                "Maximum {} request(s) per second",
                self.per_second
            )));
        }
        if window.month_count >= self.per_month {
            return Err(self.reject(format!(
                "Maximum {} requests per month",
                self.per_month
            )));
        }

        window.second_count += 1;
        window.month_count += 1;
        Ok(())
    }

    fn reject(&self, message: String) -> AppError {
        tracing::warn!(reason = %message, "Search rate limit hit");
        metrics::counter!("rate_limit_rejections_total").increment(1);
        AppError::RateLimitExceeded(message)
    }

    /// Snapshot of the current counters.
    pub fn window(&self) -> RateLimitWindow {
        self.window.lock().clone()
    }
}
