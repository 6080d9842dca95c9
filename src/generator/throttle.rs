//! Generation throttling.
//!
//! Cooldowns and daily caps are tracked per (rule, user) in memory; a
//! process restart resets them. Daily counters are keyed by local calendar
//! date and stale entries are purged lazily when a new day begins.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};

#[derive(Default)]
pub struct ThrottleTracker {
    cooldowns: HashMap<(String, String), DateTime<Utc>>,
    daily_counts: HashMap<(String, String, NaiveDate), u32>,
}

impl ThrottleTracker {
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether the cooldown for (rule, user) has elapsed at `now`. A zero
    /// cooldown always passes.
    pub fn cooldown_elapsed(
        &self,
        rule_id: &str,
        user_id: &str,
        cooldown_ms: u64,
        now: DateTime<Utc>,
    ) -> bool {
        if cooldown_ms == 0 {
            return true;
        }
        match self
            .cooldowns
            .get(&(rule_id.to_string(), user_id.to_string()))
        {
            Some(last) => now - *last >= Duration::milliseconds(cooldown_ms as i64),
            None => true,
        }
    }

    /// Whether (rule, user) is still under its daily cap on `date`. A zero
    /// cap means unlimited.
    pub fn under_daily_cap(
        &self,
        rule_id: &str,
        user_id: &str,
        max_per_day: u32,
        date: NaiveDate,
    ) -> bool {
        if max_per_day == 0 {
            return true;
        }
        let count = self
            .daily_counts
            .get(&(rule_id.to_string(), user_id.to_string(), date))
            .copied()
            .unwrap_or(0);
        count < max_per_day
    }

    /// Records a generation for (rule, user).
    pub fn record(&mut self, rule_id: &str, user_id: &str, now: DateTime<Utc>, date: NaiveDate) {
        self.cooldowns
            .insert((rule_id.to_string(), user_id.to_string()), now);
        *self
            .daily_counts
            .entry((rule_id.to_string(), user_id.to_string(), date))
            .or_insert(0) += 1;
    }

    /// Drops daily counters from previous days.
    pub fn purge_stale(&mut self, today: NaiveDate) {
        self.daily_counts.retain(|(_, _, date), _| *date == today);
    }

    #[cfg(test)]
    pub fn daily_entries(&self) -> usize {
        self.daily_counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn zero_cooldown_always_passes() {
        let mut tracker = ThrottleTracker::new();
        let now = Utc::now();
        tracker.record("r", "u", now, date("2026-08-23"));
        assert!(tracker.cooldown_elapsed("r", "u", 0, now));
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let mut tracker = ThrottleTracker::new();
        let now = Utc::now();
        tracker.record("r", "u", now, date("2026-08-23"));

        assert!(!tracker.cooldown_elapsed("r", "u", 300_000, now + Duration::minutes(4)));
        assert!(tracker.cooldown_elapsed("r", "u", 300_000, now + Duration::minutes(5)));
        // Other users are unaffected.
        assert!(tracker.cooldown_elapsed("r", "other", 300_000, now));
    }

    #[test]
    fn daily_cap_counts_per_rule_user_and_day() {
        let mut tracker = ThrottleTracker::new();
        let now = Utc::now();
        let today = date("2026-08-23");

        assert!(tracker.under_daily_cap("r", "u", 2, today));
        tracker.record("r", "u", now, today);
        tracker.record("r", "u", now, today);
        assert!(!tracker.under_daily_cap("r", "u", 2, today));

        // A new day resets the effective count.
        assert!(tracker.under_daily_cap("r", "u", 2, date("2026-08-24")));
        // Unlimited when the cap is zero.
        assert!(tracker.under_daily_cap("r", "u", 0, today));
    }

    #[test]
    fn purge_drops_previous_days_only() {
        let mut tracker = ThrottleTracker::new();
        let now = Utc::now();
        tracker.record("r", "u", now, date("2026-08-22"));
        tracker.record("r", "u", now, date("2026-08-23"));
        assert_eq!(tracker.daily_entries(), 2);

        tracker.purge_stale(date("2026-08-23"));
        assert_eq!(tracker.daily_entries(), 1);
        assert!(!tracker.under_daily_cap("r", "u", 1, date("2026-08-23")));
    }
}
