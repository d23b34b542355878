//! Per-owner cost accounting (spec §4.5, §5, §8): atomic daily/monthly
//! counters; a request that would breach the ceiling is denied before
//! incrementing, never estimated post-hoc.

use dashmap::DashMap;
use parking_lot::Mutex;

struct OwnerCounters {
    day_bucket: String,
    day_total: f64,
    month_bucket: String,
    month_total: f64,
}

/// Process-wide cost counters, one of the two long-lived shared-state
/// stores named in spec §9 ("Process-wide state"), alongside the registry
/// cache.
pub struct CostTracker {
    owners: DashMap<String, Mutex<OwnerCounters>>,
    max_daily_cost_usd: f64,
    max_monthly_cost_usd: f64,
}

impl CostTracker {
    pub fn new(max_daily_cost_usd: f64, max_monthly_cost_usd: f64) -> Self {
        Self { owners: DashMap::new(), max_daily_cost_usd, max_monthly_cost_usd }
    }

    fn day_bucket() -> String {
        chrono::Utc::now().format("%Y-%m-%d").to_string()
    }

    fn month_bucket() -> String {
        chrono::Utc::now().format("%Y-%m").to_string()
    }

    /// Remaining budget for `owner_id` given already-spent cost this
    /// day/month, reset lazily when the bucket rolls over.
    pub fn remaining_budget(&self, owner_id: &str) -> f64 {
        let entry = self.owners.entry(owner_id.to_string()).or_insert_with(|| {
            Mutex::new(OwnerCounters { day_bucket: Self::day_bucket(), day_total: 0.0, month_bucket: Self::month_bucket(), month_total: 0.0 })
        });
        let mut counters = entry.lock();
        self.roll_buckets(&mut counters);
        (self.max_daily_cost_usd - counters.day_total).min(self.max_monthly_cost_usd - counters.month_total)
    }

    fn roll_buckets(&self, counters: &mut OwnerCounters) {
        let day = Self::day_bucket();
        if counters.day_bucket != day {
            counters.day_bucket = day;
            counters.day_total = 0.0;
        }
        let month = Self::month_bucket();
        if counters.month_bucket != month {
            counters.month_bucket = month;
            counters.month_total = 0.0;
        }
    }

    /// Attempts to reserve `cost_usd` for `owner_id`. Returns `false`
    /// (ceiling breach) without incrementing anything — spec §8: "attempted
    /// over-budget calls are observed as `llm_cost_ceiling` events with no
    /// cost delta".
    pub fn try_charge(&self, owner_id: &str, cost_usd: f64) -> bool {
        let entry = self.owners.entry(owner_id.to_string()).or_insert_with(|| {
            Mutex::new(OwnerCounters { day_bucket: Self::day_bucket(), day_total: 0.0, month_bucket: Self::month_bucket(), month_total: 0.0 })
        });
        let mut counters = entry.lock();
        self.roll_buckets(&mut counters);
        if counters.day_total + cost_usd > self.max_daily_cost_usd || counters.month_total + cost_usd > self.max_monthly_cost_usd {
            return false;
        }
        counters.day_total += cost_usd;
        counters.month_total += cost_usd;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_within_ceiling_increments_counters() {
        let tracker = CostTracker::new(1.0, 10.0);
        assert!(tracker.try_charge("owner-1", 0.5));
        assert!((tracker.remaining_budget("owner-1") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn charge_exceeding_daily_ceiling_is_denied_without_delta() {
        let tracker = CostTracker::new(0.0, 10.0);
        assert!(!tracker.try_charge("owner-1", 0.01));
        assert!((tracker.remaining_budget("owner-1") - 0.0).abs() < 1e-9);
    }
}
