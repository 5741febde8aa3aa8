//! Per-day running totals.

use super::{Amount, TaskType};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Totals for one UTC calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStatistic {
    /// Calendar date the totals belong to.
    pub stat_date: NaiveDate,
    /// Sum of completed boost amounts.
    pub total_boosted: Amount,
    /// Sum of completed unboost amounts.
    pub total_unboosted: Amount,
    /// Sum of completed redeem amounts.
    pub total_redeemed: Amount,
    /// Last time any total changed.
    pub updated_at: DateTime<Utc>,
}

impl DailyStatistic {
    /// Creates an all-zero row for `stat_date`.
    #[must_use]
    pub const fn empty(stat_date: NaiveDate, updated_at: DateTime<Utc>) -> Self {
        Self {
            stat_date,
            total_boosted: Amount::ZERO,
            total_unboosted: Amount::ZERO,
            total_redeemed: Amount::ZERO,
            updated_at,
        }
    }

    /// Adds `amount` to the bucket for `task_type`.
    pub fn add(&mut self, task_type: TaskType, amount: Amount, now: DateTime<Utc>) {
        let bucket = match task_type {
            TaskType::Boost => &mut self.total_boosted,
            TaskType::Unboost => &mut self.total_unboosted,
            TaskType::Redeem => &mut self.total_redeemed,
        };
        *bucket = bucket.saturating_add(amount);
        self.updated_at = now;
    }
}
