use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

const DAYS_PER_PERIOD: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyPolicy {
    pub base_penalty_per_period: Decimal,
    pub grace_period_days: i64,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            base_penalty_per_period: Decimal::new(5_000, 0),
            grace_period_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PenaltyAssessment {
    pub days_overdue: i64,
    pub periods_overdue: i64,
    pub penalty: Decimal,
}

impl PenaltyPolicy {
    /// Obligations due strictly before this date are past the grace period.
    /// A grace period reaching past the calendar range yields `NaiveDate::MIN`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> NaiveDate {
        Duration::try_days(self.grace_period_days)
            .and_then(|grace| now.date_naive().checked_sub_signed(grace))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Penalty owed at `now`, recomputed from scratch. `None` while the
    /// obligation is still inside its grace period.
    pub fn assess(&self, due_date: NaiveDate, now: DateTime<Utc>) -> Option<PenaltyAssessment> {
        if due_date >= self.cutoff(now) {
            return None;
        }

        let due_at = due_date.and_hms_opt(0, 0, 0)?.and_utc();
        let days_overdue = (now - due_at).num_days();
        // Any started week counts as a whole one.
        let periods_overdue = ((days_overdue + DAYS_PER_PERIOD - 1) / DAYS_PER_PERIOD).max(1);

        Some(PenaltyAssessment {
            days_overdue,
            periods_overdue,
            penalty: self.base_penalty_per_period * Decimal::from(periods_overdue),
        })
    }
}
