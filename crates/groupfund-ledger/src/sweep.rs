use chrono::{DateTime, Utc};
use groupfund_core::{FundResult, Obligation, ObligationFilter, ObligationStatus};
use serde::Serialize;
use tracing::{info, warn};

use crate::Ledger;
use crate::templates;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub candidates: usize,
    /// Obligations whose status or penalty changed.
    pub processed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub notifications_sent: usize,
}

enum Accrual {
    Changed(Obligation),
    Unchanged,
}

impl Ledger {
    /// Recomputes the penalty of every outstanding obligation past its
    /// grace period. One failing item never stops the run.
    pub async fn run_penalty_sweep(&self, now: DateTime<Utc>) -> FundResult<SweepReport> {
        let policy = self.config.penalty;
        let candidates = self
            .store
            .list_obligations(&ObligationFilter::outstanding().due_before(policy.cutoff(now)))
            .await?;

        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for obligation in candidates {
            match self.accrue(&obligation, now).await {
                Ok(Accrual::Changed(updated)) => {
                    report.processed += 1;
                    if self.notify_overdue(&updated).await {
                        report.notifications_sent += 1;
                    }
                }
                Ok(Accrual::Unchanged) => report.unchanged += 1,
                Err(err) => {
                    warn!("penalty sweep failed for contribution {}: {err}", obligation.id);
                    report.failed += 1;
                }
            }
        }

        info!(
            "penalty sweep: {} candidates, {} updated, {} unchanged, {} failed, {} notified",
            report.candidates,
            report.processed,
            report.unchanged,
            report.failed,
            report.notifications_sent
        );
        Ok(report)
    }

    async fn accrue(&self, obligation: &Obligation, now: DateTime<Utc>) -> FundResult<Accrual> {
        let Some(assessment) = self.config.penalty.assess(obligation.due_date, now) else {
            return Ok(Accrual::Unchanged);
        };
        let penalty = assessment.penalty.max(obligation.penalty);

        if !obligation.status.is_outstanding()
            || (obligation.status == ObligationStatus::Overdue && obligation.penalty == penalty)
        {
            return Ok(Accrual::Unchanged);
        }

        match self.store.apply_penalty(obligation.id, penalty).await? {
            Some(updated) => Ok(Accrual::Changed(updated)),
            // Settled or re-penalised since it was listed.
            None => Ok(Accrual::Unchanged),
        }
    }

    async fn notify_overdue(&self, obligation: &Obligation) -> bool {
        if !self.notifier.is_configured() {
            return false;
        }

        let member = match self.store.get_member(obligation.member_id).await {
            Ok(member) => member,
            Err(err) => {
                warn!("no member for overdue contribution {}: {err}", obligation.id);
                return false;
            }
        };
        let text = templates::overdue(
            &member.name,
            obligation.week,
            obligation.amount,
            obligation.penalty,
            obligation.due_date,
        );
        self.notify_paced(&member.phone, &text).await == Some(true)
    }
}
