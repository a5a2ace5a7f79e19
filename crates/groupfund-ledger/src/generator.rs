use chrono::NaiveDate;
use groupfund_core::{FundError, FundResult, MemberStatus, NewObligation};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::Ledger;

#[derive(Debug, Clone, Copy)]
pub struct GenerateObligations {
    pub week: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub week: i32,
    pub active_members: usize,
    pub created: usize,
    /// Members that already had an obligation for the week.
    pub skipped: usize,
    pub failed: usize,
}

impl Ledger {
    /// Creates one unpaid obligation per active member for the week.
    /// Re-running for the same week creates nothing new.
    pub async fn generate_obligations(
        &self,
        request: GenerateObligations,
    ) -> FundResult<GenerationReport> {
        if request.week <= 0 {
            return Err(FundError::validation("week must be positive"));
        }
        if request.amount <= Decimal::ZERO {
            return Err(FundError::validation("amount must be positive"));
        }

        let members = self.store.list_members(Some(MemberStatus::Active)).await?;
        let mut report = GenerationReport {
            week: request.week,
            active_members: members.len(),
            ..GenerationReport::default()
        };

        for member in members {
            match self.store.find_obligation(member.id, request.week).await {
                Ok(Some(_)) => {
                    report.skipped += 1;
                    continue;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("generator lookup failed for member {}: {err}", member.id);
                    report.failed += 1;
                    continue;
                }
            }

            let input = NewObligation {
                member_id: member.id,
                week: request.week,
                amount: request.amount,
                due_date: request.due_date,
            };
            match self.store.insert_obligation(input).await {
                Ok(_) => report.created += 1,
                // A concurrent run inserted it first.
                Err(FundError::Validation { .. }) => report.skipped += 1,
                Err(err) => {
                    warn!("generator insert failed for member {}: {err}", member.id);
                    report.failed += 1;
                }
            }
        }

        info!(
            "week {}: created {} contributions for {} active members ({} existing, {} failed)",
            report.week, report.created, report.active_members, report.skipped, report.failed
        );
        Ok(report)
    }
}
