use chrono::{DateTime, Utc};
use groupfund_core::{
    BroadcastReport, FundError, FundResult, MemberStatus, ObligationFilter, ObligationStatus,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Ledger;
use crate::templates;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub week: i32,
    pub processed: usize,
    pub notifications_sent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastKind {
    WeeklyReminder { week: i32 },
    MonthlyReport,
    Custom(String),
}

impl BroadcastKind {
    /// Custom text wins over the named template.
    pub fn from_request(
        message_type: Option<&str>,
        week: Option<i32>,
        custom: Option<String>,
    ) -> FundResult<Self> {
        if let Some(text) = custom.filter(|text| !text.trim().is_empty()) {
            return Ok(Self::Custom(text));
        }

        match message_type {
            Some("weekly_reminder") => {
                let week = week
                    .filter(|week| *week > 0)
                    .ok_or_else(|| FundError::validation("week is required for weekly_reminder"))?;
                Ok(Self::WeeklyReminder { week })
            }
            Some("monthly_report") => Ok(Self::MonthlyReport),
            Some(other) => Err(FundError::validation(format!(
                "unsupported message type: {other}"
            ))),
            None => Err(FundError::validation("messageType or customMessage is required")),
        }
    }

    fn render(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::WeeklyReminder { week } => templates::weekly_broadcast(*week),
            Self::MonthlyReport => templates::monthly_broadcast(now),
            Self::Custom(text) => text.clone(),
        }
    }
}

/// Templated notice about one member's week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberNotice {
    Reminder,
    Overdue,
}

impl MemberNotice {
    pub fn parse(value: &str) -> FundResult<Self> {
        match value.trim() {
            "reminder" => Ok(Self::Reminder),
            "overdue" => Ok(Self::Overdue),
            other => Err(FundError::validation(format!(
                "message type must be reminder or overdue, got {other}"
            ))),
        }
    }
}

impl Ledger {
    /// Reminds every member with an unpaid obligation for `week`.
    pub async fn send_reminders(&self, week: i32) -> FundResult<ReminderReport> {
        if week <= 0 {
            return Err(FundError::validation("week must be positive"));
        }

        let unpaid = self
            .store
            .list_obligations(
                &ObligationFilter::for_week(week).with_statuses(&[ObligationStatus::Unpaid]),
            )
            .await?;
        let mut report = ReminderReport {
            week,
            processed: unpaid.len(),
            notifications_sent: 0,
        };

        for obligation in unpaid {
            let member = match self.store.get_member(obligation.member_id).await {
                Ok(member) => member,
                Err(err) => {
                    warn!("reminder skipped for contribution {}: {err}", obligation.id);
                    continue;
                }
            };
            let text = templates::reminder(
                &member.name,
                obligation.week,
                obligation.amount,
                obligation.due_date,
            );
            if self.notify_paced(&member.phone, &text).await == Some(true) {
                report.notifications_sent += 1;
            }
        }

        info!(
            "week {week} reminders: {}/{} delivered",
            report.notifications_sent, report.processed
        );
        Ok(report)
    }

    /// Sends one text to every active member.
    pub async fn broadcast(
        &self,
        kind: BroadcastKind,
        now: DateTime<Utc>,
    ) -> FundResult<BroadcastReport> {
        if !self.notifier.is_configured() {
            return Err(FundError::validation("notification gateway is not configured"));
        }

        let members = self.store.list_members(Some(MemberStatus::Active)).await?;
        if members.is_empty() {
            return Err(FundError::not_found("member", "active"));
        }

        let handles: Vec<String> = members.into_iter().map(|member| member.phone).collect();
        let text = kind.render(now);
        let report = self
            .notifier
            .broadcast(&handles, &text, self.config.notification_pacing)
            .await;

        info!("broadcast delivered to {}/{} members", report.sent, handles.len());
        Ok(report)
    }

    /// Direct single message, surfacing the delivery error.
    pub async fn send_message(&self, handle: &str, text: &str) -> FundResult<()> {
        if handle.trim().is_empty() || text.trim().is_empty() {
            return Err(FundError::validation("recipient and message are required"));
        }
        if !self.notifier.is_configured() {
            return Err(FundError::validation("notification gateway is not configured"));
        }

        self.notifier.send(handle.trim(), text).await
    }

    /// Sends the reminder or overdue template for the member's `week`.
    pub async fn send_member_notice(
        &self,
        member_id: Uuid,
        week: i32,
        notice: MemberNotice,
    ) -> FundResult<()> {
        let member = self.store.get_member(member_id).await?;
        let obligation = self
            .store
            .find_obligation(member_id, week)
            .await?
            .ok_or_else(|| FundError::not_found("contribution", format!("{member_id}/week {week}")))?;

        let text = match notice {
            MemberNotice::Reminder => templates::reminder(
                &member.name,
                obligation.week,
                obligation.amount,
                obligation.due_date,
            ),
            MemberNotice::Overdue => templates::overdue(
                &member.name,
                obligation.week,
                obligation.amount,
                obligation.penalty,
                obligation.due_date,
            ),
        };
        self.send_message(&member.phone, &text).await
    }
}
