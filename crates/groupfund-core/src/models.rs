use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FundError, FundResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Inactive,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> FundResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(FundError::validation(format!(
                "member status must be active or inactive, got {other}"
            ))),
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Active => Self::Inactive,
            Self::Inactive => Self::Active,
        }
    }
}

/// A fund member. `phone` doubles as the messaging handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMember {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub status: Option<MemberStatus>,
}

impl CreateMember {
    pub fn normalized(self) -> FundResult<Self> {
        let name = self.name.trim().to_string();
        let phone = self.phone.trim().to_string();
        if name.is_empty() {
            return Err(FundError::validation("name is required"));
        }
        if phone.is_empty() {
            return Err(FundError::validation("phone is required"));
        }

        Ok(Self {
            name,
            phone,
            status: self.status,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateMember {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ObligationStatus {
    Unpaid,
    Overdue,
    Paid,
}

impl ObligationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> FundResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unpaid" => Ok(Self::Unpaid),
            "overdue" => Ok(Self::Overdue),
            "paid" => Ok(Self::Paid),
            other => Err(FundError::validation(format!(
                "contribution status must be unpaid, overdue or paid, got {other}"
            ))),
        }
    }

    /// Unpaid and overdue obligations can both still be settled.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Unpaid | Self::Overdue)
    }
}

/// One member's contribution for one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obligation {
    pub id: Uuid,
    pub member_id: Uuid,
    pub week: i32,
    pub amount: Decimal,
    pub penalty: Decimal,
    pub status: ObligationStatus,
    pub due_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Obligation {
    pub fn total_due(&self) -> Decimal {
        self.amount + self.penalty
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewObligation {
    pub member_id: Uuid,
    pub week: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

impl NewObligation {
    pub fn validate(&self) -> FundResult<()> {
        if self.week <= 0 {
            return Err(FundError::validation("week must be positive"));
        }
        if self.amount <= Decimal::ZERO {
            return Err(FundError::validation("amount must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObligationFilter {
    pub member_id: Option<Uuid>,
    pub week: Option<i32>,
    pub statuses: Vec<ObligationStatus>,
    /// Strictly earlier than this date.
    pub due_before: Option<NaiveDate>,
}

impl ObligationFilter {
    pub fn for_week(week: i32) -> Self {
        Self {
            week: Some(week),
            ..Self::default()
        }
    }

    pub fn outstanding() -> Self {
        Self {
            statuses: vec![ObligationStatus::Unpaid, ObligationStatus::Overdue],
            ..Self::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[ObligationStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_member(mut self, member_id: Uuid) -> Self {
        self.member_id = Some(member_id);
        self
    }

    pub fn due_before(mut self, date: NaiveDate) -> Self {
        self.due_before = Some(date);
        self
    }

    pub fn matches(&self, obligation: &Obligation) -> bool {
        self.member_id.is_none_or(|id| obligation.member_id == id)
            && self.week.is_none_or(|week| obligation.week == week)
            && (self.statuses.is_empty() || self.statuses.contains(&obligation.status))
            && self
                .due_before
                .is_none_or(|cutoff| obligation.due_date < cutoff)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> FundResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(FundError::validation(format!(
                "transaction status must be pending, success or failed, got {other}"
            ))),
        }
    }
}

/// A claimed settlement attempt against one obligation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub obligation_id: Uuid,
    pub member_id: Uuid,
    pub order_id: String,
    pub amount: Decimal,
    pub provider_trans_id: Option<String>,
    pub status: TransactionStatus,
    pub payment_url: Option<String>,
    pub qr_code_url: Option<String>,
    pub note: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentTransaction {
    pub obligation_id: Uuid,
    pub member_id: Uuid,
    pub order_id: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub provider_trans_id: Option<String>,
    pub payment_url: Option<String>,
    pub qr_code_url: Option<String>,
    pub note: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleCadence {
    Weekly,
    Monthly,
}

impl ScheduleCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn parse(value: &str) -> FundResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(FundError::validation(format!(
                "schedule type must be weekly or monthly, got {other}"
            ))),
        }
    }
}

/// Recurring contribution template. Admin-managed configuration only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub cadence: ScheduleCadence,
    pub amount: Decimal,
    pub day_of_week: Option<i16>,
    pub day_of_month: Option<i16>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInput {
    pub name: String,
    #[serde(rename = "type")]
    pub cadence: ScheduleCadence,
    pub amount: Decimal,
    pub day_of_week: Option<i16>,
    pub day_of_month: Option<i16>,
    pub is_active: Option<bool>,
}

impl ScheduleInput {
    /// Checks the cadence-specific day field and clears the other one.
    pub fn normalized(self) -> FundResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(FundError::validation("schedule name is required"));
        }
        if self.amount <= Decimal::ZERO {
            return Err(FundError::validation("schedule amount must be positive"));
        }

        let (day_of_week, day_of_month) = match self.cadence {
            ScheduleCadence::Weekly => match self.day_of_week {
                Some(day) if (0..=6).contains(&day) => (Some(day), None),
                _ => {
                    return Err(FundError::validation(
                        "day_of_week must be between 0 (Sunday) and 6 (Saturday)",
                    ));
                }
            },
            ScheduleCadence::Monthly => match self.day_of_month {
                Some(day) if (1..=31).contains(&day) => (None, Some(day)),
                _ => {
                    return Err(FundError::validation(
                        "day_of_month must be between 1 and 31",
                    ));
                }
            },
        };

        Ok(Self {
            name,
            cadence: self.cadence,
            amount: self.amount,
            day_of_week,
            day_of_month,
            is_active: self.is_active,
        })
    }
}
