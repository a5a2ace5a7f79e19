use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::FundResult;
use crate::models::{
    CreateMember, Member, MemberStatus, NewObligation, NewPaymentTransaction, Obligation,
    ObligationFilter, PaymentTransaction, Schedule, ScheduleInput, UpdateMember,
};

/// How the payment row is written when an obligation is settled.
#[derive(Debug, Clone)]
pub enum SettlementRecord {
    /// Insert a fresh `success` row.
    New(NewPaymentTransaction),
    /// Flip the `pending` row with this order id to `success`.
    CompletePending {
        order_id: String,
        provider_trans_id: String,
    },
    /// The `success` row already exists.
    Existing(Uuid),
}

#[derive(Debug, Clone)]
pub struct Settlement {
    pub obligation: Obligation,
    pub transaction: PaymentTransaction,
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn create_member(&self, input: CreateMember) -> FundResult<Member>;
    async fn get_member(&self, id: Uuid) -> FundResult<Member>;
    async fn find_member_by_phone(&self, phone: &str) -> FundResult<Option<Member>>;
    async fn list_members(&self, status: Option<MemberStatus>) -> FundResult<Vec<Member>>;
    async fn update_member(&self, id: Uuid, input: UpdateMember) -> FundResult<Member>;
    /// Removes the member together with its obligations.
    async fn delete_member(&self, id: Uuid) -> FundResult<()>;
}

#[async_trait]
pub trait ObligationStore: Send + Sync {
    /// Fails with `Validation` when the member already has an obligation for the week.
    async fn insert_obligation(&self, input: NewObligation) -> FundResult<Obligation>;
    async fn get_obligation(&self, id: Uuid) -> FundResult<Obligation>;
    async fn find_obligation(&self, member_id: Uuid, week: i32)
    -> FundResult<Option<Obligation>>;
    async fn list_obligations(&self, filter: &ObligationFilter) -> FundResult<Vec<Obligation>>;

    /// Marks the obligation overdue with `penalty`, but only while it is
    /// still outstanding and its stored penalty does not exceed `penalty`.
    async fn apply_penalty(&self, id: Uuid, penalty: Decimal) -> FundResult<Option<Obligation>>;

    /// Atomically moves the obligation to paid and writes the payment row.
    /// Returns `None` without writing anything if it is already paid.
    async fn settle_obligation(
        &self,
        id: Uuid,
        paid_at: DateTime<Utc>,
        record: SettlementRecord,
    ) -> FundResult<Option<Settlement>>;

    async fn delete_obligation(&self, id: Uuid) -> FundResult<()>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Order ids are unique; a duplicate fails with `Validation`.
    async fn insert_transaction(
        &self,
        input: NewPaymentTransaction,
    ) -> FundResult<PaymentTransaction>;
    async fn find_transaction_by_order(
        &self,
        order_id: &str,
    ) -> FundResult<Option<PaymentTransaction>>;
    async fn find_success_by_provider_id(
        &self,
        provider_trans_id: &str,
    ) -> FundResult<Option<PaymentTransaction>>;
    async fn list_transactions(&self, obligation_id: Uuid) -> FundResult<Vec<PaymentTransaction>>;
    /// Only a `pending` row is moved to `failed`.
    async fn mark_transaction_failed(
        &self,
        order_id: &str,
        provider_trans_id: Option<&str>,
    ) -> FundResult<Option<PaymentTransaction>>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_schedule(&self, input: ScheduleInput) -> FundResult<Schedule>;
    async fn get_schedule(&self, id: Uuid) -> FundResult<Schedule>;
    async fn list_schedules(&self) -> FundResult<Vec<Schedule>>;
    async fn update_schedule(&self, id: Uuid, input: ScheduleInput) -> FundResult<Schedule>;
    async fn delete_schedule(&self, id: Uuid) -> FundResult<()>;
}

pub trait FundStore: MemberStore + ObligationStore + TransactionStore + ScheduleStore {}

impl<T> FundStore for T where T: MemberStore + ObligationStore + TransactionStore + ScheduleStore {}
