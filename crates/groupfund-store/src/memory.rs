use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use groupfund_core::{
    CreateMember, FundError, FundResult, Member, MemberStatus, MemberStore, NewObligation,
    NewPaymentTransaction, Obligation, ObligationFilter, ObligationStatus, ObligationStore,
    PaymentTransaction, Schedule, ScheduleInput, ScheduleStore, Settlement, SettlementRecord,
    TransactionStatus, TransactionStore, UpdateMember,
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct FundState {
    members: HashMap<Uuid, Member>,
    obligations: HashMap<Uuid, Obligation>,
    transactions: HashMap<Uuid, PaymentTransaction>,
    schedules: HashMap<Uuid, Schedule>,
}

impl FundState {
    fn transaction_by_order(&self, order_id: &str) -> Option<&PaymentTransaction> {
        self.transactions
            .values()
            .find(|transaction| transaction.order_id == order_id)
    }

    /// At most one `success` row may carry a given provider transaction id.
    fn ensure_provider_id_unused(&self, provider_trans_id: &str) -> FundResult<()> {
        let taken = self.transactions.values().any(|transaction| {
            transaction.status == TransactionStatus::Success
                && transaction.provider_trans_id.as_deref() == Some(provider_trans_id)
        });
        if taken {
            return Err(FundError::DuplicateTransaction {
                provider_trans_id: provider_trans_id.to_string(),
            });
        }
        Ok(())
    }

    fn insert_transaction(
        &mut self,
        input: NewPaymentTransaction,
        now: DateTime<Utc>,
    ) -> FundResult<PaymentTransaction> {
        if self.transaction_by_order(&input.order_id).is_some() {
            return Err(FundError::validation(format!(
                "order_id {} already exists",
                input.order_id
            )));
        }
        if input.status == TransactionStatus::Success {
            if let Some(provider_trans_id) = input.provider_trans_id.as_deref() {
                self.ensure_provider_id_unused(provider_trans_id)?;
            }
        }

        let transaction = PaymentTransaction {
            id: Uuid::new_v4(),
            obligation_id: input.obligation_id,
            member_id: input.member_id,
            order_id: input.order_id,
            amount: input.amount,
            provider_trans_id: input.provider_trans_id,
            status: input.status,
            payment_url: input.payment_url,
            qr_code_url: input.qr_code_url,
            note: input.note,
            paid_at: input.paid_at,
            created_at: now,
            updated_at: now,
        };
        self.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }
}

/// Whole-state store behind one lock; every conditional write happens
/// under a single write guard.
#[derive(Default)]
pub struct InMemoryFundStore {
    state: RwLock<FundState>,
}

impl InMemoryFundStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_created<T, F>(mut items: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

#[async_trait]
impl MemberStore for InMemoryFundStore {
    async fn create_member(&self, input: CreateMember) -> FundResult<Member> {
        let input = input.normalized()?;
        let now = Utc::now();
        let member = Member {
            id: Uuid::new_v4(),
            name: input.name,
            phone: input.phone,
            status: input.status.unwrap_or(MemberStatus::Active),
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn get_member(&self, id: Uuid) -> FundResult<Member> {
        let state = self.state.read().await;
        state
            .members
            .get(&id)
            .cloned()
            .ok_or_else(|| FundError::not_found("member", id))
    }

    async fn find_member_by_phone(&self, phone: &str) -> FundResult<Option<Member>> {
        let state = self.state.read().await;
        Ok(state
            .members
            .values()
            .find(|member| member.phone == phone.trim())
            .cloned())
    }

    async fn list_members(&self, status: Option<MemberStatus>) -> FundResult<Vec<Member>> {
        let state = self.state.read().await;
        let members = state
            .members
            .values()
            .filter(|member| status.is_none_or(|status| member.status == status))
            .cloned()
            .collect();
        Ok(sorted_by_created(members, |member: &Member| member.created_at))
    }

    async fn update_member(&self, id: Uuid, input: UpdateMember) -> FundResult<Member> {
        let name = input.name.map(|name| name.trim().to_string());
        let phone = input.phone.map(|phone| phone.trim().to_string());
        if name.as_deref() == Some("") || phone.as_deref() == Some("") {
            return Err(FundError::validation("name and phone must not be empty"));
        }

        let mut state = self.state.write().await;
        let member = state
            .members
            .get_mut(&id)
            .ok_or_else(|| FundError::not_found("member", id))?;

        if let Some(name) = name {
            member.name = name;
        }
        if let Some(phone) = phone {
            member.phone = phone;
        }
        if let Some(status) = input.status {
            member.status = status;
        }
        member.updated_at = Utc::now();

        Ok(member.clone())
    }

    async fn delete_member(&self, id: Uuid) -> FundResult<()> {
        let mut state = self.state.write().await;
        if state.members.remove(&id).is_none() {
            return Err(FundError::not_found("member", id));
        }
        state
            .obligations
            .retain(|_, obligation| obligation.member_id != id);
        state
            .transactions
            .retain(|_, transaction| transaction.member_id != id);
        Ok(())
    }
}

#[async_trait]
impl ObligationStore for InMemoryFundStore {
    async fn insert_obligation(&self, input: NewObligation) -> FundResult<Obligation> {
        input.validate()?;

        let mut state = self.state.write().await;
        if !state.members.contains_key(&input.member_id) {
            return Err(FundError::not_found("member", input.member_id));
        }
        if state
            .obligations
            .values()
            .any(|existing| existing.member_id == input.member_id && existing.week == input.week)
        {
            return Err(FundError::validation(format!(
                "member {} already has a contribution for week {}",
                input.member_id, input.week
            )));
        }

        let now = Utc::now();
        let obligation = Obligation {
            id: Uuid::new_v4(),
            member_id: input.member_id,
            week: input.week,
            amount: input.amount,
            penalty: Decimal::ZERO,
            status: ObligationStatus::Unpaid,
            due_date: input.due_date,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        state.obligations.insert(obligation.id, obligation.clone());
        Ok(obligation)
    }

    async fn get_obligation(&self, id: Uuid) -> FundResult<Obligation> {
        let state = self.state.read().await;
        state
            .obligations
            .get(&id)
            .cloned()
            .ok_or_else(|| FundError::not_found("contribution", id))
    }

    async fn find_obligation(
        &self,
        member_id: Uuid,
        week: i32,
    ) -> FundResult<Option<Obligation>> {
        let state = self.state.read().await;
        Ok(state
            .obligations
            .values()
            .find(|obligation| obligation.member_id == member_id && obligation.week == week)
            .cloned())
    }

    async fn list_obligations(&self, filter: &ObligationFilter) -> FundResult<Vec<Obligation>> {
        let state = self.state.read().await;
        let mut obligations: Vec<Obligation> = state
            .obligations
            .values()
            .filter(|obligation| filter.matches(obligation))
            .cloned()
            .collect();
        obligations.sort_by(|a, b| b.week.cmp(&a.week).then(a.created_at.cmp(&b.created_at)));
        Ok(obligations)
    }

    async fn apply_penalty(&self, id: Uuid, penalty: Decimal) -> FundResult<Option<Obligation>> {
        let mut state = self.state.write().await;
        let obligation = state
            .obligations
            .get_mut(&id)
            .ok_or_else(|| FundError::not_found("contribution", id))?;

        if !obligation.status.is_outstanding() || obligation.penalty > penalty {
            return Ok(None);
        }

        obligation.status = ObligationStatus::Overdue;
        obligation.penalty = penalty;
        obligation.updated_at = Utc::now();
        Ok(Some(obligation.clone()))
    }

    async fn settle_obligation(
        &self,
        id: Uuid,
        paid_at: DateTime<Utc>,
        record: SettlementRecord,
    ) -> FundResult<Option<Settlement>> {
        let mut state = self.state.write().await;
        let current = state
            .obligations
            .get(&id)
            .ok_or_else(|| FundError::not_found("contribution", id))?;
        if current.status == ObligationStatus::Paid {
            return Ok(None);
        }

        let now = Utc::now();
        let transaction = match record {
            SettlementRecord::New(input) => state.insert_transaction(input, now)?,
            SettlementRecord::CompletePending {
                order_id,
                provider_trans_id,
            } => {
                state.ensure_provider_id_unused(&provider_trans_id)?;
                let transaction = state
                    .transactions
                    .values_mut()
                    .find(|transaction| {
                        transaction.order_id == order_id
                            && transaction.status == TransactionStatus::Pending
                    })
                    .ok_or_else(|| FundError::not_found("pending transaction", &order_id))?;
                transaction.status = TransactionStatus::Success;
                transaction.provider_trans_id = Some(provider_trans_id);
                transaction.paid_at = Some(paid_at);
                transaction.updated_at = now;
                transaction.clone()
            }
            SettlementRecord::Existing(transaction_id) => state
                .transactions
                .get(&transaction_id)
                .cloned()
                .ok_or_else(|| FundError::not_found("transaction", transaction_id))?,
        };

        let Some(obligation) = state.obligations.get_mut(&id) else {
            return Err(FundError::not_found("contribution", id));
        };
        obligation.status = ObligationStatus::Paid;
        obligation.paid_at = Some(paid_at);
        obligation.updated_at = now;

        Ok(Some(Settlement {
            obligation: obligation.clone(),
            transaction,
        }))
    }

    async fn delete_obligation(&self, id: Uuid) -> FundResult<()> {
        let mut state = self.state.write().await;
        if state.obligations.remove(&id).is_none() {
            return Err(FundError::not_found("contribution", id));
        }
        state
            .transactions
            .retain(|_, transaction| transaction.obligation_id != id);
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for InMemoryFundStore {
    async fn insert_transaction(
        &self,
        input: NewPaymentTransaction,
    ) -> FundResult<PaymentTransaction> {
        let mut state = self.state.write().await;
        state.insert_transaction(input, Utc::now())
    }

    async fn find_transaction_by_order(
        &self,
        order_id: &str,
    ) -> FundResult<Option<PaymentTransaction>> {
        let state = self.state.read().await;
        Ok(state.transaction_by_order(order_id).cloned())
    }

    async fn find_success_by_provider_id(
        &self,
        provider_trans_id: &str,
    ) -> FundResult<Option<PaymentTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .find(|transaction| {
                transaction.status == TransactionStatus::Success
                    && transaction.provider_trans_id.as_deref() == Some(provider_trans_id)
            })
            .cloned())
    }

    async fn list_transactions(&self, obligation_id: Uuid) -> FundResult<Vec<PaymentTransaction>> {
        let state = self.state.read().await;
        let transactions = state
            .transactions
            .values()
            .filter(|transaction| transaction.obligation_id == obligation_id)
            .cloned()
            .collect();
        Ok(sorted_by_created(transactions, |transaction: &PaymentTransaction| {
            transaction.created_at
        }))
    }

    async fn mark_transaction_failed(
        &self,
        order_id: &str,
        provider_trans_id: Option<&str>,
    ) -> FundResult<Option<PaymentTransaction>> {
        let mut state = self.state.write().await;
        let Some(transaction) = state.transactions.values_mut().find(|transaction| {
            transaction.order_id == order_id && transaction.status == TransactionStatus::Pending
        }) else {
            return Ok(None);
        };

        transaction.status = TransactionStatus::Failed;
        if let Some(provider_trans_id) = provider_trans_id {
            transaction.provider_trans_id = Some(provider_trans_id.to_string());
        }
        transaction.updated_at = Utc::now();
        Ok(Some(transaction.clone()))
    }
}

#[async_trait]
impl ScheduleStore for InMemoryFundStore {
    async fn create_schedule(&self, input: ScheduleInput) -> FundResult<Schedule> {
        let input = input.normalized()?;
        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            name: input.name,
            cadence: input.cadence,
            amount: input.amount,
            day_of_week: input.day_of_week,
            day_of_month: input.day_of_month,
            is_active: input.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn get_schedule(&self, id: Uuid) -> FundResult<Schedule> {
        let state = self.state.read().await;
        state
            .schedules
            .get(&id)
            .cloned()
            .ok_or_else(|| FundError::not_found("schedule", id))
    }

    async fn list_schedules(&self) -> FundResult<Vec<Schedule>> {
        let state = self.state.read().await;
        let schedules = state.schedules.values().cloned().collect();
        Ok(sorted_by_created(schedules, |schedule: &Schedule| {
            schedule.created_at
        }))
    }

    async fn update_schedule(&self, id: Uuid, input: ScheduleInput) -> FundResult<Schedule> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        let schedule = state
            .schedules
            .get_mut(&id)
            .ok_or_else(|| FundError::not_found("schedule", id))?;

        schedule.name = input.name;
        schedule.cadence = input.cadence;
        schedule.amount = input.amount;
        schedule.day_of_week = input.day_of_week;
        schedule.day_of_month = input.day_of_month;
        if let Some(is_active) = input.is_active {
            schedule.is_active = is_active;
        }
        schedule.updated_at = Utc::now();
        Ok(schedule.clone())
    }

    async fn delete_schedule(&self, id: Uuid) -> FundResult<()> {
        let mut state = self.state.write().await;
        state
            .schedules
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| FundError::not_found("schedule", id))
    }
}
