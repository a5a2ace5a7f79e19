use async_trait::async_trait;
use chrono::{DateTime, Utc};
use groupfund_core::{
    CreateMember, FundError, FundResult, Member, MemberStatus, MemberStore, NewObligation,
    NewPaymentTransaction, Obligation, ObligationFilter, ObligationStatus, ObligationStore,
    PaymentTransaction, Schedule, ScheduleCadence, ScheduleInput, ScheduleStore, Settlement,
    SettlementRecord, TransactionStatus, TransactionStore, UpdateMember,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgDatabaseError, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const MEMBER_COLUMNS: &str = "id, name, phone, status, created_at, updated_at";
const CONTRIBUTION_COLUMNS: &str =
    "id, member_id, week, amount, penalty, status, due_date, paid_at, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, contribution_id, member_id, order_id, amount, provider_trans_id, status, payment_url, qr_code_url, note, paid_at, created_at, updated_at";
const SCHEDULE_COLUMNS: &str =
    "id, name, type, amount, day_of_week, day_of_month, is_active, created_at, updated_at";

/// Store backed by the tables in `sql/schema.sql`.
#[derive(Clone)]
pub struct PgFundStore {
    pool: PgPool,
}

impl PgFundStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const SUCCESS_PROVIDER_INDEX: &str = "payment_transactions_success_provider_idx";

fn store_error(err: sqlx::Error) -> FundError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() && db.constraint() == Some(SUCCESS_PROVIDER_INDEX) {
            let detail = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(PgDatabaseError::detail)
                .unwrap_or_else(|| db.message());
            return FundError::DuplicateTransaction {
                provider_trans_id: provider_id_from_detail(detail),
            };
        }
        if db.is_unique_violation() {
            return FundError::validation(format!("duplicate record: {}", db.message()));
        }
        if db.is_foreign_key_violation() {
            return FundError::validation(format!("missing related record: {}", db.message()));
        }
    }
    FundError::upstream(err)
}

/// Pulls the key value out of a unique-violation detail such as
/// `Key (provider_trans_id)=(4088878653) already exists.`
fn provider_id_from_detail(message: &str) -> String {
    message
        .split_once("=(")
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(value, _)| value.to_string())
        .unwrap_or_else(|| message.to_string())
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> FundResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(store_error)
}

fn member_from_row(row: &PgRow) -> FundResult<Member> {
    Ok(Member {
        id: column(row, "id")?,
        name: column(row, "name")?,
        phone: column(row, "phone")?,
        status: MemberStatus::parse(&column::<String>(row, "status")?)?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn obligation_from_row(row: &PgRow) -> FundResult<Obligation> {
    Ok(Obligation {
        id: column(row, "id")?,
        member_id: column(row, "member_id")?,
        week: column(row, "week")?,
        amount: column(row, "amount")?,
        penalty: column(row, "penalty")?,
        status: ObligationStatus::parse(&column::<String>(row, "status")?)?,
        due_date: column(row, "due_date")?,
        paid_at: column(row, "paid_at")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> FundResult<PaymentTransaction> {
    Ok(PaymentTransaction {
        id: column(row, "id")?,
        obligation_id: column(row, "contribution_id")?,
        member_id: column(row, "member_id")?,
        order_id: column(row, "order_id")?,
        amount: column(row, "amount")?,
        provider_trans_id: column(row, "provider_trans_id")?,
        status: TransactionStatus::parse(&column::<String>(row, "status")?)?,
        payment_url: column(row, "payment_url")?,
        qr_code_url: column(row, "qr_code_url")?,
        note: column(row, "note")?,
        paid_at: column(row, "paid_at")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn schedule_from_row(row: &PgRow) -> FundResult<Schedule> {
    Ok(Schedule {
        id: column(row, "id")?,
        name: column(row, "name")?,
        cadence: ScheduleCadence::parse(&column::<String>(row, "type")?)?,
        amount: column(row, "amount")?,
        day_of_week: column(row, "day_of_week")?,
        day_of_month: column(row, "day_of_month")?,
        is_active: column(row, "is_active")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn collect<T>(rows: Vec<PgRow>, map: fn(&PgRow) -> FundResult<T>) -> FundResult<Vec<T>> {
    rows.iter().map(map).collect()
}

async fn insert_transaction_in(
    tx: &mut Transaction<'_, Postgres>,
    input: NewPaymentTransaction,
) -> FundResult<PaymentTransaction> {
    let row = sqlx::query(&format!(
        "INSERT INTO payment_transactions (id, contribution_id, member_id, order_id, amount, provider_trans_id, status, payment_url, qr_code_url, note, paid_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(input.obligation_id)
    .bind(input.member_id)
    .bind(&input.order_id)
    .bind(input.amount)
    .bind(&input.provider_trans_id)
    .bind(input.status.as_str())
    .bind(&input.payment_url)
    .bind(&input.qr_code_url)
    .bind(&input.note)
    .bind(input.paid_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(store_error)?;

    transaction_from_row(&row)
}

#[async_trait]
impl MemberStore for PgFundStore {
    async fn create_member(&self, input: CreateMember) -> FundResult<Member> {
        let input = input.normalized()?;
        let row = sqlx::query(&format!(
            "INSERT INTO members (id, name, phone, status) VALUES ($1, $2, $3, $4) RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.phone)
        .bind(input.status.unwrap_or(MemberStatus::Active).as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        member_from_row(&row)
    }

    async fn get_member(&self, id: Uuid) -> FundResult<Member> {
        let row = sqlx::query(&format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or_else(|| FundError::not_found("member", id))?;

        member_from_row(&row)
    }

    async fn find_member_by_phone(&self, phone: &str) -> FundResult<Option<Member>> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE phone = $1 ORDER BY created_at LIMIT 1"
        ))
        .bind(phone.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(member_from_row).transpose()
    }

    async fn list_members(&self, status: Option<MemberStatus>) -> FundResult<Vec<Member>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        collect(rows, member_from_row)
    }

    async fn update_member(&self, id: Uuid, input: UpdateMember) -> FundResult<Member> {
        let name = input.name.map(|name| name.trim().to_string());
        let phone = input.phone.map(|phone| phone.trim().to_string());
        if name.as_deref() == Some("") || phone.as_deref() == Some("") {
            return Err(FundError::validation("name and phone must not be empty"));
        }

        let row = sqlx::query(&format!(
            "UPDATE members SET name = COALESCE($2, name), phone = COALESCE($3, phone), status = COALESCE($4, status), updated_at = now() \
             WHERE id = $1 RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(phone)
        .bind(input.status.map(|status| status.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| FundError::not_found("member", id))?;

        member_from_row(&row)
    }

    async fn delete_member(&self, id: Uuid) -> FundResult<()> {
        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(FundError::not_found("member", id));
        }
        Ok(())
    }
}

#[async_trait]
impl ObligationStore for PgFundStore {
    async fn insert_obligation(&self, input: NewObligation) -> FundResult<Obligation> {
        input.validate()?;

        let row = sqlx::query(&format!(
            "INSERT INTO contributions (id, member_id, week, amount, due_date) VALUES ($1, $2, $3, $4, $5) RETURNING {CONTRIBUTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.member_id)
        .bind(input.week)
        .bind(input.amount)
        .bind(input.due_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            let missing_member = matches!(
                &err,
                sqlx::Error::Database(db) if db.is_foreign_key_violation()
            );
            if missing_member {
                FundError::not_found("member", input.member_id)
            } else {
                store_error(err)
            }
        })?;

        obligation_from_row(&row)
    }

    async fn get_obligation(&self, id: Uuid) -> FundResult<Obligation> {
        let row = sqlx::query(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| FundError::not_found("contribution", id))?;

        obligation_from_row(&row)
    }

    async fn find_obligation(
        &self,
        member_id: Uuid,
        week: i32,
    ) -> FundResult<Option<Obligation>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE member_id = $1 AND week = $2"
        ))
        .bind(member_id)
        .bind(week)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(obligation_from_row).transpose()
    }

    async fn list_obligations(&self, filter: &ObligationFilter) -> FundResult<Vec<Obligation>> {
        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|status| status.as_str().to_string())
            .collect();

        let rows = sqlx::query(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions \
             WHERE ($1::uuid IS NULL OR member_id = $1) \
               AND ($2::int IS NULL OR week = $2) \
               AND (cardinality($3::text[]) = 0 OR status = ANY($3)) \
               AND ($4::date IS NULL OR due_date < $4) \
             ORDER BY week DESC, created_at ASC"
        ))
        .bind(filter.member_id)
        .bind(filter.week)
        .bind(statuses)
        .bind(filter.due_before)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        collect(rows, obligation_from_row)
    }

    async fn apply_penalty(&self, id: Uuid, penalty: Decimal) -> FundResult<Option<Obligation>> {
        let row = sqlx::query(&format!(
            "UPDATE contributions SET status = 'overdue', penalty = $2, updated_at = now() \
             WHERE id = $1 AND status IN ('unpaid', 'overdue') AND penalty <= $2 \
             RETURNING {CONTRIBUTION_COLUMNS}"
        ))
        .bind(id)
        .bind(penalty)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => obligation_from_row(&row).map(Some),
            None => {
                // Distinguish a rejected guard from a missing row.
                self.get_obligation(id).await?;
                Ok(None)
            }
        }
    }

    async fn settle_obligation(
        &self,
        id: Uuid,
        paid_at: DateTime<Utc>,
        record: SettlementRecord,
    ) -> FundResult<Option<Settlement>> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let current = sqlx::query("SELECT status FROM contributions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?
            .ok_or_else(|| FundError::not_found("contribution", id))?;
        let status: String = column(&current, "status")?;
        if ObligationStatus::parse(&status)? == ObligationStatus::Paid {
            return Ok(None);
        }

        let transaction = match record {
            SettlementRecord::New(input) => insert_transaction_in(&mut tx, input).await?,
            SettlementRecord::CompletePending {
                order_id,
                provider_trans_id,
            } => {
                let row = sqlx::query(&format!(
                    "UPDATE payment_transactions SET status = 'success', provider_trans_id = $2, paid_at = $3, updated_at = now() \
                     WHERE order_id = $1 AND status = 'pending' RETURNING {TRANSACTION_COLUMNS}"
                ))
                .bind(&order_id)
                .bind(&provider_trans_id)
                .bind(paid_at)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_error)?
                .ok_or_else(|| FundError::not_found("pending transaction", &order_id))?;
                transaction_from_row(&row)?
            }
            SettlementRecord::Existing(transaction_id) => {
                let row = sqlx::query(&format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE id = $1"
                ))
                .bind(transaction_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_error)?
                .ok_or_else(|| FundError::not_found("transaction", transaction_id))?;
                transaction_from_row(&row)?
            }
        };

        let row = sqlx::query(&format!(
            "UPDATE contributions SET status = 'paid', paid_at = $2, updated_at = now() \
             WHERE id = $1 RETURNING {CONTRIBUTION_COLUMNS}"
        ))
        .bind(id)
        .bind(paid_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;
        let obligation = obligation_from_row(&row)?;

        tx.commit().await.map_err(store_error)?;

        Ok(Some(Settlement {
            obligation,
            transaction,
        }))
    }

    async fn delete_obligation(&self, id: Uuid) -> FundResult<()> {
        let result = sqlx::query("DELETE FROM contributions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(FundError::not_found("contribution", id));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for PgFundStore {
    async fn insert_transaction(
        &self,
        input: NewPaymentTransaction,
    ) -> FundResult<PaymentTransaction> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let transaction = insert_transaction_in(&mut tx, input).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(transaction)
    }

    async fn find_transaction_by_order(
        &self,
        order_id: &str,
    ) -> FundResult<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn find_success_by_provider_id(
        &self,
        provider_trans_id: &str,
    ) -> FundResult<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE provider_trans_id = $1 AND status = 'success' LIMIT 1"
        ))
        .bind(provider_trans_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn list_transactions(&self, obligation_id: Uuid) -> FundResult<Vec<PaymentTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE contribution_id = $1 ORDER BY created_at DESC"
        ))
        .bind(obligation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        collect(rows, transaction_from_row)
    }

    async fn mark_transaction_failed(
        &self,
        order_id: &str,
        provider_trans_id: Option<&str>,
    ) -> FundResult<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            "UPDATE payment_transactions SET status = 'failed', provider_trans_id = COALESCE($2, provider_trans_id), updated_at = now() \
             WHERE order_id = $1 AND status = 'pending' RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(order_id)
        .bind(provider_trans_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(transaction_from_row).transpose()
    }
}

#[async_trait]
impl ScheduleStore for PgFundStore {
    async fn create_schedule(&self, input: ScheduleInput) -> FundResult<Schedule> {
        let input = input.normalized()?;
        let row = sqlx::query(&format!(
            "INSERT INTO schedules (id, name, type, amount, day_of_week, day_of_month, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(input.cadence.as_str())
        .bind(input.amount)
        .bind(input.day_of_week)
        .bind(input.day_of_month)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        schedule_from_row(&row)
    }

    async fn get_schedule(&self, id: Uuid) -> FundResult<Schedule> {
        let row = sqlx::query(&format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or_else(|| FundError::not_found("schedule", id))?;

        schedule_from_row(&row)
    }

    async fn list_schedules(&self) -> FundResult<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        collect(rows, schedule_from_row)
    }

    async fn update_schedule(&self, id: Uuid, input: ScheduleInput) -> FundResult<Schedule> {
        let input = input.normalized()?;
        let row = sqlx::query(&format!(
            "UPDATE schedules SET name = $2, type = $3, amount = $4, day_of_week = $5, day_of_month = $6, \
             is_active = COALESCE($7, is_active), updated_at = now() WHERE id = $1 RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(id)
        .bind(&input.name)
        .bind(input.cadence.as_str())
        .bind(input.amount)
        .bind(input.day_of_week)
        .bind(input.day_of_month)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| FundError::not_found("schedule", id))?;

        schedule_from_row(&row)
    }

    async fn delete_schedule(&self, id: Uuid) -> FundResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(FundError::not_found("schedule", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_id_is_read_from_violation_detail() {
        assert_eq!(
            provider_id_from_detail("Key (provider_trans_id)=(4088878653) already exists."),
            "4088878653"
        );
        assert_eq!(
            provider_id_from_detail("duplicate key value violates unique constraint"),
            "duplicate key value violates unique constraint"
        );
    }
}
