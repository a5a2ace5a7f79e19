use chrono::{DateTime, Utc};
use groupfund_core::{
    FundError, FundResult, Member, NewPaymentTransaction, Obligation, ObligationFilter,
    ObligationStatus, PaymentTransaction, SettlementRecord, TransactionStatus, WebhookPayload,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::Ledger;
use crate::templates;

/// Admin-entered payment for a member's week.
#[derive(Debug, Clone)]
pub struct ManualConfirmation {
    pub member_id: Uuid,
    pub week: i32,
    pub amount: Decimal,
    pub transaction_id: String,
    pub transaction_time: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

/// Incoming wallet transfer whose free-text memo may name a week.
#[derive(Debug, Clone)]
pub struct TransferNotice {
    pub transaction_id: String,
    pub description: String,
    pub phone_number: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Opaque data echoed back by the provider webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReference {
    pub contribution_id: Uuid,
    pub user_id: Uuid,
}

impl WebhookReference {
    pub fn parse(extra_data: &str) -> FundResult<Self> {
        serde_json::from_str(extra_data)
            .map_err(|err| FundError::validation(format!("malformed extraData: {err}")))
    }

    pub fn encode(&self) -> FundResult<String> {
        serde_json::to_string(self)
            .map_err(|err| FundError::validation(format!("unencodable extraData: {err}")))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// This call moved the obligation to paid.
    Settled {
        obligation: Obligation,
        transaction: PaymentTransaction,
        notified: bool,
    },
    /// The same provider transaction already settled this obligation.
    Replayed {
        obligation: Obligation,
        transaction: PaymentTransaction,
    },
    /// The provider reported a failed payment.
    Declined {
        order_id: String,
        result_code: i64,
        reason: String,
        transaction: Option<PaymentTransaction>,
    },
    /// Not a group-fund transfer.
    Ignored { reason: String },
}

impl SettlementOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Self::Settled { obligation, .. } => {
                format!("week {} contribution marked as paid", obligation.week)
            }
            Self::Replayed { obligation, .. } => {
                format!("week {} contribution was already settled by this transaction", obligation.week)
            }
            Self::Declined { reason, .. } => format!("payment declined: {reason}"),
            Self::Ignored { reason } => reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub checked: usize,
    pub updated: usize,
    pub notifications_sent: usize,
}

enum Channel<'a> {
    Manual { note: Option<&'a str> },
    Webhook { order_id: &'a str },
    Transfer,
}

struct Claim<'a> {
    amount: Decimal,
    provider_trans_id: &'a str,
    paid_at: DateTime<Utc>,
    channel: Channel<'a>,
}

impl Ledger {
    pub async fn confirm_manual(&self, input: ManualConfirmation) -> FundResult<SettlementOutcome> {
        if input.week <= 0 {
            return Err(FundError::validation("week must be positive"));
        }
        if input.amount <= Decimal::ZERO {
            return Err(FundError::validation("amount must be positive"));
        }

        let member = self.store.get_member(input.member_id).await?;
        let obligation = self.obligation_for(&member, input.week).await?;

        self.settle(
            &member,
            obligation,
            Claim {
                amount: input.amount,
                provider_trans_id: &input.transaction_id,
                paid_at: input.transaction_time.unwrap_or_else(Utc::now),
                channel: Channel::Manual {
                    note: input.note.as_deref(),
                },
            },
        )
        .await
    }

    pub async fn confirm_webhook(&self, payload: &WebhookPayload) -> FundResult<SettlementOutcome> {
        if !self.payments.verify_signature(payload) {
            warn!("rejected webhook for order {}: bad signature", payload.order_id);
            return Err(FundError::unauthorized("invalid webhook signature"));
        }

        let reference = WebhookReference::parse(&payload.extra_data)?;

        if payload.result_code != 0 {
            let trans_id = Some(payload.trans_id.as_str()).filter(|id| !id.is_empty());
            let transaction = self
                .store
                .mark_transaction_failed(&payload.order_id, trans_id)
                .await?;
            warn!(
                "payment for order {} failed with code {}: {}",
                payload.order_id, payload.result_code, payload.message
            );
            return Ok(SettlementOutcome::Declined {
                order_id: payload.order_id.clone(),
                result_code: payload.result_code,
                reason: payload.message.clone(),
                transaction,
            });
        }

        let obligation = self.store.get_obligation(reference.contribution_id).await?;
        if obligation.member_id != reference.user_id {
            return Err(FundError::validation(
                "extraData member does not own the contribution",
            ));
        }
        let member = self.store.get_member(obligation.member_id).await?;

        self.settle(
            &member,
            obligation,
            Claim {
                amount: Decimal::from(payload.amount),
                provider_trans_id: &payload.trans_id,
                paid_at: DateTime::from_timestamp_millis(payload.response_time)
                    .unwrap_or_else(Utc::now),
                channel: Channel::Webhook {
                    order_id: &payload.order_id,
                },
            },
        )
        .await
    }

    /// Settles from a transfer memo. Unrelated transfers are ignored.
    pub async fn confirm_transfer(&self, notice: TransferNotice) -> FundResult<SettlementOutcome> {
        let Some(parsed) = self.memo.parse(&notice.description) else {
            info!(
                "transfer {} ignored: memo is not a group-fund payment",
                notice.transaction_id
            );
            return Ok(SettlementOutcome::Ignored {
                reason: "not a group-fund transaction".to_string(),
            });
        };

        let phone = notice.phone_number.trim();
        let member = self
            .store
            .find_member_by_phone(phone)
            .await?
            .ok_or_else(|| FundError::not_found("member", phone))?;
        let obligation = self.obligation_for(&member, parsed.week).await?;

        self.settle(
            &member,
            obligation,
            Claim {
                amount: parsed.amount,
                provider_trans_id: &notice.transaction_id,
                paid_at: notice.timestamp.unwrap_or_else(Utc::now),
                channel: Channel::Transfer,
            },
        )
        .await
    }

    /// Accepts `claimed` when it is within the configured tolerance of `due`.
    pub fn check_amount(&self, due: Decimal, claimed: Decimal) -> FundResult<()> {
        if (claimed - due).abs() > self.config.amount_tolerance {
            return Err(FundError::AmountMismatch {
                expected: due,
                claimed,
            });
        }
        Ok(())
    }

    /// Moves outstanding obligations that already carry a successful
    /// payment row to paid.
    pub async fn repair_settled(&self) -> FundResult<RepairReport> {
        let outstanding = self
            .store
            .list_obligations(&ObligationFilter::outstanding())
            .await?;
        let mut report = RepairReport {
            checked: outstanding.len(),
            ..RepairReport::default()
        };

        for obligation in outstanding {
            let transactions = match self.store.list_transactions(obligation.id).await {
                Ok(transactions) => transactions,
                Err(err) => {
                    warn!("repair skipped contribution {}: {err}", obligation.id);
                    continue;
                }
            };
            let Some(paid) = transactions
                .into_iter()
                .find(|transaction| transaction.status == TransactionStatus::Success)
            else {
                continue;
            };

            let paid_at = paid.paid_at.unwrap_or(paid.updated_at);
            let settlement = match self
                .store
                .settle_obligation(obligation.id, paid_at, SettlementRecord::Existing(paid.id))
                .await
            {
                Ok(Some(settlement)) => settlement,
                Ok(None) => continue,
                Err(err) => {
                    warn!("repair failed for contribution {}: {err}", obligation.id);
                    continue;
                }
            };
            report.updated += 1;
            info!(
                "repaired contribution {} from transaction {}",
                obligation.id, paid.order_id
            );

            let member = match self.store.get_member(obligation.member_id).await {
                Ok(member) => member,
                Err(err) => {
                    warn!("no member for repaired contribution {}: {err}", obligation.id);
                    continue;
                }
            };
            let text = templates::auto_payment_confirmed(
                &member.name,
                settlement.obligation.week,
                settlement.transaction.amount,
                paid_at,
                settlement
                    .transaction
                    .provider_trans_id
                    .as_deref()
                    .unwrap_or(&settlement.transaction.order_id),
            );
            if self.notify_paced(&member.phone, &text).await == Some(true) {
                report.notifications_sent += 1;
            }
        }

        info!(
            "repair checked {} contributions, updated {}",
            report.checked, report.updated
        );
        Ok(report)
    }

    async fn obligation_for(&self, member: &Member, week: i32) -> FundResult<Obligation> {
        self.store
            .find_obligation(member.id, week)
            .await?
            .ok_or_else(|| FundError::not_found("contribution", format!("{} week {week}", member.id)))
    }

    async fn settle(
        &self,
        member: &Member,
        obligation: Obligation,
        claim: Claim<'_>,
    ) -> FundResult<SettlementOutcome> {
        let provider_trans_id = claim.provider_trans_id.trim();
        if provider_trans_id.is_empty() {
            return Err(FundError::validation("transaction id is required"));
        }

        if obligation.status == ObligationStatus::Paid {
            return self.replay_or_conflict(obligation.id, provider_trans_id).await;
        }

        let existing = self
            .store
            .find_success_by_provider_id(provider_trans_id)
            .await?;
        if let Some(existing) = &existing {
            if existing.obligation_id != obligation.id {
                return Err(FundError::DuplicateTransaction {
                    provider_trans_id: provider_trans_id.to_string(),
                });
            }
        }

        self.check_amount(obligation.amount, claim.amount)?;

        let record = match existing {
            Some(existing) => SettlementRecord::Existing(existing.id),
            None => {
                self.settlement_record(member, &obligation, &claim, provider_trans_id)
                    .await?
            }
        };

        let Some(settlement) = self
            .store
            .settle_obligation(obligation.id, claim.paid_at, record)
            .await?
        else {
            return self.replay_or_conflict(obligation.id, provider_trans_id).await;
        };

        info!(
            "contribution {} (week {}) of {} settled by {}",
            settlement.obligation.id, settlement.obligation.week, member.name, provider_trans_id
        );

        let text = match claim.channel {
            Channel::Manual { note } => templates::payment_confirmed(
                &member.name,
                settlement.obligation.week,
                settlement.transaction.amount,
                claim.paid_at,
                note,
            ),
            Channel::Webhook { .. } | Channel::Transfer => templates::auto_payment_confirmed(
                &member.name,
                settlement.obligation.week,
                settlement.transaction.amount,
                claim.paid_at,
                provider_trans_id,
            ),
        };
        let notified = self.notify(&member.phone, &text).await;

        Ok(SettlementOutcome::Settled {
            obligation: settlement.obligation,
            transaction: settlement.transaction,
            notified,
        })
    }

    async fn settlement_record(
        &self,
        member: &Member,
        obligation: &Obligation,
        claim: &Claim<'_>,
        provider_trans_id: &str,
    ) -> FundResult<SettlementRecord> {
        let stamp = Utc::now().timestamp_millis();
        let (order_id, note) = match &claim.channel {
            Channel::Manual { note } => (
                format!("MANUAL_{}_{stamp}", obligation.id),
                note.map(str::to_string),
            ),
            Channel::Transfer => (format!("AUTO_{}_{stamp}", obligation.id), None),
            Channel::Webhook { order_id } => {
                match self.store.find_transaction_by_order(order_id).await? {
                    Some(pending)
                        if pending.status == TransactionStatus::Pending
                            && pending.obligation_id == obligation.id =>
                    {
                        return Ok(SettlementRecord::CompletePending {
                            order_id: pending.order_id,
                            provider_trans_id: provider_trans_id.to_string(),
                        });
                    }
                    Some(_) => (format!("WEBHOOK_{}_{stamp}", obligation.id), None),
                    None => (order_id.to_string(), None),
                }
            }
        };

        Ok(SettlementRecord::New(NewPaymentTransaction {
            obligation_id: obligation.id,
            member_id: member.id,
            order_id,
            amount: claim.amount,
            status: TransactionStatus::Success,
            provider_trans_id: Some(provider_trans_id.to_string()),
            payment_url: None,
            qr_code_url: None,
            note,
            paid_at: Some(claim.paid_at),
        }))
    }

    async fn replay_or_conflict(
        &self,
        obligation_id: Uuid,
        provider_trans_id: &str,
    ) -> FundResult<SettlementOutcome> {
        let replayed = self
            .store
            .list_transactions(obligation_id)
            .await?
            .into_iter()
            .find(|transaction| {
                transaction.status == TransactionStatus::Success
                    && transaction.provider_trans_id.as_deref() == Some(provider_trans_id)
            });

        match replayed {
            Some(transaction) => {
                info!("replay of {provider_trans_id} for contribution {obligation_id} ignored");
                let obligation = self.store.get_obligation(obligation_id).await?;
                Ok(SettlementOutcome::Replayed {
                    obligation,
                    transaction,
                })
            }
            None => Err(FundError::AlreadySettled { obligation_id }),
        }
    }
}
