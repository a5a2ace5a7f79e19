use chrono::Utc;
use groupfund_core::{
    FundError, FundResult, NewPaymentTransaction, ObligationStatus, PaymentIntentRequest,
    TransactionStatus,
};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::Ledger;
use crate::reconcile::WebhookReference;

#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub contribution_id: Uuid,
    pub user_id: Uuid,
    pub order_info: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentReceipt {
    pub order_id: String,
    pub payment_url: Option<String>,
    pub qr_code_url: Option<String>,
    pub deeplink: Option<String>,
}

impl Ledger {
    /// Opens a wallet payment for an outstanding contribution and leaves a
    /// pending transaction behind for the webhook to complete.
    pub async fn create_intent(&self, request: IntentRequest) -> FundResult<IntentReceipt> {
        let obligation = self.store.get_obligation(request.contribution_id).await?;
        if obligation.member_id != request.user_id {
            return Err(FundError::validation(
                "contribution does not belong to this member",
            ));
        }
        if obligation.status == ObligationStatus::Paid {
            return Err(FundError::AlreadySettled {
                obligation_id: obligation.id,
            });
        }
        let member = self.store.get_member(obligation.member_id).await?;

        let order_id = format!("CONTRIB_{}_{}", obligation.id, Utc::now().timestamp_millis());
        let extra_data = WebhookReference {
            contribution_id: obligation.id,
            user_id: member.id,
        }
        .encode()?;
        let description = request
            .order_info
            .filter(|info| !info.trim().is_empty())
            .unwrap_or_else(|| format!("Dong quy tuan {} - {}", obligation.week, member.name));

        let intent = self
            .payments
            .create_intent(PaymentIntentRequest {
                amount: obligation.amount,
                order_id: order_id.clone(),
                description,
                return_url: self.config.return_url(&order_id),
                callback_url: self.config.callback_url(),
                extra_data,
            })
            .await?;
        if intent.result_code != 0 {
            return Err(FundError::upstream(format!(
                "payment provider refused order {order_id} ({}): {}",
                intent.result_code, intent.message
            )));
        }

        let pending = NewPaymentTransaction {
            obligation_id: obligation.id,
            member_id: member.id,
            order_id: order_id.clone(),
            amount: obligation.amount,
            status: TransactionStatus::Pending,
            provider_trans_id: None,
            payment_url: intent.pay_url.clone(),
            qr_code_url: intent.qr_code_url.clone(),
            note: None,
            paid_at: None,
        };
        if let Err(err) = self.store.insert_transaction(pending).await {
            // The intent is already live; the webhook can still settle it.
            error!("failed to record pending transaction {order_id}: {err}");
        }

        info!("payment intent {order_id} created for contribution {}", obligation.id);
        Ok(IntentReceipt {
            order_id,
            payment_url: intent.pay_url,
            qr_code_url: intent.qr_code_url,
            deeplink: intent.deeplink,
        })
    }
}
