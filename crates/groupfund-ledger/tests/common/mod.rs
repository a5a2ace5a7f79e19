#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use groupfund_core::{
    CreateMember, Member, MemberStore, NewObligation, Obligation, ObligationStore,
    WebhookPayload,
};
use groupfund_ledger::{Ledger, LedgerConfig, WebhookReference};
use groupfund_store::{InMemoryFundStore, RecordingNotifier, StaticPaymentProvider};
use rust_decimal::Decimal;

pub const SIGNATURE: &str = "signed-by-provider";

pub struct Harness {
    pub ledger: Ledger,
    pub store: Arc<InMemoryFundStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub payments: Arc<StaticPaymentProvider>,
}

pub fn harness() -> Harness {
    harness_with(RecordingNotifier::new(), LedgerConfig::default())
}

pub fn harness_with(notifier: RecordingNotifier, mut config: LedgerConfig) -> Harness {
    config.notification_pacing = Duration::ZERO;
    let store = Arc::new(InMemoryFundStore::new());
    let notifier = Arc::new(notifier);
    let payments = Arc::new(StaticPaymentProvider::new(SIGNATURE));
    let ledger = Ledger::new(store.clone(), notifier.clone(), payments.clone(), config).unwrap();
    Harness {
        ledger,
        store,
        notifier,
        payments,
    }
}

pub fn vnd(amount: i64) -> Decimal {
    Decimal::new(amount, 0)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

impl Harness {
    pub async fn member(&self, name: &str, phone: &str) -> Member {
        self.store
            .create_member(CreateMember {
                name: name.to_string(),
                phone: phone.to_string(),
                status: None,
            })
            .await
            .unwrap()
    }

    pub async fn obligation(
        &self,
        member: &Member,
        week: i32,
        amount: i64,
        due_date: NaiveDate,
    ) -> Obligation {
        self.store
            .insert_obligation(NewObligation {
                member_id: member.id,
                week,
                amount: vnd(amount),
                due_date,
            })
            .await
            .unwrap()
    }

    pub async fn reload(&self, obligation: &Obligation) -> Obligation {
        self.store.get_obligation(obligation.id).await.unwrap()
    }
}

pub fn webhook(obligation: &Obligation, order_id: &str, trans_id: &str, amount: i64) -> WebhookPayload {
    WebhookPayload {
        partner_code: "MOMO".to_string(),
        access_key: "access".to_string(),
        request_id: order_id.to_string(),
        amount,
        order_id: order_id.to_string(),
        order_info: format!("week {}", obligation.week),
        order_type: "momo_wallet".to_string(),
        trans_id: trans_id.to_string(),
        result_code: 0,
        message: "Successful.".to_string(),
        pay_type: "qr".to_string(),
        response_time: 1_705_708_800_000,
        extra_data: WebhookReference {
            contribution_id: obligation.id,
            user_id: obligation.member_id,
        }
        .encode()
        .unwrap(),
        signature: SIGNATURE.to_string(),
    }
}
