use chrono::{NaiveDate, TimeZone, Utc};
use groupfund_core::{
    CreateMember, FundError, MemberStore, NewObligation, NewPaymentTransaction, ObligationStatus,
    ObligationStore, SettlementRecord, TransactionStatus, TransactionStore,
};
use groupfund_ledger::{GenerateObligations, ManualConfirmation};
use groupfund_platform::{PgFundStore, ServiceConfig, apply_schema, build_ledger, connect_database};
use rust_decimal::Decimal;
use uuid::Uuid;

fn memory_config() -> ServiceConfig {
    ServiceConfig::from_lookup("127.0.0.1:0", |name| match name {
        "STORE_BACKEND" => Some("memory".to_string()),
        "NOTIFY_PACING_MS" => Some("0".to_string()),
        _ => None,
    })
    .unwrap()
}

#[tokio::test]
async fn memory_backend_runs_a_week_end_to_end() {
    let ledger = build_ledger(&memory_config()).await.unwrap();
    let member = ledger
        .store()
        .create_member(CreateMember {
            name: "Lan".into(),
            phone: "0901000001".into(),
            status: None,
        })
        .await
        .unwrap();

    let report = ledger
        .generate_obligations(GenerateObligations {
            week: 2,
            amount: Decimal::new(50_000, 0),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        })
        .await
        .unwrap();
    assert_eq!(report.created, 1);

    let sweep = ledger
        .run_penalty_sweep(Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap())
        .await
        .unwrap();
    assert_eq!(sweep.processed, 1);
    // No notification backend configured.
    assert_eq!(sweep.notifications_sent, 0);

    let outcome = ledger
        .confirm_manual(ManualConfirmation {
            member_id: member.id,
            week: 2,
            amount: Decimal::new(50_000, 0),
            transaction_id: "TXN-1".into(),
            transaction_time: None,
            note: None,
        })
        .await
        .unwrap();
    assert!(outcome.is_settled());
}

#[tokio::test]
async fn payment_intents_fail_without_provider_credentials() {
    let ledger = build_ledger(&memory_config()).await.unwrap();
    let member = ledger
        .store()
        .create_member(CreateMember {
            name: "Minh".into(),
            phone: "0901000002".into(),
            status: None,
        })
        .await
        .unwrap();
    let obligation = ledger
        .store()
        .insert_obligation(NewObligation {
            member_id: member.id,
            week: 1,
            amount: Decimal::new(50_000, 0),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        })
        .await
        .unwrap();

    let err = ledger
        .create_intent(groupfund_ledger::IntentRequest {
            contribution_id: obligation.id,
            user_id: member.id,
            order_info: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::Upstream(_)));
}

/// Runs against a real database only when `GROUPFUND_TEST_DATABASE_URL` is set.
#[tokio::test]
async fn postgres_store_guards_settlement_and_penalties() {
    let Ok(url) = std::env::var("GROUPFUND_TEST_DATABASE_URL") else {
        return;
    };
    let pool = connect_database(&url).await.unwrap();
    apply_schema(&pool).await.unwrap();
    let store = PgFundStore::new(pool);

    let phone = format!("09{}", &Uuid::new_v4().simple().to_string()[..8]);
    let member = store
        .create_member(CreateMember {
            name: "Pg".into(),
            phone: phone.clone(),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(
        store.find_member_by_phone(&phone).await.unwrap().unwrap().id,
        member.id
    );

    let new = NewObligation {
        member_id: member.id,
        week: 7,
        amount: Decimal::new(50_000, 0),
        due_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
    };
    let obligation = store.insert_obligation(new.clone()).await.unwrap();
    assert!(matches!(
        store.insert_obligation(new).await,
        Err(FundError::Validation { .. })
    ));

    let penalised = store
        .apply_penalty(obligation.id, Decimal::new(10_000, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(penalised.status, ObligationStatus::Overdue);
    assert!(
        store
            .apply_penalty(obligation.id, Decimal::new(5_000, 0))
            .await
            .unwrap()
            .is_none()
    );

    let provider_id = format!("PG-{}", Uuid::new_v4());
    let record = SettlementRecord::New(NewPaymentTransaction {
        obligation_id: obligation.id,
        member_id: member.id,
        order_id: format!("MANUAL_{}", Uuid::new_v4()),
        amount: Decimal::new(50_000, 0),
        status: TransactionStatus::Success,
        provider_trans_id: Some(provider_id.clone()),
        payment_url: None,
        qr_code_url: None,
        note: None,
        paid_at: None,
    });
    let paid_at = Utc::now();
    let settlement = store
        .settle_obligation(obligation.id, paid_at, record.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settlement.obligation.status, ObligationStatus::Paid);
    assert_eq!(settlement.obligation.penalty, Decimal::new(10_000, 0));
    assert!(
        store
            .settle_obligation(obligation.id, paid_at, record)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        store
            .find_success_by_provider_id(&provider_id)
            .await
            .unwrap()
            .unwrap()
            .obligation_id,
        obligation.id
    );

    let next_week = store
        .insert_obligation(NewObligation {
            member_id: member.id,
            week: 8,
            amount: Decimal::new(50_000, 0),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
        })
        .await
        .unwrap();
    let reused = SettlementRecord::New(NewPaymentTransaction {
        obligation_id: next_week.id,
        member_id: member.id,
        order_id: format!("MANUAL_{}", Uuid::new_v4()),
        amount: Decimal::new(50_000, 0),
        status: TransactionStatus::Success,
        provider_trans_id: Some(provider_id.clone()),
        payment_url: None,
        qr_code_url: None,
        note: None,
        paid_at: None,
    });
    match store.settle_obligation(next_week.id, paid_at, reused).await {
        Err(FundError::DuplicateTransaction { provider_trans_id }) => {
            assert_eq!(provider_trans_id, provider_id);
        }
        other => panic!("expected duplicate transaction, got {other:?}"),
    }
    assert_eq!(
        store.get_obligation(next_week.id).await.unwrap().status,
        ObligationStatus::Unpaid
    );

    store.delete_member(member.id).await.unwrap();
    assert!(matches!(
        store.get_obligation(obligation.id).await,
        Err(FundError::NotFound { .. })
    ));
}
