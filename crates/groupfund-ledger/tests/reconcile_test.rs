mod common;

use chrono::{TimeZone, Utc};
use common::{date, harness, vnd, webhook};
use groupfund_core::{
    FundError, NewPaymentTransaction, ObligationStatus, TransactionStatus, TransactionStore,
};
use groupfund_ledger::{
    IntentRequest, ManualConfirmation, SettlementOutcome, TransferNotice, WebhookReference,
};
use uuid::Uuid;

fn manual(member_id: Uuid, week: i32, amount: i64, transaction_id: &str) -> ManualConfirmation {
    ManualConfirmation {
        member_id,
        week,
        amount: vnd(amount),
        transaction_id: transaction_id.to_string(),
        transaction_time: None,
        note: None,
    }
}

fn transfer(description: &str, phone: &str, transaction_id: &str) -> TransferNotice {
    TransferNotice {
        transaction_id: transaction_id.to_string(),
        description: description.to_string(),
        phone_number: phone.to_string(),
        timestamp: None,
    }
}

#[tokio::test]
async fn replayed_webhook_settles_once() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;
    let payload = webhook(&obligation, "CONTRIB_A_1", "4088878653", 50_000);

    let first = h.ledger.confirm_webhook(&payload).await.unwrap();
    let second = h.ledger.confirm_webhook(&payload).await.unwrap();

    assert!(first.is_settled());
    assert!(matches!(second, SettlementOutcome::Replayed { .. }));
    let rows = h.store.list_transactions(obligation.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransactionStatus::Success);
    assert_eq!(h.reload(&obligation).await.status, ObligationStatus::Paid);
    assert_eq!(h.notifier.sent_to("0901000001").len(), 1);
}

#[tokio::test]
async fn webhook_completes_the_pending_intent_row() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;

    let receipt = h
        .ledger
        .create_intent(IntentRequest {
            contribution_id: obligation.id,
            user_id: lan.id,
            order_info: None,
        })
        .await
        .unwrap();
    assert!(receipt.order_id.starts_with(&format!("CONTRIB_{}_", obligation.id)));
    assert_eq!(receipt.payment_url.as_deref(), Some("https://pay.local/intent"));

    let request = &h.payments.requests()[0];
    assert_eq!(request.callback_url, "http://localhost:3000/api/momo/webhook");
    assert_eq!(
        WebhookReference::parse(&request.extra_data).unwrap(),
        WebhookReference {
            contribution_id: obligation.id,
            user_id: lan.id,
        }
    );

    let outcome = h
        .ledger
        .confirm_webhook(&webhook(&obligation, &receipt.order_id, "777", 50_000))
        .await
        .unwrap();

    let SettlementOutcome::Settled { transaction, .. } = outcome else {
        panic!("expected settlement, got {outcome:?}");
    };
    assert_eq!(transaction.order_id, receipt.order_id);
    assert_eq!(transaction.provider_trans_id.as_deref(), Some("777"));
    assert_eq!(h.store.list_transactions(obligation.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn bad_signature_changes_nothing() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;
    let mut payload = webhook(&obligation, "CONTRIB_A_1", "1", 50_000);
    payload.signature = "forged".to_string();

    let err = h.ledger.confirm_webhook(&payload).await.unwrap_err();

    assert!(matches!(err, FundError::Unauthorized { .. }));
    assert_eq!(h.reload(&obligation).await.status, ObligationStatus::Unpaid);
    assert!(h.store.list_transactions(obligation.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn declined_payment_only_fails_the_transaction() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;
    let receipt = h
        .ledger
        .create_intent(IntentRequest {
            contribution_id: obligation.id,
            user_id: lan.id,
            order_info: Some("Dong quy".into()),
        })
        .await
        .unwrap();

    let mut payload = webhook(&obligation, &receipt.order_id, "", 50_000);
    payload.result_code = 1006;
    payload.message = "Transaction denied by user.".to_string();
    let outcome = h.ledger.confirm_webhook(&payload).await.unwrap();

    let SettlementOutcome::Declined { transaction, .. } = outcome else {
        panic!("expected decline, got {outcome:?}");
    };
    assert_eq!(transaction.unwrap().status, TransactionStatus::Failed);
    assert_eq!(h.reload(&obligation).await.status, ObligationStatus::Unpaid);
}

#[tokio::test]
async fn malformed_extra_data_is_rejected() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;
    let mut payload = webhook(&obligation, "CONTRIB_A_1", "1", 50_000);
    payload.extra_data = "not json".to_string();

    let err = h.ledger.confirm_webhook(&payload).await.unwrap_err();
    assert!(matches!(err, FundError::Validation { .. }));
}

#[tokio::test]
async fn only_the_first_entry_point_settles() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;

    h.ledger
        .confirm_manual(manual(lan.id, 5, 50_000, "BANK-1"))
        .await
        .unwrap();

    let webhook_err = h
        .ledger
        .confirm_webhook(&webhook(&obligation, "CONTRIB_A_1", "W-2", 50_000))
        .await
        .unwrap_err();
    let memo_err = h
        .ledger
        .confirm_transfer(transfer("QUY_NHOM_TUAN_5_50000", "0901000001", "T-3"))
        .await
        .unwrap_err();
    let manual_err = h
        .ledger
        .confirm_manual(manual(lan.id, 5, 50_000, "BANK-4"))
        .await
        .unwrap_err();

    for err in [webhook_err, memo_err, manual_err] {
        assert!(matches!(err, FundError::AlreadySettled { .. }), "{err}");
    }
    assert_eq!(h.store.list_transactions(obligation.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn racing_settlements_have_one_winner() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;

    let manual_ledger = h.ledger.clone();
    let webhook_ledger = h.ledger.clone();
    let payload = webhook(&obligation, "CONTRIB_A_1", "W-1", 50_000);
    let member_id = lan.id;

    let manual_task = tokio::spawn(async move {
        manual_ledger
            .confirm_manual(manual(member_id, 5, 50_000, "BANK-1"))
            .await
    });
    let webhook_task = tokio::spawn(async move { webhook_ledger.confirm_webhook(&payload).await });

    let results = [manual_task.await.unwrap(), webhook_task.await.unwrap()];
    let winners = results
        .iter()
        .filter(|result| matches!(result, Ok(outcome) if outcome.is_settled()))
        .count();
    let losers = results
        .iter()
        .filter(|result| matches!(result, Err(FundError::AlreadySettled { .. })))
        .count();

    assert_eq!((winners, losers), (1, 1));
    assert_eq!(h.store.list_transactions(obligation.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn provider_id_cannot_settle_two_obligations() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;
    let week_six = h.obligation(&lan, 6, 50_000, date(2024, 1, 14)).await;

    h.ledger
        .confirm_manual(manual(lan.id, 5, 50_000, "BANK-1"))
        .await
        .unwrap();
    let err = h
        .ledger
        .confirm_manual(manual(lan.id, 6, 50_000, "BANK-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, FundError::DuplicateTransaction { .. }));
    assert_eq!(h.reload(&week_six).await.status, ObligationStatus::Unpaid);
}

#[tokio::test]
async fn amount_tolerance_boundary() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    for week in 1..=4 {
        h.obligation(&lan, week, 100_000, date(2024, 1, 7)).await;
    }

    let cases = [(1, 101_000, true), (2, 101_001, false), (3, 99_000, true), (4, 98_999, false)];
    for (week, claimed, accepted) in cases {
        let result = h
            .ledger
            .confirm_manual(manual(lan.id, week, claimed, &format!("TX-{week}")))
            .await;
        if accepted {
            assert!(result.unwrap().is_settled(), "{claimed} should settle");
        } else {
            match result {
                Err(FundError::AmountMismatch { expected, claimed: seen }) => {
                    assert_eq!(expected, vnd(100_000));
                    assert_eq!(seen, vnd(claimed));
                }
                other => panic!("{claimed} should mismatch, got {other:?}"),
            }
        }
    }
}

#[tokio::test]
async fn memo_transfer_settles_by_phone_and_week() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 100_000, date(2024, 1, 7)).await;

    let outcome = h
        .ledger
        .confirm_transfer(TransferNotice {
            timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 6, 8, 0, 0).unwrap()),
            ..transfer("QUY_NHOM_TUAN_5_100000", "0901000001", "MOMO-55")
        })
        .await
        .unwrap();

    let SettlementOutcome::Settled { transaction, .. } = outcome else {
        panic!("expected settlement, got {outcome:?}");
    };
    assert!(transaction.order_id.starts_with("AUTO_"));
    let paid = h.reload(&obligation).await;
    assert_eq!(paid.status, ObligationStatus::Paid);
    assert_eq!(paid.paid_at, Some(Utc.with_ymd_and_hms(2024, 1, 6, 8, 0, 0).unwrap()));
}

#[tokio::test]
async fn unrelated_memo_is_ignored() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 100_000, date(2024, 1, 7)).await;

    let outcome = h
        .ledger
        .confirm_transfer(transfer("random text", "0901000001", "MOMO-1"))
        .await
        .unwrap();

    assert!(matches!(outcome, SettlementOutcome::Ignored { .. }));
    assert_eq!(h.reload(&obligation).await.status, ObligationStatus::Unpaid);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn memo_with_wrong_week_is_not_found() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    h.obligation(&lan, 5, 100_000, date(2024, 1, 7)).await;

    let wrong_week = h
        .ledger
        .confirm_transfer(transfer("QUY_NHOM_TUAN_6_100000", "0901000001", "MOMO-1"))
        .await
        .unwrap_err();
    let unknown_payer = h
        .ledger
        .confirm_transfer(transfer("QUY_NHOM_TUAN_5_100000", "0999999999", "MOMO-2"))
        .await
        .unwrap_err();

    assert!(matches!(wrong_week, FundError::NotFound { entity: "contribution", .. }));
    assert!(matches!(unknown_payer, FundError::NotFound { entity: "member", .. }));
}

#[tokio::test]
async fn failed_notification_keeps_the_settlement() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;
    h.notifier.fail_for("0901000001");

    let outcome = h
        .ledger
        .confirm_manual(ManualConfirmation {
            note: Some("cash at meeting".into()),
            ..manual(lan.id, 5, 50_000, "CASH-1")
        })
        .await
        .unwrap();

    assert!(matches!(outcome, SettlementOutcome::Settled { notified: false, .. }));
    assert_eq!(h.reload(&obligation).await.status, ObligationStatus::Paid);
    let rows = h.store.list_transactions(obligation.id).await.unwrap();
    assert_eq!(rows[0].note.as_deref(), Some("cash at meeting"));
    assert!(rows[0].order_id.starts_with("MANUAL_"));
}

#[tokio::test]
async fn manual_confirmation_validates_before_lookup() {
    let h = harness();

    let err = h
        .ledger
        .confirm_manual(manual(Uuid::new_v4(), 0, 50_000, "X"))
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::Validation { .. }));

    let err = h
        .ledger
        .confirm_manual(manual(Uuid::new_v4(), 5, 50_000, "X"))
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::NotFound { entity: "member", .. }));
}

#[tokio::test]
async fn intent_for_paid_obligation_is_refused() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;
    h.ledger
        .confirm_manual(manual(lan.id, 5, 50_000, "BANK-1"))
        .await
        .unwrap();

    let err = h
        .ledger
        .create_intent(IntentRequest {
            contribution_id: obligation.id,
            user_id: lan.id,
            order_info: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FundError::AlreadySettled { .. }));
    assert!(h.payments.requests().is_empty());
}

#[tokio::test]
async fn repair_settles_obligations_with_success_rows() {
    let h = harness();
    let lan = h.member("Lan", "0901000001").await;
    let obligation = h.obligation(&lan, 5, 50_000, date(2024, 1, 7)).await;
    h.obligation(&lan, 6, 50_000, date(2024, 1, 14)).await;
    let paid_at = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();
    h.store
        .insert_transaction(NewPaymentTransaction {
            obligation_id: obligation.id,
            member_id: lan.id,
            order_id: "CONTRIB_X_1".into(),
            amount: vnd(50_000),
            status: TransactionStatus::Success,
            provider_trans_id: Some("99".into()),
            payment_url: None,
            qr_code_url: None,
            note: None,
            paid_at: Some(paid_at),
        })
        .await
        .unwrap();

    let first = h.ledger.repair_settled().await.unwrap();
    let second = h.ledger.repair_settled().await.unwrap();

    assert_eq!((first.checked, first.updated), (2, 1));
    assert_eq!((second.checked, second.updated), (1, 0));
    let repaired = h.reload(&obligation).await;
    assert_eq!(repaired.status, ObligationStatus::Paid);
    assert_eq!(repaired.paid_at, Some(paid_at));
    assert_eq!(h.store.list_transactions(obligation.id).await.unwrap().len(), 1);
}
