//! Contribution ledger: settlement decisions, penalty accrual, obligation
//! generation and the member notifications that go with them.

pub mod config;
pub mod generator;
pub mod intents;
pub mod memo;
pub mod penalty;
pub mod reconcile;
pub mod reminders;
pub mod report;
pub mod sweep;
pub mod templates;

use std::sync::Arc;

use groupfund_core::{FundResult, FundStore, NotificationGateway, PaymentIntentProvider};
use tracing::warn;

pub use config::LedgerConfig;
pub use generator::{GenerateObligations, GenerationReport};
pub use intents::{IntentReceipt, IntentRequest};
pub use memo::{MemoFormat, MemoParser, ParsedMemo};
pub use penalty::{PenaltyAssessment, PenaltyPolicy};
pub use reconcile::{
    ManualConfirmation, RepairReport, SettlementOutcome, TransferNotice, WebhookReference,
};
pub use reminders::{BroadcastKind, MemberNotice, ReminderReport};
pub use report::{FundSummary, MemberBreakdown, StatusBreakdown, WeekBreakdown};
pub use sweep::SweepReport;

/// Entry point for every operation that reads or moves money state.
/// Collaborators are injected once at start-up.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn FundStore>,
    notifier: Arc<dyn NotificationGateway>,
    payments: Arc<dyn PaymentIntentProvider>,
    memo: MemoParser,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn FundStore>,
        notifier: Arc<dyn NotificationGateway>,
        payments: Arc<dyn PaymentIntentProvider>,
        config: LedgerConfig,
    ) -> FundResult<Self> {
        let memo = MemoParser::new(&config.memo)?;
        Ok(Self {
            store,
            notifier,
            payments,
            memo,
            config,
        })
    }

    pub fn store(&self) -> &Arc<dyn FundStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationGateway> {
        &self.notifier
    }

    pub fn payments(&self) -> &Arc<dyn PaymentIntentProvider> {
        &self.payments
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn memo_parser(&self) -> &MemoParser {
        &self.memo
    }

    /// Best-effort send. Returns whether the member was reached; failures
    /// are logged and never propagate.
    async fn notify(&self, handle: &str, text: &str) -> bool {
        if !self.notifier.is_configured() {
            return false;
        }

        match self.notifier.send(handle, text).await {
            Ok(()) => true,
            Err(err) => {
                warn!("notification to {handle} failed: {err}");
                false
            }
        }
    }

    /// Batch variant of [`Ledger::notify`]: every attempt is followed by
    /// the pacing delay.
    async fn notify_paced(&self, handle: &str, text: &str) -> Option<bool> {
        if !self.notifier.is_configured() {
            return None;
        }

        let delivered = self.notify(handle, text).await;
        tokio::time::sleep(self.config.notification_pacing).await;
        Some(delivered)
    }
}
