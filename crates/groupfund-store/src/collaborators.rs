//! In-process stand-ins for the outbound collaborators, shared by the
//! test suites across the workspace.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use groupfund_core::{
    FundError, FundResult, NotificationGateway, PaymentIntent, PaymentIntentProvider,
    PaymentIntentRequest, WebhookPayload,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub handle: String,
    pub text: String,
}

/// Records every delivered message. Handles listed as unreachable fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    unreachable: Mutex<HashSet<String>>,
    disabled: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that reports itself as not configured.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn fail_for(&self, handle: &str) {
        self.unreachable
            .lock()
            .expect("notifier lock poisoned")
            .insert(handle.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("notifier lock poisoned").clone()
    }

    pub fn sent_to(&self, handle: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|message| message.handle == handle)
            .map(|message| message.text)
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for RecordingNotifier {
    fn is_configured(&self) -> bool {
        !self.disabled
    }

    async fn send(&self, handle: &str, text: &str) -> FundResult<()> {
        if self
            .unreachable
            .lock()
            .expect("notifier lock poisoned")
            .contains(handle)
        {
            return Err(FundError::upstream(format!("{handle} is unreachable")));
        }

        self.sent
            .lock()
            .expect("notifier lock poisoned")
            .push(SentMessage {
                handle: handle.to_string(),
                text: text.to_string(),
            });
        Ok(())
    }
}

/// Accepts webhook payloads whose signature equals a fixed token and
/// answers intent requests with a canned intent.
pub struct StaticPaymentProvider {
    accepted_signature: String,
    intent: PaymentIntent,
    requests: Mutex<Vec<PaymentIntentRequest>>,
}

impl StaticPaymentProvider {
    pub fn new(accepted_signature: impl Into<String>) -> Self {
        Self {
            accepted_signature: accepted_signature.into(),
            intent: PaymentIntent {
                pay_url: Some("https://pay.local/intent".to_string()),
                qr_code_url: Some("https://pay.local/qr".to_string()),
                deeplink: None,
                result_code: 0,
                message: "Successful.".to_string(),
            },
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_intent(mut self, intent: PaymentIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn requests(&self) -> Vec<PaymentIntentRequest> {
        self.requests.lock().expect("provider lock poisoned").clone()
    }
}

#[async_trait]
impl PaymentIntentProvider for StaticPaymentProvider {
    async fn create_intent(&self, request: PaymentIntentRequest) -> FundResult<PaymentIntent> {
        self.requests
            .lock()
            .expect("provider lock poisoned")
            .push(request);
        Ok(self.intent.clone())
    }

    fn verify_signature(&self, payload: &WebhookPayload) -> bool {
        payload.signature == self.accepted_signature
    }
}
