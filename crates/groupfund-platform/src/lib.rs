pub mod config;
pub mod contracts;
pub mod db;
pub mod momo;
pub mod notify;
pub mod pg_store;
pub mod runtime;
pub mod session;
pub mod signing;

pub use config::{
    AuthConfig, MetaConfig, MomoConfig, MomoEnvironment, NotifierBackend, NotifierConfig,
    ServiceConfig, StoreBackend, ZaloConfig,
};
pub use contracts::{
    Ack, AddTransactionRequest, BroadcastRequest, ContributionQuery, CreateContributionRequest,
    CreatePaymentRequest, CreatePaymentResponse, GenerateRequest, LoginRequest, LoginResponse,
    MemberQuery, MetaSubscription, SendMessageRequest, TransferNotification, WeekRequest,
};
pub use db::{apply_schema, connect_database};
pub use momo::{MomoClient, PaymentStatus};
pub use notify::{
    DisabledNotifier, MetaNotifier, ZaloNotifier, build_notifier, verify_meta_subscription,
};
pub use pg_store::PgFundStore;
pub use runtime::{build_ledger, build_store};
pub use session::{AdminAuth, AdminSession, bearer_token};
