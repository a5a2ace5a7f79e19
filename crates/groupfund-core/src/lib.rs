pub mod error;
pub mod gateway;
pub mod models;
pub mod storage;

pub use error::{FundError, FundResult};
pub use gateway::{
    BroadcastReport, NotificationGateway, PaymentIntent, PaymentIntentProvider,
    PaymentIntentRequest, WebhookPayload,
};
pub use models::{
    CreateMember, Member, MemberStatus, NewObligation, NewPaymentTransaction, Obligation,
    ObligationFilter, ObligationStatus, PaymentTransaction, Schedule, ScheduleCadence,
    ScheduleInput, TransactionStatus, UpdateMember,
};
pub use storage::{
    FundStore, MemberStore, ObligationStore, ScheduleStore, Settlement, SettlementRecord,
    TransactionStore,
};
