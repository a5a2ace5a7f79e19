pub mod collaborators;
pub mod memory;

pub use collaborators::{RecordingNotifier, SentMessage, StaticPaymentProvider};
pub use memory::InMemoryFundStore;
