pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lexicon;
pub mod nlu;
pub mod store;

pub use domain::account::{AccountNo, AccountRecord, AccountSummary, Pin, TransactionRecord};
pub use domain::intent::BankIntent;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lexicon::{Lexicon, LexiconHandle};
pub use nlu::{Entity, IntentClassifier, IntentPrediction, NluPipeline, NluSignal};
pub use store::{AccountStore, CardBlockOutcome, StoreError, TransferOutcome};
