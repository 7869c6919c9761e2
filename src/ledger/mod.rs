pub mod store;

pub use store::{InMemoryLedger, LedgerStore};
