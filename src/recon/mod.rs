pub mod coordinator;
pub mod deposit;
pub mod engine;
pub mod locator;
pub mod validator;

pub use coordinator::{BatchCoordinator, ConfigRunResult, RunStats};
pub use deposit::DepositGrouper;
pub use engine::ReconEngine;
pub use locator::EntryLocator;
pub use validator::{validate, MatchDecision};
