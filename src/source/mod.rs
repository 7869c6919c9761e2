pub mod client;

pub use client::{HttpSettlementSource, SettlementSource, SettlementSummary};
