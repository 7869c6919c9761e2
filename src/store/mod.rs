pub mod config_repo;
pub mod models;
pub mod settlement;

pub use config_repo::ConfigRepository;
pub use settlement::SettlementRepository;
