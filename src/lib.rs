// Core modules
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod indicators;
pub mod ledger;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use config::Settings;
pub use engine::Engine;
pub use error::GatewayError;
pub use gateway::ExchangeGateway;
