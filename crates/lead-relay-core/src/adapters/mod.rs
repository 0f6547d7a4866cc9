//! # Adapters
//!
//! Concrete backends for the storage and settings seams: process-local
//! implementations suited for tests and single-instance deployments, and the
//! environment-backed settings source used in production wiring.

pub mod env_settings;
pub mod memory_delivery_log;
pub mod memory_lead_store;

pub use env_settings::EnvSettings;
pub use memory_delivery_log::InMemoryDeliveryLog;
pub use memory_lead_store::InMemoryLeadStore;
