//! Deployment module

pub mod checks;
pub mod fsm;
pub mod manager;
pub mod orchestrator;
pub mod plan;
pub mod store;
