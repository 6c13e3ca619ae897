//! Infrastructure layer: event storage, command dispatch, projections,
//! application services and CSV exchange.

pub mod command_dispatcher;
pub mod crm;
pub mod event_bus;
pub mod event_store;
pub mod exchange;
pub mod projections;
pub mod read_model;
pub mod services;
pub mod streams;

pub use crm::{CommandContext, Crm, CrmSettings, ReadModels};

#[cfg(test)]
mod integration_tests;
