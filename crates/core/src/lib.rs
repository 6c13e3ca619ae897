//! `nimbus-core`: domain foundation building blocks shared by every CRM module.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, aggregate traits, money and the
//! ownership/soft-delete audit trail every record carries.

pub mod aggregate;
pub mod audit;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use audit::RecordAudit;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use money::{Currency, Money};
pub use value_object::ValueObject;
