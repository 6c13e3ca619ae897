//! Contacts domain module (companies and people, event-sourced).
//!
//! Pure business rules: no IO, no HTTP, no storage.

pub mod company;
pub mod contact;
pub mod person;

pub use company::{
    Company, CompanyCommand, CompanyCreated, CompanyDeleted, CompanyEvent, CompanyId, CompanyKind,
    CompanyRestored, CompanyUpdated, CreateCompany, DeleteCompany, RestoreCompany, UpdateCompany,
};
pub use contact::{ContactInfo, normalize_email, phone_digits};
pub use person::{
    CreatePerson, DeletePerson, Person, PersonCommand, PersonCreated, PersonDeleted, PersonEvent,
    PersonId, PersonRestored, PersonUpdated, RestorePerson, UpdatePerson, full_name,
};
