//! Support domain module (customer support cases, event-sourced).
//!
//! Pure business rules: no IO, no HTTP, no storage.

pub mod case;

pub use case::{
    AssignCase, CaseAssigned, CaseDeleted, CaseDetails, CaseDetailsUpdated, CaseOpened,
    CasePriority, CaseReopened, CaseResolved, CaseRestored, CaseStatus, CaseStatusChanged,
    ChangeCaseStatus, DeleteCase, OpenCase, ReopenCase, ResolveCase, RestoreCase, SupportCase,
    SupportCaseCommand, SupportCaseEvent, SupportCaseId, UpdateCaseDetails, format_case_number,
};
