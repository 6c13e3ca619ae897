use thiserror::Error;

use nimbus_core::{TenantId, UserId};

use crate::{Permission, TenantMembership};

/// An authenticated user acting within one team.
///
/// Built by the API from verified token claims plus the role policy; no
/// storage lookups are involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    pub fn new(user_id: UserId, membership: TenantMembership) -> Self {
        Self {
            user_id,
            active_tenant_id: membership.tenant_id,
            membership,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Checks `required` against the principal's permissions in its active tenant.
///
/// Pure policy check: no IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    if principal
        .membership
        .permissions
        .iter()
        .any(|held| held.grants(required))
    {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
