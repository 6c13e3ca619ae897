use nimbus_core::{TenantId, UserId};
use nimbus_infra::CommandContext;
use nimbus_security::Role;

/// Tenant context for a request.
///
/// Taken from the verified token and never from the request body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated user + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

/// Write context for the services: tenant, acting user, request time.
pub fn command_context(tenant: &TenantContext, principal: &PrincipalContext) -> CommandContext {
    CommandContext::new(tenant.tenant_id(), Some(principal.user_id()))
}
