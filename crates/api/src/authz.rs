//! API-side authorization guard.
//!
//! Checked at the route boundary before any service call, so domain crates
//! and infra stay auth-agnostic. The role policy is static.

use nimbus_security::{AuthzError, Permission, Principal, Role, TenantMembership, authorize};

use crate::context::{PrincipalContext, TenantContext};

/// Permission namespaces, one per resource family.
pub const NAMESPACES: &[&str] = &[
    "companies",
    "people",
    "leads",
    "opportunities",
    "purchase_orders",
    "cases",
    "groups",
    "custom_fields",
    "exchange",
];

/// Fails unless the principal holds `required` in the request's tenant.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &'static str,
) -> Result<(), AuthzError> {
    let membership = TenantMembership::from_roles(
        tenant.tenant_id(),
        principal.roles().to_vec(),
        permissions_for_role,
    );
    let principal = Principal::new(principal.user_id(), membership);
    authorize(&principal, &Permission::from_static(required))
}

/// Static role -> permission policy.
pub fn permissions_for_role(role: &Role) -> Vec<Permission> {
    let p = Permission::from_static;
    match role.as_str() {
        r if r.eq_ignore_ascii_case("admin") => vec![p("*")],
        "sales" => vec![
            p("leads.*"),
            p("opportunities.*"),
            p("companies.*"),
            p("people.*"),
            p("custom_fields.read"),
            p("exchange.*"),
        ],
        "support" => vec![
            p("cases.*"),
            p("companies.read"),
            p("people.read"),
            p("custom_fields.read"),
        ],
        "purchasing" => vec![
            p("purchase_orders.*"),
            p("companies.*"),
            p("custom_fields.read"),
        ],
        "viewer" => NAMESPACES
            .iter()
            .filter(|ns| **ns != "exchange")
            .map(|ns| Permission::new(format!("{ns}.read")))
            .collect(),
        _ => Vec::new(),
    }
}
