use serde::{Deserialize, Serialize};

use nimbus_core::TenantId;

use crate::{Permission, Role};

/// What a user may do inside one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl TenantMembership {
    /// Expands roles through a policy function; duplicate permissions are dropped.
    pub fn from_roles<F>(tenant_id: TenantId, roles: Vec<Role>, policy: F) -> Self
    where
        F: Fn(&Role) -> Vec<Permission>,
    {
        let mut permissions: Vec<Permission> = roles.iter().flat_map(&policy).collect();
        permissions.sort();
        permissions.dedup();
        Self {
            tenant_id,
            roles,
            permissions,
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_roles_merges_and_dedups_permissions() {
        let m = TenantMembership::from_roles(
            TenantId::new(),
            vec![Role::SALES, Role::VIEWER],
            |role| match role.as_str() {
                "sales" => vec![Permission::from_static("leads.*"), Permission::from_static("leads.read")],
                _ => vec![Permission::from_static("leads.read")],
            },
        );
        assert_eq!(m.permissions.len(), 2);
        assert!(m.has_role(&Role::SALES));
        assert!(!m.has_role(&Role::ADMIN));
    }
}
