//! `nimbus-security`: authentication and authorization rules.
//!
//! Token verification, role/permission checks, the security group tree and
//! record-level access grants. No HTTP, no storage.

pub mod access;
pub mod authorize;
pub mod claims;
pub mod group;
pub mod hierarchy;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use access::{AccessLevel, AccessNode, RecordGrant, RecordRef, RecordType, effective_access};
pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use group::{
    AddMember, CreateSecurityGroup, DeleteSecurityGroup, GrantRecordAccess, MemberAdded,
    MemberRemoved, MoveSecurityGroup, RecordAccessGranted, RecordAccessRevoked, RemoveMember,
    RestoreSecurityGroup, RevokeRecordAccess, SecurityGroup, SecurityGroupCommand,
    SecurityGroupCreated, SecurityGroupDeleted, SecurityGroupEvent, SecurityGroupId,
    SecurityGroupMoved, SecurityGroupRestored, SecurityGroupUpdated, UpdateSecurityGroup,
};
pub use hierarchy::{
    HierarchyError, HierarchyPosition, MAX_DEPTH, ParentMap, ancestors, descendants,
    subtree_height, validate_hierarchy,
};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::TenantMembership;
pub use roles::Role;
