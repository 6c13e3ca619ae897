//! Record-level access granted through security groups.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use nimbus_core::{AggregateId, DomainError, UserId};

use crate::group::SecurityGroupId;

/// Ordered so that a higher level implies every lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Edit,
    Delete,
    Owner,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Edit => "edit",
            AccessLevel::Delete => "delete",
            AccessLevel::Owner => "owner",
        }
    }

    pub fn allows(&self, required: AccessLevel) -> bool {
        *self >= required
    }
}

impl core::str::FromStr for AccessLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "view" => Ok(Self::Read),
            "edit" | "write" => Ok(Self::Edit),
            "delete" => Ok(Self::Delete),
            "owner" => Ok(Self::Owner),
            other => Err(DomainError::validation(format!("unknown access level '{other}'"))),
        }
    }
}

/// Kinds of record that can carry group grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Company,
    Person,
    Lead,
    Opportunity,
    SupportCase,
    PurchaseOrder,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Company => "company",
            RecordType::Person => "person",
            RecordType::Lead => "lead",
            RecordType::Opportunity => "opportunity",
            RecordType::SupportCase => "support_case",
            RecordType::PurchaseOrder => "purchase_order",
        }
    }
}

impl core::str::FromStr for RecordType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "company" => Ok(Self::Company),
            "person" => Ok(Self::Person),
            "lead" => Ok(Self::Lead),
            "opportunity" => Ok(Self::Opportunity),
            "support_case" | "case" => Ok(Self::SupportCase),
            "purchase_order" => Ok(Self::PurchaseOrder),
            other => Err(DomainError::validation(format!("unknown record type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_type: RecordType,
    pub record_id: AggregateId,
}

impl RecordRef {
    pub fn new(record_type: RecordType, record_id: impl Into<AggregateId>) -> Self {
        Self {
            record_type,
            record_id: record_id.into(),
        }
    }
}

/// One ACL row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordGrant {
    pub record: RecordRef,
    pub level: AccessLevel,
}

/// The parts of a group that access resolution needs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessNode {
    pub parent_id: Option<SecurityGroupId>,
    pub inherit_permissions: bool,
    pub active: bool,
    pub members: BTreeSet<UserId>,
    pub grants: BTreeMap<RecordRef, AccessLevel>,
}

/// Highest level `user` holds on `record` across all live groups.
///
/// A group contributes its own grant; when it inherits, its parent's grant
/// counts too, and so on upward while each step keeps inheriting. Inactive
/// groups contribute nothing and stop the upward walk.
pub fn effective_access(
    groups: &BTreeMap<SecurityGroupId, AccessNode>,
    user: UserId,
    record: &RecordRef,
) -> Option<AccessLevel> {
    groups
        .iter()
        .filter(|(_, node)| node.active && node.members.contains(&user))
        .filter_map(|(id, _)| level_through(groups, *id, record))
        .max()
}

fn level_through(
    groups: &BTreeMap<SecurityGroupId, AccessNode>,
    start: SecurityGroupId,
    record: &RecordRef,
) -> Option<AccessLevel> {
    let mut best = None;
    let mut seen = HashSet::new();
    let mut current = Some(start);

    while let Some(id) = current {
        if !seen.insert(id) {
            break;
        }
        let Some(node) = groups.get(&id).filter(|n| n.active) else {
            break;
        };
        best = best.max(node.grants.get(record).copied());
        current = if node.inherit_permissions {
            node.parent_id
        } else {
            None
        };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(parent: Option<SecurityGroupId>, inherit: bool) -> AccessNode {
        AccessNode {
            parent_id: parent,
            inherit_permissions: inherit,
            active: true,
            ..AccessNode::default()
        }
    }

    #[test]
    fn levels_are_ordered() {
        assert!(AccessLevel::Owner.allows(AccessLevel::Delete));
        assert!(AccessLevel::Edit.allows(AccessLevel::Read));
        assert!(!AccessLevel::Read.allows(AccessLevel::Edit));
        assert_eq!("Write".parse::<AccessLevel>().unwrap(), AccessLevel::Edit);
        assert_eq!("support-case".parse::<RecordType>().unwrap(), RecordType::SupportCase);
    }

    #[test]
    fn inherited_grants_flow_down_while_children_inherit() {
        let user = UserId::new();
        let record = RecordRef::new(RecordType::Lead, AggregateId::new());
        let (root, mid, leaf) = (
            SecurityGroupId::generate(),
            SecurityGroupId::generate(),
            SecurityGroupId::generate(),
        );

        let mut groups = BTreeMap::new();
        let mut root_node = node(None, false);
        root_node.grants.insert(record, AccessLevel::Owner);
        groups.insert(root, root_node);
        let mut mid_node = node(Some(root), true);
        mid_node.grants.insert(record, AccessLevel::Read);
        groups.insert(mid, mid_node);
        let mut leaf_node = node(Some(mid), true);
        leaf_node.members.insert(user);
        groups.insert(leaf, leaf_node);

        assert_eq!(effective_access(&groups, user, &record), Some(AccessLevel::Owner));

        // mid stops inheriting: leaf only sees mid's own grant
        groups.get_mut(&mid).unwrap().inherit_permissions = false;
        assert_eq!(effective_access(&groups, user, &record), Some(AccessLevel::Read));

        groups.get_mut(&leaf).unwrap().inherit_permissions = false;
        assert_eq!(effective_access(&groups, user, &record), None);
    }

    #[test]
    fn inactive_groups_and_non_members_get_nothing() {
        let user = UserId::new();
        let record = RecordRef::new(RecordType::Company, AggregateId::new());
        let id = SecurityGroupId::generate();
        let mut n = node(None, false);
        n.grants.insert(record, AccessLevel::Edit);
        n.members.insert(user);
        let mut groups = BTreeMap::from([(id, n)]);

        assert_eq!(effective_access(&groups, user, &record), Some(AccessLevel::Edit));
        assert_eq!(effective_access(&groups, UserId::new(), &record), None);
        groups.get_mut(&id).unwrap().active = false;
        assert_eq!(effective_access(&groups, user, &record), None);
    }
}
