use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nimbus_core::{
    Aggregate, AggregateRoot, DomainError, RecordAudit, TenantId, UserId, record_id,
};
use nimbus_events::Event;

use crate::access::{AccessLevel, AccessNode, RecordRef};
use crate::hierarchy::HierarchyPosition;

record_id!(
    /// Security group identifier.
    SecurityGroupId
);

/// Aggregate root: SecurityGroup.
///
/// Tree placement is computed and validated by the caller (it needs the
/// whole tenant tree); the aggregate only checks that the position it is
/// given is self-consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    id: SecurityGroupId,
    tenant_id: Option<TenantId>,
    name: String,
    description: Option<String>,
    position: HierarchyPosition,
    inherit_permissions: bool,
    active: bool,
    members: BTreeSet<UserId>,
    grants: BTreeMap<RecordRef, AccessLevel>,
    audit: RecordAudit,
    version: u64,
    created: bool,
}

impl SecurityGroup {
    /// Empty instance for rehydration.
    pub fn empty(id: SecurityGroupId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            description: None,
            position: HierarchyPosition::root(id),
            inherit_permissions: false,
            active: true,
            members: BTreeSet::new(),
            grants: BTreeMap::new(),
            audit: RecordAudit::default(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn position(&self) -> &HierarchyPosition {
        &self.position
    }

    pub fn parent_id(&self) -> Option<SecurityGroupId> {
        self.position.parent_id
    }

    pub fn level(&self) -> u32 {
        self.position.level
    }

    pub fn inherit_permissions(&self) -> bool {
        self.inherit_permissions
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn members(&self) -> &BTreeSet<UserId> {
        &self.members
    }

    pub fn grants(&self) -> &BTreeMap<RecordRef, AccessLevel> {
        &self.grants
    }

    pub fn audit(&self) -> &RecordAudit {
        &self.audit
    }

    pub fn is_deleted(&self) -> bool {
        self.audit.is_deleted()
    }

    pub fn access_node(&self) -> AccessNode {
        AccessNode {
            parent_id: self.position.parent_id,
            inherit_permissions: self.inherit_permissions,
            active: self.active && !self.is_deleted(),
            members: self.members.clone(),
            grants: self.grants.clone(),
        }
    }
}

impl AggregateRoot for SecurityGroup {
    type Id = SecurityGroupId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSecurityGroup {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub name: String,
    pub description: Option<String>,
    pub position: HierarchyPosition,
    pub inherit_permissions: bool,
    pub active: bool,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value. A blank description clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSecurityGroup {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub inherit_permissions: Option<bool>,
    pub active: Option<bool>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSecurityGroup {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub position: HierarchyPosition,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMember {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub user_id: UserId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMember {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub user_id: UserId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Re-granting a record replaces its level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecordAccess {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub records: Vec<RecordRef>,
    pub level: AccessLevel,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRecordAccess {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub records: Vec<RecordRef>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSecurityGroup {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSecurityGroup {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityGroupCommand {
    CreateSecurityGroup(CreateSecurityGroup),
    UpdateSecurityGroup(UpdateSecurityGroup),
    MoveSecurityGroup(MoveSecurityGroup),
    AddMember(AddMember),
    RemoveMember(RemoveMember),
    GrantRecordAccess(GrantRecordAccess),
    RevokeRecordAccess(RevokeRecordAccess),
    DeleteSecurityGroup(DeleteSecurityGroup),
    RestoreSecurityGroup(RestoreSecurityGroup),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupCreated {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub name: String,
    pub description: Option<String>,
    pub position: HierarchyPosition,
    pub inherit_permissions: bool,
    pub active: bool,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupUpdated {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub name: String,
    pub description: Option<String>,
    pub inherit_permissions: bool,
    pub active: bool,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupMoved {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub from_parent: Option<SecurityGroupId>,
    pub position: HierarchyPosition,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAdded {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub user_id: UserId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRemoved {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub user_id: UserId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAccessGranted {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub records: Vec<RecordRef>,
    pub level: AccessLevel,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAccessRevoked {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub records: Vec<RecordRef>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupDeleted {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRestored {
    pub tenant_id: TenantId,
    pub group_id: SecurityGroupId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityGroupEvent {
    SecurityGroupCreated(SecurityGroupCreated),
    SecurityGroupUpdated(SecurityGroupUpdated),
    SecurityGroupMoved(SecurityGroupMoved),
    MemberAdded(MemberAdded),
    MemberRemoved(MemberRemoved),
    RecordAccessGranted(RecordAccessGranted),
    RecordAccessRevoked(RecordAccessRevoked),
    SecurityGroupDeleted(SecurityGroupDeleted),
    SecurityGroupRestored(SecurityGroupRestored),
}

macro_rules! each_event {
    ($self:expr, $e:ident => $body:expr) => {
        match $self {
            SecurityGroupEvent::SecurityGroupCreated($e) => $body,
            SecurityGroupEvent::SecurityGroupUpdated($e) => $body,
            SecurityGroupEvent::SecurityGroupMoved($e) => $body,
            SecurityGroupEvent::MemberAdded($e) => $body,
            SecurityGroupEvent::MemberRemoved($e) => $body,
            SecurityGroupEvent::RecordAccessGranted($e) => $body,
            SecurityGroupEvent::RecordAccessRevoked($e) => $body,
            SecurityGroupEvent::SecurityGroupDeleted($e) => $body,
            SecurityGroupEvent::SecurityGroupRestored($e) => $body,
        }
    };
}

impl SecurityGroupEvent {
    pub fn tenant_id(&self) -> TenantId {
        each_event!(self, e => e.tenant_id)
    }

    pub fn group_id(&self) -> SecurityGroupId {
        each_event!(self, e => e.group_id)
    }
}

impl Event for SecurityGroupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SecurityGroupEvent::SecurityGroupCreated(_) => "security.group.created",
            SecurityGroupEvent::SecurityGroupUpdated(_) => "security.group.updated",
            SecurityGroupEvent::SecurityGroupMoved(_) => "security.group.moved",
            SecurityGroupEvent::MemberAdded(_) => "security.group.member_added",
            SecurityGroupEvent::MemberRemoved(_) => "security.group.member_removed",
            SecurityGroupEvent::RecordAccessGranted(_) => "security.group.access_granted",
            SecurityGroupEvent::RecordAccessRevoked(_) => "security.group.access_revoked",
            SecurityGroupEvent::SecurityGroupDeleted(_) => "security.group.deleted",
            SecurityGroupEvent::SecurityGroupRestored(_) => "security.group.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        each_event!(self, e => e.occurred_at)
    }
}

impl Aggregate for SecurityGroup {
    type Command = SecurityGroupCommand;
    type Event = SecurityGroupEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SecurityGroupEvent::SecurityGroupCreated(e) => {
                self.id = e.group_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.position = e.position.clone();
                self.inherit_permissions = e.inherit_permissions;
                self.active = e.active;
                self.audit = RecordAudit::created(e.actor, e.occurred_at);
                self.created = true;
            }
            SecurityGroupEvent::SecurityGroupUpdated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.inherit_permissions = e.inherit_permissions;
                self.active = e.active;
                self.audit.touch(e.actor, e.occurred_at);
            }
            SecurityGroupEvent::SecurityGroupMoved(e) => {
                self.position = e.position.clone();
                self.audit.touch(e.actor, e.occurred_at);
            }
            SecurityGroupEvent::MemberAdded(e) => {
                self.members.insert(e.user_id);
                self.audit.touch(e.actor, e.occurred_at);
            }
            SecurityGroupEvent::MemberRemoved(e) => {
                self.members.remove(&e.user_id);
                self.audit.touch(e.actor, e.occurred_at);
            }
            SecurityGroupEvent::RecordAccessGranted(e) => {
                for record in &e.records {
                    self.grants.insert(*record, e.level);
                }
                self.audit.touch(e.actor, e.occurred_at);
            }
            SecurityGroupEvent::RecordAccessRevoked(e) => {
                for record in &e.records {
                    self.grants.remove(record);
                }
                self.audit.touch(e.actor, e.occurred_at);
            }
            SecurityGroupEvent::SecurityGroupDeleted(e) => self.audit.mark_deleted(e.actor, e.occurred_at),
            SecurityGroupEvent::SecurityGroupRestored(e) => self.audit.restore(e.actor, e.occurred_at),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SecurityGroupCommand::CreateSecurityGroup(cmd) => self.handle_create(cmd),
            SecurityGroupCommand::UpdateSecurityGroup(cmd) => self.handle_update(cmd),
            SecurityGroupCommand::MoveSecurityGroup(cmd) => self.handle_move(cmd),
            SecurityGroupCommand::AddMember(cmd) => self.handle_add_member(cmd),
            SecurityGroupCommand::RemoveMember(cmd) => self.handle_remove_member(cmd),
            SecurityGroupCommand::GrantRecordAccess(cmd) => self.handle_grant(cmd),
            SecurityGroupCommand::RevokeRecordAccess(cmd) => self.handle_revoke(cmd),
            SecurityGroupCommand::DeleteSecurityGroup(cmd) => self.handle_delete(cmd),
            SecurityGroupCommand::RestoreSecurityGroup(cmd) => self.handle_restore(cmd),
        }
    }
}

impl SecurityGroup {
    fn ensure_existing(&self, tenant_id: TenantId, group_id: SecurityGroupId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("security group"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != group_id {
            return Err(DomainError::invariant("group_id mismatch"));
        }
        Ok(())
    }

    fn ensure_writable(&self, tenant_id: TenantId, group_id: SecurityGroupId) -> Result<(), DomainError> {
        self.ensure_existing(tenant_id, group_id)?;
        if self.is_deleted() {
            return Err(DomainError::deleted("security group"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSecurityGroup) -> Result<Vec<SecurityGroupEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("security group already exists"));
        }
        let name = validated_name(&cmd.name)?;
        ensure_position(&cmd.position, cmd.group_id)?;

        Ok(vec![SecurityGroupEvent::SecurityGroupCreated(SecurityGroupCreated {
            tenant_id: cmd.tenant_id,
            group_id: cmd.group_id,
            name,
            description: non_blank(cmd.description.as_deref()),
            position: cmd.position.clone(),
            inherit_permissions: cmd.inherit_permissions,
            active: cmd.active,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateSecurityGroup) -> Result<Vec<SecurityGroupEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.group_id)?;

        let name = match &cmd.name {
            Some(n) => validated_name(n)?,
            None => self.name.clone(),
        };
        let description = match &cmd.description {
            Some(d) => non_blank(Some(d)),
            None => self.description.clone(),
        };

        Ok(vec![SecurityGroupEvent::SecurityGroupUpdated(SecurityGroupUpdated {
            tenant_id: cmd.tenant_id,
            group_id: cmd.group_id,
            name,
            description,
            inherit_permissions: cmd.inherit_permissions.unwrap_or(self.inherit_permissions),
            active: cmd.active.unwrap_or(self.active),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_move(&self, cmd: &MoveSecurityGroup) -> Result<Vec<SecurityGroupEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.group_id)?;
        ensure_position(&cmd.position, cmd.group_id)?;
        if cmd.position == self.position {
            return Err(DomainError::conflict("security group is already at that position"));
        }

        Ok(vec![SecurityGroupEvent::SecurityGroupMoved(SecurityGroupMoved {
            tenant_id: cmd.tenant_id,
            group_id: cmd.group_id,
            from_parent: self.position.parent_id,
            position: cmd.position.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_member(&self, cmd: &AddMember) -> Result<Vec<SecurityGroupEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.group_id)?;
        if self.members.contains(&cmd.user_id) {
            return Err(DomainError::conflict("user is already a member"));
        }
        Ok(vec![SecurityGroupEvent::MemberAdded(MemberAdded {
            tenant_id: cmd.tenant_id,
            group_id: cmd.group_id,
            user_id: cmd.user_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_member(&self, cmd: &RemoveMember) -> Result<Vec<SecurityGroupEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.group_id)?;
        if !self.members.contains(&cmd.user_id) {
            return Err(DomainError::conflict("user is not a member"));
        }
        Ok(vec![SecurityGroupEvent::MemberRemoved(MemberRemoved {
            tenant_id: cmd.tenant_id,
            group_id: cmd.group_id,
            user_id: cmd.user_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_grant(&self, cmd: &GrantRecordAccess) -> Result<Vec<SecurityGroupEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.group_id)?;
        let records = distinct(&cmd.records);
        if records.is_empty() {
            return Err(DomainError::validation("at least one record is required"));
        }
        Ok(vec![SecurityGroupEvent::RecordAccessGranted(RecordAccessGranted {
            tenant_id: cmd.tenant_id,
            group_id: cmd.group_id,
            records,
            level: cmd.level,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke(&self, cmd: &RevokeRecordAccess) -> Result<Vec<SecurityGroupEvent>, DomainError> {
        self.ensure_writable(cmd.tenant_id, cmd.group_id)?;
        if cmd.records.is_empty() {
            return Err(DomainError::validation("at least one record is required"));
        }
        let records: Vec<RecordRef> = distinct(&cmd.records)
            .into_iter()
            .filter(|r| self.grants.contains_key(r))
            .collect();
        if records.is_empty() {
            return Err(DomainError::conflict("none of the records are granted to this group"));
        }
        Ok(vec![SecurityGroupEvent::RecordAccessRevoked(RecordAccessRevoked {
            tenant_id: cmd.tenant_id,
            group_id: cmd.group_id,
            records,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteSecurityGroup) -> Result<Vec<SecurityGroupEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.group_id)?;
        if self.is_deleted() {
            return Err(DomainError::conflict("security group is already deleted"));
        }
        Ok(vec![SecurityGroupEvent::SecurityGroupDeleted(SecurityGroupDeleted {
            tenant_id: cmd.tenant_id,
            group_id: cmd.group_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreSecurityGroup) -> Result<Vec<SecurityGroupEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.group_id)?;
        if !self.is_deleted() {
            return Err(DomainError::conflict("security group is not deleted"));
        }
        Ok(vec![SecurityGroupEvent::SecurityGroupRestored(SecurityGroupRestored {
            tenant_id: cmd.tenant_id,
            group_id: cmd.group_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validated_name(raw: &str) -> Result<String, DomainError> {
    non_blank(Some(raw)).ok_or_else(|| DomainError::validation("name cannot be empty"))
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn ensure_position(position: &HierarchyPosition, id: SecurityGroupId) -> Result<(), DomainError> {
    if position.is_consistent_for(id) {
        Ok(())
    } else {
        Err(DomainError::invariant("inconsistent hierarchy position"))
    }
}

fn distinct(records: &[RecordRef]) -> Vec<RecordRef> {
    let mut out = records.to_vec();
    out.sort();
    out.dedup();
    out
}
