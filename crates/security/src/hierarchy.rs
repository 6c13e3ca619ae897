//! Security group tree rules.
//!
//! Every group stores its `level` (roots are 0) and its `path`: the ancestor
//! ids from the root down to and including the group itself. The functions
//! here work on a plain `child -> parent` map so they can be checked before
//! any event is written.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use nimbus_core::DomainError;

use crate::group::SecurityGroupId;

/// Maximum number of levels in a tree (levels `0..MAX_DEPTH`).
pub const MAX_DEPTH: u32 = 16;

/// `group -> parent` for every live group of a tenant.
pub type ParentMap = HashMap<SecurityGroupId, Option<SecurityGroupId>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("a group cannot be its own parent")]
    SelfParent,

    #[error("parent group {0} does not exist")]
    UnknownParent(SecurityGroupId),

    #[error("group {parent} is a descendant of {group} and cannot become its parent")]
    DescendantParent {
        group: SecurityGroupId,
        parent: SecurityGroupId,
    },

    #[error("hierarchy loop detected at group {0}")]
    Corrupt(SecurityGroupId),

    #[error("hierarchy would be {depth} levels deep (max {MAX_DEPTH})")]
    TooDeep { depth: u32 },
}

impl From<HierarchyError> for DomainError {
    fn from(e: HierarchyError) -> Self {
        match e {
            HierarchyError::Corrupt(_) => DomainError::invariant(e.to_string()),
            _ => DomainError::validation(e.to_string()),
        }
    }
}

/// Where a group sits in its tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyPosition {
    pub parent_id: Option<SecurityGroupId>,
    pub level: u32,
    pub path: Vec<SecurityGroupId>,
}

impl HierarchyPosition {
    pub fn root(id: SecurityGroupId) -> Self {
        Self {
            parent_id: None,
            level: 0,
            path: vec![id],
        }
    }

    pub fn child_of(parent: &HierarchyPosition, id: SecurityGroupId) -> Result<Self, HierarchyError> {
        let level = parent.level + 1;
        if level >= MAX_DEPTH {
            return Err(HierarchyError::TooDeep { depth: level + 1 });
        }
        let parent_id = parent.path.last().copied();
        let mut path = parent.path.clone();
        path.push(id);
        Ok(Self {
            parent_id,
            level,
            path,
        })
    }

    /// `level`, `path` and `parent_id` agree with each other and end at `id`.
    pub fn is_consistent_for(&self, id: SecurityGroupId) -> bool {
        let n = self.path.len();
        n == self.level as usize + 1
            && self.level < MAX_DEPTH
            && self.path.last() == Some(&id)
            && self.parent_id == n.checked_sub(2).map(|i| self.path[i])
            && self.path.iter().collect::<HashSet<_>>().len() == n
    }
}

/// Ancestor chain starting at `start` and ending at its root.
pub fn ancestors(
    start: SecurityGroupId,
    parents: &ParentMap,
) -> Result<Vec<SecurityGroupId>, HierarchyError> {
    let mut chain = vec![start];
    let mut seen = HashSet::from([start]);
    let mut current = start;
    while let Some(Some(parent)) = parents.get(&current) {
        if !seen.insert(*parent) {
            return Err(HierarchyError::Corrupt(*parent));
        }
        chain.push(*parent);
        current = *parent;
    }
    Ok(chain)
}

/// All descendants of `group`, parents before children.
pub fn descendants(group: SecurityGroupId, parents: &ParentMap) -> Vec<SecurityGroupId> {
    let mut children: HashMap<SecurityGroupId, Vec<SecurityGroupId>> = HashMap::new();
    for (child, parent) in parents {
        if let Some(p) = parent {
            children.entry(*p).or_default().push(*child);
        }
    }
    for list in children.values_mut() {
        list.sort();
    }

    let mut out = Vec::new();
    let mut seen = HashSet::from([group]);
    let mut queue = VecDeque::from([group]);
    while let Some(id) = queue.pop_front() {
        for child in children.get(&id).into_iter().flatten() {
            if seen.insert(*child) {
                out.push(*child);
                queue.push_back(*child);
            }
        }
    }
    out
}

/// Levels below `group` in its subtree (0 for a leaf).
pub fn subtree_height(group: SecurityGroupId, parents: &ParentMap) -> u32 {
    let mut height = 0;
    let mut frontier = vec![group];
    let mut seen = HashSet::from([group]);
    loop {
        let next: Vec<_> = parents
            .iter()
            .filter(|(child, parent)| {
                parent.is_some_and(|p| frontier.contains(&p)) && !seen.contains(*child)
            })
            .map(|(child, _)| *child)
            .collect();
        if next.is_empty() {
            return height;
        }
        seen.extend(next.iter().copied());
        frontier = next;
        height += 1;
    }
}

/// Checks that `group` may be placed under `new_parent` (`None` = root).
///
/// `group` does not have to be in `parents` yet (creation).
pub fn validate_hierarchy(
    group: SecurityGroupId,
    new_parent: Option<SecurityGroupId>,
    parents: &ParentMap,
) -> Result<(), HierarchyError> {
    let Some(parent) = new_parent else {
        return Ok(());
    };
    if parent == group {
        return Err(HierarchyError::SelfParent);
    }
    if !parents.contains_key(&parent) {
        return Err(HierarchyError::UnknownParent(parent));
    }

    let chain = ancestors(parent, parents)?;
    if chain.contains(&group) {
        return Err(HierarchyError::DescendantParent { group, parent });
    }

    // chain.len() == parent level + 1 == level of `group` after the move
    let deepest = chain.len() as u32 + subtree_height(group, parents);
    if deepest >= MAX_DEPTH {
        return Err(HierarchyError::TooDeep { depth: deepest + 1 });
    }
    Ok(())
}
