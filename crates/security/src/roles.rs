use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role name carried in access tokens.
///
/// The role -> permission policy lives with the caller (see the API's
/// `authz` module); this type only names the role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role::from_static("admin");
    pub const SALES: Role = Role::from_static("sales");
    pub const SUPPORT: Role = Role::from_static("support");
    pub const PURCHASING: Role = Role::from_static("purchasing");
    pub const VIEWER: Role = Role::from_static("viewer");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.as_str().eq_ignore_ascii_case("admin")
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
