use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier, `<namespace>.<action>` (e.g. "leads.write").
///
/// Two wildcard forms are understood: `"*"` grants everything and
/// `"<namespace>.*"` grants every action in that namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    pub fn namespace(&self) -> Option<&str> {
        self.as_str().split_once('.').map(|(ns, _)| ns)
    }

    /// Whether holding `self` satisfies a check for `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(ns) => required.namespace() == Some(ns),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
