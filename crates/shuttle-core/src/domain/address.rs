//! Physical queue address.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical address of a queue. For the directory store this is a single
/// path segment under the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Can this address be used as a directory name?
    pub fn is_single_segment(&self) -> bool {
        is_single_segment(&self.0)
    }
}

/// One path component that is neither hidden nor a parent reference.
/// Queue directories and message file names share this rule.
pub(crate) fn is_single_segment(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
