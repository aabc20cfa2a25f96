use std::fmt;

use tracing::debug;

/// Resource version from which the next watch resumes.
///
/// Resource versions are opaque, but the API server hands out integers in
/// practice. When both sides parse as integers the cursor refuses to move
/// backwards; otherwise the newest token wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    resource_version: String,
}

impl Cursor {
    pub fn new(resource_version: impl Into<String>) -> Self {
        Self {
            resource_version: resource_version.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.resource_version
    }

    /// Moves the cursor to `resource_version`, returning whether it moved.
    pub fn advance(&mut self, resource_version: &str) -> bool {
        if resource_version.is_empty() || resource_version == self.resource_version {
            return false;
        }

        if let (Ok(current), Ok(next)) = (
            self.resource_version.parse::<u64>(),
            resource_version.parse::<u64>(),
        ) {
            if next < current {
                debug!(
                    current = %self.resource_version,
                    ignored = %resource_version,
                    "Ignoring older resource version"
                );
                return false;
            }
        }

        self.resource_version = resource_version.to_string();
        true
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource_version)
    }
}
