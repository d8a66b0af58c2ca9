//! The capability model a node handler is granted for one invocation
//! (§4.3: "denies unexplicitly-granted fs/network access"), trimmed to the
//! capabilities §4.3 actually names — no credential-vault or marketplace
//! concepts (out of scope per §1).

use serde::{Deserialize, Serialize};

/// One permission a node handler may be granted for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    /// Outbound network access, restricted to the given host allowlist.
    Network { allowed_hosts: Vec<String> },
    /// Filesystem access under the given path prefixes.
    FileSystem { paths: Vec<String>, read_only: bool },
    /// Access to a named credential resolved by the caller (opaque to the
    /// sandbox — credential storage itself is out of scope per §1).
    Credential { name: String },
}

/// How strictly a node invocation's declared [`Capability`] set is
/// enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// No enforcement — used only in tests.
    None,
    /// Capability checks are enforced against the handler's declared needs
    /// before dispatch. The default (§4.3).
    #[default]
    CapabilityGated,
}

/// The capability set granted to one node invocation, plus the isolation
/// level under which it runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Grant {
    pub capabilities: Vec<Capability>,
    pub isolation: IsolationLevel,
}

impl Grant {
    #[must_use]
    pub fn new(capabilities: Vec<Capability>) -> Self {
        Self { capabilities, isolation: IsolationLevel::CapabilityGated }
    }

    /// No capabilities granted at all — the default for a node type with
    /// no declared requirements (§4.3's "denies unexplicitly-granted
    /// access").
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allows_network(&self) -> bool {
        self.isolation == IsolationLevel::None
            || self.capabilities.iter().any(|c| matches!(c, Capability::Network { .. }))
    }

    #[must_use]
    pub fn allows_filesystem(&self) -> bool {
        self.isolation == IsolationLevel::None
            || self.capabilities.iter().any(|c| matches!(c, Capability::FileSystem { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_grant_denies_network_and_filesystem() {
        let grant = Grant::none();
        assert!(!grant.allows_network());
        assert!(!grant.allows_filesystem());
    }

    #[test]
    fn explicit_network_capability_is_allowed() {
        let grant = Grant::new(vec![Capability::Network { allowed_hosts: vec!["api.example.com".into()] }]);
        assert!(grant.allows_network());
        assert!(!grant.allows_filesystem());
    }

    #[test]
    fn none_isolation_allows_everything() {
        let mut grant = Grant::none();
        grant.isolation = IsolationLevel::None;
        assert!(grant.allows_network());
        assert!(grant.allows_filesystem());
    }
}
