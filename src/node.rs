//! Node identity.
//!
//! Each process gets a unique id for its lifetime, used only to suppress
//! reprocessing of its own bus events. It carries no ownership or authority.

use uuid::Uuid;

/// Process-lifetime identifier for this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    id: String,
}

impl NodeIdentity {
    /// Generate a fresh identity, optionally prefixed with a human-readable
    /// name (`lobby-1:550e8400...`).
    pub fn generate(name: Option<&str>) -> Self {
        let id = Uuid::new_v4().to_string();
        let id = match name {
            Some(name) if !name.is_empty() => format!("{name}:{id}"),
            _ => id,
        };
        Self { id }
    }

    /// The full id string, as carried in event origins.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Does the given event origin refer to this node?
    pub fn is_self(&self, origin: &str) -> bool {
        self.id == origin
    }
}

impl std::fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique() {
        let a = NodeIdentity::generate(None);
        let b = NodeIdentity::generate(None);
        assert_ne!(a.id(), b.id());
        assert!(a.is_self(a.id()));
        assert!(!a.is_self(b.id()));
    }

    #[test]
    fn name_prefix_is_carried() {
        let node = NodeIdentity::generate(Some("lobby-1"));
        assert!(node.id().starts_with("lobby-1:"));
    }
}
