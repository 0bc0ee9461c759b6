use std::fmt;
use terranetes_policy_controller_k8s_api::{Resource, ResourceExt};

/// Identifies a cluster object by kind, namespace and name.
///
/// Cluster-scoped objects have an empty namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

// === impl Identity ===

impl Identity {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<T>(obj: &T) -> Self
    where
        T: Resource,
        T::DynamicType: Default,
    {
        let dt = Default::default();
        Self {
            kind: T::kind(&dt).into_owned(),
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terranetes_policy_controller_k8s_api::{Policy, PolicySpec};

    #[test]
    fn identity_of_cluster_object() {
        let policy = Policy::new("security", PolicySpec::default());
        let id = Identity::of(&policy);
        assert_eq!(id, Identity::new("Policy", "", "security"));
        assert_eq!(id.to_string(), "Policy/security");
    }

    #[test]
    fn identities_differ_by_kind() {
        assert_ne!(
            Identity::new("Policy", "", "shared"),
            Identity::new("Context", "", "shared")
        );
    }
}
