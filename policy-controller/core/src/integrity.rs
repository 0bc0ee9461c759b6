//! Finds the configurations that depend on a shared object.
//!
//! Contexts, namespaces and policies may not be deleted while configurations
//! still reference them. Each kind has an annotation that, when set to
//! `"true"`, permits the deletion regardless.

use crate::{Error, Identity};
use std::collections::BTreeMap;
use terranetes_policy_controller_k8s_api::{
    Configuration, Context, Namespace, Policy, Resource, ResourceExt,
    ORPHAN_ANNOTATION, SKIP_NAMESPACE_PROTECTION_ANNOTATION, SKIP_VALIDATION_ANNOTATION,
};
use tracing::debug;

/// An object that is about to be deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub id: Identity,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Context,
    Namespace,
    Policy,
}

/// The configurations that must be listed to check a candidate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scope<'a> {
    Cluster,
    Namespace(&'a str),
}

/// Rules for deleting shared objects.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rules {
    /// Refuse to delete namespaces that still hold configurations.
    pub namespace_protection: bool,
}

// === impl Candidate ===

impl Candidate {
    pub fn new(id: Identity) -> Self {
        Self {
            id,
            annotations: BTreeMap::new(),
        }
    }

    pub fn of<T>(obj: &T) -> Self
    where
        T: Resource,
        T::DynamicType: Default,
    {
        Self {
            id: Identity::of(obj),
            annotations: obj.annotations().clone(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> Option<Kind> {
        Kind::from_name(&self.id.kind)
    }

    fn is_bypassed(&self, kind: Kind) -> bool {
        self.annotations
            .get(kind.bypass_annotation())
            .map_or(false, |v| v == "true")
    }
}

// === impl Kind ===

impl Kind {
    pub fn from_name(kind: &str) -> Option<Self> {
        if kind == Context::kind(&()) {
            Some(Self::Context)
        } else if kind == Namespace::kind(&()) {
            Some(Self::Namespace)
        } else if kind == Policy::kind(&()) {
            Some(Self::Policy)
        } else {
            None
        }
    }

    pub fn bypass_annotation(&self) -> &'static str {
        match self {
            Self::Context => ORPHAN_ANNOTATION,
            Self::Namespace => SKIP_NAMESPACE_PROTECTION_ANNOTATION,
            Self::Policy => SKIP_VALIDATION_ANNOTATION,
        }
    }
}

// === impl Rules ===

impl Rules {
    /// Returns the configurations that must be scanned before `candidate` may
    /// be deleted, or `None` if deletion is allowed without a scan.
    pub fn scope<'c>(&self, candidate: &'c Candidate) -> Option<Scope<'c>> {
        let kind = candidate.kind()?;
        if candidate.is_bypassed(kind) {
            debug!(candidate = %candidate.id, "Deletion protection bypassed");
            return None;
        }

        match kind {
            Kind::Context | Kind::Policy => Some(Scope::Cluster),
            Kind::Namespace if self.namespace_protection => {
                Some(Scope::Namespace(&candidate.id.name))
            }
            Kind::Namespace => None,
        }
    }

    /// Lists the configurations depending on `candidate` as `namespace/name`,
    /// in the order they appear in `configurations`.
    pub fn dependents(&self, candidate: &Candidate, configurations: &[Configuration]) -> Vec<String> {
        let Some(kind) = candidate.kind() else {
            return Vec::new();
        };

        let name = candidate.id.name.as_str();
        configurations
            .iter()
            .filter(|config| match kind {
                Kind::Context => config.contexts().any(|c| c == name),
                Kind::Namespace => config.namespace().as_deref() == Some(name),
                Kind::Policy => config.default_policies().any(|p| p == name),
            })
            .map(|config| {
                format!(
                    "{}/{}",
                    config.namespace().unwrap_or_default(),
                    config.name_any()
                )
            })
            .collect()
    }

    /// Fails with [`Error::InUse`] if any configuration depends on
    /// `candidate`.
    pub fn check_deletable(
        &self,
        candidate: &Candidate,
        configurations: &[Configuration],
    ) -> Result<(), Error> {
        if self.scope(candidate).is_none() {
            return Ok(());
        }

        let dependents = self.dependents(candidate, configurations);
        if dependents.is_empty() {
            return Ok(());
        }

        Err(Error::InUse {
            kind: candidate.id.kind.clone(),
            name: candidate.id.name.clone(),
            dependents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::{btreemap, convert_args};
    use terranetes_policy_controller_k8s_api::{
        ConfigurationSpec, ContextSpec, ValueFromSource, DEFAULT_VARIABLES_ANNOTATION,
    };

    fn mk_config(ns: &str, name: &str, context: Option<&str>) -> Configuration {
        let mut config = Configuration::new(
            name,
            ConfigurationSpec {
                module: "https://github.com/appvia/terraform-aws-s3".to_string(),
                value_from: context.map(|c| {
                    vec![ValueFromSource {
                        context: Some(c.to_string()),
                        key: "vpc_id".to_string(),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            },
        );
        config.metadata.namespace = Some(ns.to_string());
        config
    }

    fn context_candidate(name: &str) -> Candidate {
        Candidate::of(&Context::new(name, ContextSpec::default()))
    }

    #[test]
    fn context_without_dependents() {
        let configs = vec![mk_config("default", "test-0", Some("other"))];
        let rules = Rules::default();
        assert!(rules
            .check_deletable(&context_candidate("shared"), &configs)
            .is_ok());
    }

    #[test]
    fn context_with_dependents() {
        let configs = vec![
            mk_config("default", "test-0", Some("shared")),
            mk_config("default", "unrelated", None),
            mk_config("default", "test-1", Some("shared")),
        ];

        let error = Rules::default()
            .check_deletable(&context_candidate("shared"), &configs)
            .unwrap_err();
        match &error {
            Error::InUse { dependents, .. } => {
                assert_eq!(
                    dependents,
                    &vec!["default/test-0".to_string(), "default/test-1".to_string()]
                );
            }
            error => panic!("unexpected error: {error}"),
        }
        assert!(
            error.to_string().ends_with("default/test-0, default/test-1"),
            "{error}"
        );
    }

    #[test]
    fn orphan_annotation_bypasses_scan() {
        let configs = vec![mk_config("default", "test-0", Some("shared"))];
        let candidate = context_candidate("shared").with_annotation(ORPHAN_ANNOTATION, "true");
        assert!(Rules::default().check_deletable(&candidate, &configs).is_ok());
        assert_eq!(Rules::default().scope(&candidate), None);
    }

    #[test]
    fn bypass_requires_literal_true() {
        let configs = vec![mk_config("default", "test-0", Some("shared"))];
        for value in ["True", "yes", "", "1"] {
            let candidate = context_candidate("shared").with_annotation(ORPHAN_ANNOTATION, value);
            assert!(
                Rules::default().check_deletable(&candidate, &configs).is_err(),
                "{value:?} must not bypass"
            );
        }
    }

    #[test]
    fn namespace_protection() {
        let configs = vec![
            mk_config("apps", "bucket", None),
            mk_config("other", "queue", None),
        ];
        let candidate = Candidate::new(Identity::new("Namespace", "", "apps"));

        assert!(Rules::default().check_deletable(&candidate, &configs).is_ok());

        let rules = Rules {
            namespace_protection: true,
        };
        assert_eq!(rules.scope(&candidate), Some(Scope::Namespace("apps")));
        let error = rules.check_deletable(&candidate, &configs).unwrap_err();
        assert!(error.to_string().contains("apps/bucket"), "{error}");
        assert!(!error.to_string().contains("other/queue"), "{error}");

        let candidate = candidate.with_annotation(SKIP_NAMESPACE_PROTECTION_ANNOTATION, "true");
        assert!(rules.check_deletable(&candidate, &configs).is_ok());
    }

    #[test]
    fn policy_referenced_by_default_variables() {
        let mut config = mk_config("apps", "bucket", None);
        config.metadata.annotations = Some(convert_args!(btreemap!(
            DEFAULT_VARIABLES_ANNOTATION => "tags, network",
        )));
        let configs = vec![config, mk_config("apps", "queue", None)];

        let candidate = Candidate::new(Identity::new("Policy", "", "network"));
        let error = Rules::default()
            .check_deletable(&candidate, &configs)
            .unwrap_err();
        assert!(error.to_string().contains("apps/bucket"), "{error}");

        let unused = Candidate::new(Identity::new("Policy", "", "net"));
        assert!(Rules::default().check_deletable(&unused, &configs).is_ok());

        let skipped = candidate.with_annotation(SKIP_VALIDATION_ANNOTATION, "true");
        assert!(Rules::default().check_deletable(&skipped, &configs).is_ok());
    }

    #[test]
    fn unknown_kinds_are_not_protected() {
        let configs = vec![mk_config("default", "test-0", Some("shared"))];
        let candidate = Candidate::new(Identity::new("Secret", "default", "shared"));
        assert_eq!(candidate.kind(), None);
        assert!(Rules::default().check_deletable(&candidate, &configs).is_ok());
    }
}
