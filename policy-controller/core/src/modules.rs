//! Decides whether a configuration may use a module source.

use crate::Error;
use regex::Regex;
use terranetes_policy_controller_k8s_api::{ModuleConstraint, Policy, ResourceExt};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Local modules (paths starting with `/` or `.`) are not subject to module
    /// constraints.
    Local,

    /// No policy constrains module sources.
    Unconstrained,

    /// The named policy is the first to permit the source.
    Permitted { policy: String },

    /// No policy permits the source.
    Denied { checked: Vec<String> },
}

// === impl Decision ===

impl Decision {
    pub fn is_permitted(&self) -> bool {
        !matches!(self, Self::Denied { .. })
    }

    pub fn policy(&self) -> Option<&str> {
        match self {
            Self::Permitted { policy } => Some(policy),
            _ => None,
        }
    }

    /// Converts a denial into a [`Error::NotPermitted`].
    pub fn into_result(self, module: &str) -> Result<Self, Error> {
        match self {
            Self::Denied { checked } => Err(Error::NotPermitted {
                module: module.to_string(),
                checked,
            }),
            decision => Ok(decision),
        }
    }
}

pub fn is_local(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.')
}

/// Evaluates `source` against the module constraints of `policies`, in order.
pub fn is_permitted(source: &str, policies: &[Policy]) -> Result<Decision, Error> {
    if is_local(source) {
        debug!(%source, "Local module source bypasses module constraints");
        return Ok(Decision::Local);
    }

    let mut checked = Vec::new();
    for policy in policies {
        let Some(constraint) = policy.modules() else {
            continue;
        };

        let name = policy.name_any();
        if permits(&name, constraint, source)? {
            debug!(%source, policy = %name, "Module source permitted");
            return Ok(Decision::Permitted { policy: name });
        }
        checked.push(name);
    }

    if checked.is_empty() {
        warn!(%source, "No module constraints defined, permitting all sources");
        return Ok(Decision::Unconstrained);
    }

    debug!(%source, policies = ?checked, "Module source not permitted");
    Ok(Decision::Denied { checked })
}

/// Checks that every pattern of the policy's module constraint compiles.
pub fn validate(policy: &Policy) -> Result<(), Error> {
    if let Some(constraint) = policy.modules() {
        let name = policy.name_any();
        for pattern in constraint.allowed.iter().chain(constraint.denied.iter().flatten()) {
            compile(&name, pattern)?;
        }
    }
    Ok(())
}

fn permits(policy: &str, constraint: &ModuleConstraint, source: &str) -> Result<bool, Error> {
    for pattern in constraint.denied.iter().flatten() {
        if compile(policy, pattern)?.is_match(source) {
            return Ok(false);
        }
    }

    for pattern in constraint.allowed.iter() {
        if compile(policy, pattern)?.is_match(source) {
            return Ok(true);
        }
    }

    Ok(false)
}

fn compile(policy: &str, pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern).map_err(|error| Error::InvalidPattern {
        policy: policy.to_string(),
        pattern: pattern.to_string(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::{
        io,
        sync::{Arc, Mutex},
    };
    use terranetes_policy_controller_k8s_api::{policy::Constraints, PolicySpec};

    fn mk_policy(name: &str, allowed: &[&str], denied: &[&str]) -> Policy {
        Policy::new(
            name,
            PolicySpec {
                constraints: Some(Constraints {
                    checkov: None,
                    modules: Some(ModuleConstraint {
                        allowed: allowed.iter().map(|s| s.to_string()).collect(),
                        denied: if denied.is_empty() {
                            None
                        } else {
                            Some(denied.iter().map(|s| s.to_string()).collect())
                        },
                    }),
                }),
                ..Default::default()
            },
        )
    }

    fn policies() -> Vec<Policy> {
        vec![
            Policy::new("unrelated", PolicySpec::default()),
            mk_policy("appvia", &["^https://github.com/appvia/"], &[]),
            mk_policy("registry", &["^registry.terraform.io/"], &["/deprecated/"]),
            mk_policy("everything", &[".*"], &[]),
        ]
    }

    #[rstest]
    #[case("./modules/bucket", Decision::Local)]
    #[case("/tmp/module", Decision::Local)]
    #[case(
        "https://github.com/appvia/terraform-aws-s3",
        Decision::Permitted { policy: "appvia".to_string() }
    )]
    #[case(
        "registry.terraform.io/hashicorp/vpc",
        Decision::Permitted { policy: "registry".to_string() }
    )]
    #[case(
        "registry.terraform.io/deprecated/vpc",
        Decision::Permitted { policy: "everything".to_string() }
    )]
    fn first_permitting_policy_wins(#[case] source: &str, #[case] expected: Decision) {
        assert_eq!(is_permitted(source, &policies()).unwrap(), expected);
    }

    #[test]
    fn denied_lists_checked_policies() {
        let policies = vec![
            mk_policy("appvia", &["^https://github.com/appvia/"], &[]),
            mk_policy("registry", &["^registry.terraform.io/"], &[]),
        ];

        let decision = is_permitted("git::https://example.com/module.git", &policies).unwrap();
        assert!(!decision.is_permitted());
        assert_eq!(
            decision,
            Decision::Denied {
                checked: vec!["appvia".to_string(), "registry".to_string()]
            }
        );

        let error = decision
            .into_result("git::https://example.com/module.git")
            .unwrap_err();
        assert!(error.to_string().contains("appvia, registry"), "{error}");
    }

    #[test]
    fn unconstrained_without_module_policies() {
        let policies = vec![Policy::new("unrelated", PolicySpec::default())];
        let decision = is_permitted("https://example.com/module", &policies).unwrap();
        assert_eq!(decision, Decision::Unconstrained);
        assert!(decision.is_permitted());
        assert_eq!(decision.policy(), None);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unconstrained_sources_are_logged_as_warnings() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let policies = vec![Policy::new("unrelated", PolicySpec::default())];
        let decision = tracing::subscriber::with_default(subscriber, || {
            is_permitted("https://example.com/module", &policies)
        })
        .unwrap();
        assert_eq!(decision, Decision::Unconstrained);

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("permitting all sources"), "{logs}");
    }

    #[test]
    fn local_sources_bypass_denials() {
        let policies = vec![mk_policy("nothing", &[], &[".*"])];
        assert_eq!(
            is_permitted("./local", &policies).unwrap(),
            Decision::Local
        );
        assert!(!is_permitted("https://example.com", &policies)
            .unwrap()
            .is_permitted());
    }

    #[test]
    fn invalid_pattern() {
        let policy = mk_policy("broken", &["(unclosed"], &[]);
        assert!(matches!(
            validate(&policy),
            Err(Error::InvalidPattern { .. })
        ));
        assert!(is_permitted("https://example.com", &[policy]).is_err());
    }
}
