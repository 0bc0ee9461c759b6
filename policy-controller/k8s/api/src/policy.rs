use super::labels::Selector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Governs the configurations admitted into the cluster.
///
/// A policy may carry a security constraint, evaluated by checkov against the
/// configurations it selects, and a module constraint restricting the module
/// sources a configuration may reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "terraform.appvia.io", version = "v1alpha1", kind = "Policy")]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkov: Option<PolicyConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<ModuleConstraint>,
}

/// A checkov ruleset applied to the configurations selected by the policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_checks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frameworks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<Vec<ExternalCheck>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<PolicySelector>,
}

/// A source of custom checkov checks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCheck {
    pub name: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicySelector {
    /// Matched against the labels of the configuration's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Selector>,
    /// Matched against the labels of the configuration itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Selector>,
}

/// Restricts the module sources a configuration may use.
///
/// Patterns are regular expressions searched within the module source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConstraint {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied: Option<Vec<String>>,
}

// === impl Policy ===

impl Policy {
    pub fn checkov(&self) -> Option<&PolicyConstraint> {
        self.spec.constraints.as_ref()?.checkov.as_ref()
    }

    pub fn modules(&self) -> Option<&ModuleConstraint> {
        self.spec.constraints.as_ref()?.modules.as_ref()
    }
}

// === impl PolicyConstraint ===

impl PolicyConstraint {
    pub fn namespace_selector(&self) -> Option<&Selector> {
        self.selector.as_ref()?.namespace.as_ref()
    }

    pub fn resource_selector(&self) -> Option<&Selector> {
        self.selector.as_ref()?.resource.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_constraints() {
        let policy: Policy = serde_json::from_value(serde_json::json!({
            "apiVersion": "terraform.appvia.io/v1alpha1",
            "kind": "Policy",
            "metadata": { "name": "security" },
            "spec": {
                "constraints": {
                    "checkov": {
                        "skipChecks": ["CKV_AWS_1"],
                        "selector": {
                            "namespace": { "matchLabels": { "env": "prod" } },
                        },
                    },
                    "modules": {
                        "allowed": ["^https://github.com/appvia/.*"],
                    },
                },
            },
        }))
        .expect("policy must deserialize");

        let checkov = policy.checkov().expect("checkov constraint");
        assert_eq!(checkov.skip_checks, Some(vec!["CKV_AWS_1".to_string()]));
        assert!(checkov.namespace_selector().is_some());
        assert!(checkov.resource_selector().is_none());
        assert_eq!(
            policy.modules().map(|m| m.allowed.len()),
            Some(1),
            "module patterns"
        );
    }
}
