use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A terraform module instantiated within a namespace.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "terraform.appvia.io",
    version = "v1alpha1",
    kind = "Configuration",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSpec {
    /// The module source, e.g. a git reference, a registry address or a
    /// local path.
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<ProviderReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<Vec<ValueFromSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Sources a variable from a context or a secret.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueFromSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

// === impl Configuration ===

impl Configuration {
    /// Names of the contexts referenced by `valueFrom`, in declaration order.
    pub fn contexts(&self) -> impl Iterator<Item = &str> {
        self.spec
            .value_from
            .iter()
            .flatten()
            .filter_map(|v| v.context.as_deref())
    }

    /// Policies whose default variables were injected into this
    /// configuration, as recorded in the defaults annotation.
    pub fn default_policies(&self) -> impl Iterator<Item = &str> {
        self.annotations()
            .get(super::DEFAULT_VARIABLES_ANNOTATION)
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::{btreemap, convert_args};

    #[test]
    fn default_policies_are_trimmed() {
        let mut config = Configuration::new("bucket", ConfigurationSpec::default());
        config.metadata.annotations = Some(convert_args!(btreemap!(
            super::super::DEFAULT_VARIABLES_ANNOTATION => " defaults , tags,,",
        )));

        assert_eq!(
            config.default_policies().collect::<Vec<_>>(),
            vec!["defaults", "tags"]
        );
    }

    #[test]
    fn contexts_skip_secrets() {
        let config = Configuration::new(
            "bucket",
            ConfigurationSpec {
                module: "https://github.com/appvia/terraform-aws-s3".to_string(),
                value_from: Some(vec![
                    ValueFromSource {
                        context: Some("shared".to_string()),
                        key: "vpc_id".to_string(),
                        ..Default::default()
                    },
                    ValueFromSource {
                        secret: Some("creds".to_string()),
                        key: "token".to_string(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            },
        );

        assert_eq!(config.contexts().collect::<Vec<_>>(), vec!["shared"]);
    }
}
