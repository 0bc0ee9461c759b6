#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod configuration;
pub mod context;
pub mod labels;
pub mod policy;

pub use self::{
    configuration::{Configuration, ConfigurationSpec, ProviderReference, ValueFromSource},
    context::{Context, ContextSpec, ContextVariable},
    labels::Labels,
    policy::{ModuleConstraint, Policy, PolicyConstraint, PolicySpec},
};
pub use k8s_openapi::{
    api::{self, core::v1::Namespace},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
pub use kube::{Resource, ResourceExt};

/// Comma-separated names of the policies whose default variables were applied
/// to a configuration.
pub const DEFAULT_VARIABLES_ANNOTATION: &str = "terraform.appvia.io/defaults";

/// Permits deleting a context that is still referenced by configurations.
pub const ORPHAN_ANNOTATION: &str = "terraform.appvia.io/orphan";

/// Permits deleting a namespace that still contains configurations.
pub const SKIP_NAMESPACE_PROTECTION_ANNOTATION: &str =
    "terraform.appvia.io/skip-namespace-protection";

/// Permits deleting a policy whose defaults are still applied to configurations.
pub const SKIP_VALIDATION_ANNOTATION: &str = "terraform.appvia.io/skip-validation";
