use crate::weighted::InvalidWeight;
use terranetes_policy_controller_k8s_api::labels::SelectorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Two or more policies are equally specific for a configuration.
    #[error(
        "multiple policies match configuration {configuration}: {}",
        .policies.join(", ")
    )]
    AmbiguousPolicy {
        configuration: String,
        policies: Vec<String>,
    },

    /// The object is still referenced and may not be deleted.
    #[error("{kind} {name} is in use by: {}", .dependents.join(", "))]
    InUse {
        kind: String,
        name: String,
        dependents: Vec<String>,
    },

    #[error(
        "module source {module:?} is not permitted by policies: {}",
        .checked.join(", ")
    )]
    NotPermitted { module: String, checked: Vec<String> },

    #[error("policy {policy} has an invalid {scope} selector: {error}")]
    SelectorEvaluation {
        policy: String,
        scope: &'static str,
        #[source]
        error: SelectorError,
    },

    #[error("policy {policy} has an invalid module pattern {pattern:?}: {error}")]
    InvalidPattern {
        policy: String,
        pattern: String,
        #[source]
        error: regex::Error,
    },

    #[error(transparent)]
    InvalidWeight(#[from] InvalidWeight),
}
