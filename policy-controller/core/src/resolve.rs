//! Selects the security policy that applies to a configuration.
//!
//! Policies carrying a checkov constraint are ranked by how specifically they
//! target the configuration:
//!
//! - a policy without selectors applies everywhere, at weight 0;
//! - a matching namespace selector adds 10;
//! - a matching resource selector adds 20.
//!
//! A policy whose selector does not match is not a candidate at all. When more
//! than one candidate shares the highest weight the configuration cannot be
//! processed until the policies are disambiguated.

use crate::{Error, Identity, Matcher, WeightedSelector};
use terranetes_policy_controller_k8s_api::{
    labels::Labels, Configuration, Namespace, Policy, PolicyConstraint, ResourceExt,
};
use tracing::{debug, trace};

pub const NAMESPACE_WEIGHT: i64 = 10;
pub const RESOURCE_WEIGHT: i64 = 20;

/// Returns the checkov constraint of the policy applying to `configuration`,
/// if any.
pub fn resolve<'p>(
    configuration: &Configuration,
    namespace: &Namespace,
    policies: &'p [Policy],
) -> Result<Option<&'p PolicyConstraint>, Error> {
    let policy = resolve_policy(configuration, namespace, policies)?;
    Ok(policy.and_then(Policy::checkov))
}

/// Returns the policy applying to `configuration`, if any.
pub fn resolve_policy<'p>(
    configuration: &Configuration,
    namespace: &Namespace,
    policies: &'p [Policy],
) -> Result<Option<&'p Policy>, Error> {
    if policies.is_empty() {
        return Ok(None);
    }

    let ns_labels = Labels::from(namespace.labels());
    let labels = Labels::from(configuration.labels());

    let mut candidates = WeightedSelector::new();
    for policy in policies {
        let Some(constraint) = policy.checkov() else {
            continue;
        };

        let mut weight = 0;
        if let Some(selector) = constraint.namespace_selector() {
            if !selects(policy, "namespace", selector, &ns_labels)? {
                continue;
            }
            weight += NAMESPACE_WEIGHT;
        }
        if let Some(selector) = constraint.resource_selector() {
            if !selects(policy, "resource", selector, &labels)? {
                continue;
            }
            weight += RESOURCE_WEIGHT;
        }

        trace!(policy = %policy.name_any(), weight, "Candidate policy");
        candidates.add(Identity::of(policy), policy, weight)?;
    }

    match candidates.highest().as_slice() {
        [] => Ok(None),
        [policy] => {
            debug!(
                configuration = %Identity::of(configuration),
                policy = %policy.name_any(),
                weight = candidates.max(),
                "Resolved policy",
            );
            Ok(Some(*policy))
        }
        tied => Err(Error::AmbiguousPolicy {
            configuration: format!(
                "{}/{}",
                configuration.namespace().unwrap_or_default(),
                configuration.name_any()
            ),
            policies: tied.iter().map(|p| p.name_any()).collect(),
        }),
    }
}

fn selects(
    policy: &Policy,
    scope: &'static str,
    selector: &impl Matcher,
    labels: &Labels,
) -> Result<bool, Error> {
    let matched = selector
        .matches(labels)
        .map_err(|error| Error::SelectorEvaluation {
            policy: policy.name_any(),
            scope,
            error,
        })?;
    if !matched {
        trace!(
            policy = %policy.name_any(),
            scope,
            empty = selector.is_empty(),
            "Selector does not match"
        );
    }
    Ok(matched)
}
