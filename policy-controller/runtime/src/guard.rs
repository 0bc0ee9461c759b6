use crate::{
    core::integrity::{Candidate, Rules, Scope},
    lister::Lister,
};
use anyhow::{anyhow, Result};
use tokio::time;
use tracing::debug;

/// A check that must pass before an object may be deleted.
#[async_trait::async_trait]
pub trait PreconditionGuard {
    async fn check(&self, candidate: &Candidate) -> Result<()>;
}

/// Refuses to delete contexts, namespaces and policies that configurations
/// still depend on.
///
/// Listing is bounded by `timeout`. A listing that fails or times out denies
/// the deletion.
#[derive(Clone, Debug)]
pub struct ReferentialIntegrityGuard<L> {
    lister: L,
    rules: Rules,
    timeout: time::Duration,
}

// === impl ReferentialIntegrityGuard ===

impl<L> ReferentialIntegrityGuard<L> {
    pub fn new(lister: L, rules: Rules, timeout: time::Duration) -> Self {
        Self {
            lister,
            rules,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl<L: Lister> PreconditionGuard for ReferentialIntegrityGuard<L> {
    async fn check(&self, candidate: &Candidate) -> Result<()> {
        let namespace = match self.rules.scope(candidate) {
            None => return Ok(()),
            Some(Scope::Cluster) => None,
            Some(Scope::Namespace(ns)) => Some(ns),
        };

        let configurations = time::timeout(self.timeout, self.lister.configurations(namespace))
            .await
            .map_err(|_| {
                anyhow!(
                    "timed out after {:?} listing configurations for {}",
                    self.timeout,
                    candidate.id
                )
            })??;
        debug!(candidate = %candidate.id, configurations = configurations.len(), "Scanning dependents");

        self.rules.check_deletable(candidate, &configurations)?;
        Ok(())
    }
}
