use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct AdmissionMetrics {
    reviews: Family<ReviewLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReviewLabels {
    kind: String,
    operation: String,
    outcome: &'static str,
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reviews = Family::default();
        prom.register(
            "reviews",
            "Count of admission reviews by resource kind, operation and outcome",
            reviews.clone(),
        );

        Self { reviews }
    }

    pub(crate) fn observe(&self, kind: &str, operation: &str, allowed: bool) {
        self.reviews
            .get_or_create(&ReviewLabels {
                kind: kind.to_string(),
                operation: operation.to_string(),
                outcome: if allowed { "allowed" } else { "denied" },
            })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn count(&self, kind: &str, operation: &str, allowed: bool) -> u64 {
        self.reviews
            .get_or_create(&ReviewLabels {
                kind: kind.to_string(),
                operation: operation.to_string(),
                outcome: if allowed { "allowed" } else { "denied" },
            })
            .get()
    }
}
