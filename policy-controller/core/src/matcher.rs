use terranetes_policy_controller_k8s_api::labels::{Labels, Selector, SelectorError};

/// A predicate over an object's labels.
pub trait Matcher {
    /// Empty matchers select nothing.
    fn is_empty(&self) -> bool;

    fn matches(&self, labels: &Labels) -> Result<bool, SelectorError>;
}

impl Matcher for Selector {
    #[inline]
    fn is_empty(&self) -> bool {
        Selector::is_empty(self)
    }

    #[inline]
    fn matches(&self, labels: &Labels) -> Result<bool, SelectorError> {
        Selector::matches(self, labels)
    }
}
