use crate::Identity;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("weight must not be negative: {0}")]
pub struct InvalidWeight(pub i64);

/// Accumulates weights for candidates so that the most specific ones can be
/// chosen.
///
/// Entries are keyed by [`Identity`]. Adding an identity that is already
/// present sums the weight into the existing entry, saturating at
/// `i64::MAX`; the object first registered for that identity is retained.
#[derive(Clone, Debug)]
pub struct WeightedSelector<T> {
    entries: Vec<Entry<T>>,
}

#[derive(Clone, Debug)]
struct Entry<T> {
    id: Identity,
    object: T,
    weight: i64,
}

// === impl WeightedSelector ===

impl<T> Default for WeightedSelector<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> WeightedSelector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: Identity, object: T, weight: i64) -> Result<(), InvalidWeight> {
        if weight < 0 {
            return Err(InvalidWeight(weight));
        }

        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => entry.weight = entry.weight.saturating_add(weight),
            None => self.entries.push(Entry { id, object, weight }),
        }
        Ok(())
    }

    /// The highest cumulative weight, or zero if nothing has been added.
    pub fn max(&self) -> i64 {
        self.entries.iter().map(|e| e.weight).max().unwrap_or(0)
    }

    /// All objects sharing the highest weight, in insertion order.
    pub fn highest(&self) -> Vec<&T> {
        let max = self.max();
        self.entries
            .iter()
            .filter(|e| e.weight == max)
            .map(|e| &e.object)
            .collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn weight(&self, id: &Identity) -> Option<i64> {
        self.entries.iter().find(|e| e.id == *id).map(|e| e.weight)
    }
}
