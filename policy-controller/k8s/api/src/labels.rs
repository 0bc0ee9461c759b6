use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use thiserror::Error;

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Expression {
    pub key: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeSet<String>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("label selector expression has an empty key")]
    EmptyKey,

    #[error("operator {operator:?} on key {key:?} requires at least one value")]
    MissingValues { key: String, operator: Operator },

    #[error("operator {operator:?} on key {key:?} must not specify values")]
    UnexpectedValues { key: String, operator: Operator },
}

/// Scopes a policy to namespaces or resources by their labels.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_labels: Option<Map>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_expressions: Option<Expressions>,
}

// === Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// A selector without labels or expressions. Empty selectors never match.
    pub fn is_empty(&self) -> bool {
        self.match_labels.as_ref().map_or(true, |m| m.is_empty())
            && self.match_expressions.as_ref().map_or(true, |e| e.is_empty())
    }

    /// Checks that every expression is well-formed.
    pub fn validate(&self) -> Result<(), SelectorError> {
        for expr in self.match_expressions.iter().flatten() {
            expr.validate()?;
        }
        Ok(())
    }

    pub fn matches(&self, labels: &Labels) -> Result<bool, SelectorError> {
        self.validate()?;

        if self.is_empty() {
            return Ok(false);
        }

        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels.as_ref()) {
                return Ok(false);
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.0.get(k) != Some(v) {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === Labels ===

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<&Map> for Labels {
    #[inline]
    fn from(labels: &Map) -> Self {
        Self(Arc::new(labels.clone()))
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === Expression ===

impl Expression {
    pub fn new<I>(key: impl Into<String>, operator: Operator, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        Self {
            key: key.into(),
            operator,
            values: if values.is_empty() {
                None
            } else {
                Some(values)
            },
        }
    }

    fn validate(&self) -> Result<(), SelectorError> {
        if self.key.is_empty() {
            return Err(SelectorError::EmptyKey);
        }

        let has_values = self.values.as_ref().map_or(false, |v| !v.is_empty());
        match self.operator {
            Operator::In | Operator::NotIn if !has_values => Err(SelectorError::MissingValues {
                key: self.key.clone(),
                operator: self.operator,
            }),
            Operator::Exists | Operator::DoesNotExist if has_values => {
                Err(SelectorError::UnexpectedValues {
                    key: self.key.clone(),
                    operator: self.operator,
                })
            }
            _ => Ok(()),
        }
    }

    fn matches(&self, labels: &Map) -> bool {
        let contains = |v: &String| self.values.as_ref().map_or(false, |vs| vs.contains(v));
        match self.operator {
            Operator::In => labels.get(&self.key).map_or(false, contains),
            Operator::NotIn => !labels.get(&self.key).map_or(false, contains),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (
                Selector::default(),
                Labels::from_iter(Some(("foo", "bar"))),
                false,
                "empty selector never matches",
            ),
            (
                Selector::from_map(Map::new()),
                Labels::default(),
                false,
                "empty match labels never match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "bar"))),
                true,
                "exact label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "baz"))),
                false,
                "label value mismatch",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::In, ["bar"]))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "in expression match",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::In, ["bar"]))),
                Labels::from_iter(Some(("bah", "baz"))),
                false,
                "in expression on missing key",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, ["bar"]))),
                Labels::from_iter(Some(("foo", "bar"))),
                false,
                "not-in expression excludes value",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, ["bar"]))),
                Labels::default(),
                true,
                "not-in expression on missing key",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::Exists,
                    None::<String>,
                ))),
                Labels::from_iter(Some(("foo", "anything"))),
                true,
                "exists expression",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::DoesNotExist,
                    None::<String>,
                ))),
                Labels::from_iter(Some(("foo", "anything"))),
                false,
                "does-not-exist expression",
            ),
        ] {
            assert_eq!(selector.matches(labels), Ok(*matches), "{}", msg);
        }
    }

    #[test]
    fn malformed_expressions() {
        let missing = Selector::from_iter(Some(Expression::new(
            "env",
            Operator::In,
            None::<String>,
        )));
        assert_eq!(
            missing.matches(&Labels::default()),
            Err(SelectorError::MissingValues {
                key: "env".to_string(),
                operator: Operator::In,
            })
        );

        let unexpected = Selector::from_iter(Some(Expression::new("env", Operator::Exists, ["x"])));
        assert!(matches!(
            unexpected.validate(),
            Err(SelectorError::UnexpectedValues { .. })
        ));

        let empty_key = Selector::from_iter(Some(Expression::new("", Operator::In, ["x"])));
        assert_eq!(empty_key.validate(), Err(SelectorError::EmptyKey));
    }

    #[test]
    fn deserializes_kubernetes_selector() {
        let selector: Selector = serde_json::from_value(serde_json::json!({
            "matchLabels": { "team": "platform" },
            "matchExpressions": [
                { "key": "env", "operator": "In", "values": ["prod", "staging"] },
                { "key": "legacy", "operator": "DoesNotExist" },
            ],
        }))
        .expect("selector must deserialize");

        let labels = Labels::from_iter(vec![("team", "platform"), ("env", "prod")]);
        assert_eq!(selector.matches(&labels), Ok(true));

        let labels = Labels::from_iter(vec![("team", "platform"), ("env", "dev")]);
        assert_eq!(selector.matches(&labels), Ok(false));
    }
}
