//! Label sets that partition a metric into time series.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Label key for the request method dimension.
pub const METHOD: &str = "method";

/// Label key for the request endpoint dimension.
pub const ENDPOINT: &str = "endpoint";

/// Label key for the HTTP response status code.
pub const CODE: &str = "code";

/// Label key for the matched route template.
pub const ROUTE: &str = "route";

/// An ordered set of `key = value` labels.
///
/// Keys are kept sorted, so two sets built in a different insertion order
/// compare and hash equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Create an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels for a request counter: `method` and `endpoint`.
    pub fn request(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new().with(METHOD, method).with(ENDPOINT, endpoint)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a label.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Label keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert into labels understood by the `metrics` facade.
    pub(crate) fn to_metrics_labels(&self) -> Vec<metrics::Label> {
        self.0
            .iter()
            .map(|(k, v)| metrics::Label::new(k.clone(), v.clone()))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}=\"{}\"", k, v)?;
        }
        write!(f, "}}")
    }
}
