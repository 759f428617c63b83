//! Equality-based label selectors.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A set of `key=value` constraints; an object matches when every pair is present
/// in its labels with the same value. The empty selector matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelSelector {
    pairs: SmallVec<[(String, String); 4]>,
}

impl LabelSelector {
    pub fn new() -> Self { Self::default() }

    /// Add (or overwrite) one constraint.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    pub fn is_empty(&self) -> bool { self.pairs.is_empty() }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        if self.pairs.is_empty() { return true; }
        let Some(labels) = labels else { return false };
        self.pairs.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSelector {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(LabelSelector::new(), |sel, (k, v)| sel.with(k, v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("selector term `{0}` is not of the form key=value")]
    MissingEquals(String),
    #[error("selector term `{0}` has an empty key")]
    EmptyKey(String),
}

impl FromStr for LabelSelector {
    type Err = SelectorError;

    /// Parses `app=web,tier=frontend`; `==` is accepted as a synonym for `=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sel = LabelSelector::new();
        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (k, v) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
                .ok_or_else(|| SelectorError::MissingEquals(term.to_string()))?;
            let k = k.trim();
            if k.is_empty() { return Err(SelectorError::EmptyKey(term.to_string())); }
            sel = sel.with(k, v.trim());
        }
        Ok(sel)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 { f.write_str(",")?; }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}
