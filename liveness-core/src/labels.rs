//! Direction label table.
//!
//! Maps wire direction tokens to the text shown to the user. Hosts
//! replace individual entries to localise the prompts; tokens without an
//! entry are shown verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::Direction;

/// Token → display text lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable {
    entries: BTreeMap<String, String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        let entries = Direction::ALL
            .into_iter()
            .map(|d| (d.as_token().to_string(), default_label(d).to_string()))
            .collect();
        Self { entries }
    }
}

fn default_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Center => "Look at the camera",
        Direction::Left => "Turn head LEFT",
        Direction::Right => "Turn head RIGHT",
        Direction::Up => "Look UP",
        Direction::Down => "Look DOWN",
    }
}

impl LabelTable {
    /// A table with no entries; every token renders verbatim.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Replace the entries named in `overrides`, keeping the rest.
    pub fn merge<I, K, V>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (token, text) in overrides {
            self.entries.insert(token.into(), text.into());
        }
    }

    /// Builder form of [`merge`](Self::merge).
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.merge(overrides);
        self
    }

    /// Display text for `token`, or the token itself when unmapped.
    pub fn label<'a>(&'a self, token: &'a str) -> &'a str {
        self.entries.get(token).map(String::as_str).unwrap_or(token)
    }

    /// Display text for a known direction.
    pub fn direction(&self, direction: Direction) -> &str {
        self.label(direction.as_token())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
