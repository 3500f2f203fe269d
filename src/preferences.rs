//! The per-user preferences document.
//!
//! The account service stores preferences as a free-form JSON object. Two keys
//! are recognized here, `genres` and `favorites`; everything else is carried
//! through untouched so that writes never drop keys written by other clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const GENRES_KEY: &str = "genres";
pub const FAVORITES_KEY: &str = "favorites";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(Map<String, Value>);

impl Preferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partial document that replaces the `genres` key.
    pub fn with_genres<I, S>(genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut prefs = Self::new();
        prefs.set_genres(genres);
        prefs
    }

    /// Partial document that replaces the `favorites` key. Duplicates are
    /// dropped, first occurrence wins.
    pub fn with_favorites<I, S>(favorites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut prefs = Self::new();
        prefs.set_favorites(favorites);
        prefs
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn genres(&self) -> Vec<String> {
        string_list(self.0.get(GENRES_KEY))
    }

    pub fn favorites(&self) -> Vec<String> {
        string_list(self.0.get(FAVORITES_KEY))
    }

    pub fn set_genres<I, S>(&mut self, genres: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = genres
            .into_iter()
            .map(|g| Value::String(g.into()))
            .collect();
        self.0.insert(GENRES_KEY.to_string(), Value::Array(list));
    }

    pub fn set_favorites<I, S>(&mut self, favorites: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = favorites
            .into_iter()
            .map(|id| Value::String(id.into()))
            .collect();
        self.0
            .insert(FAVORITES_KEY.to_string(), dedup_list(Value::Array(list)));
    }

    /// Shallow merge: every top-level key in `partial` replaces the key here.
    /// Nested values are not merged. A merged `favorites` list is de-duplicated.
    pub fn merge(&mut self, partial: Preferences) {
        for (key, value) in partial.0 {
            let value = if key == FAVORITES_KEY {
                dedup_list(value)
            } else {
                value
            };
            self.0.insert(key, value);
        }
    }

    pub fn merged(mut self, partial: Preferences) -> Self {
        self.merge(partial);
        self
    }
}

// First occurrence wins; `155` and `"155"` count as the same id. Non-array
// values pass through unchanged.
fn dedup_list(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut seen: Vec<String> = Vec::with_capacity(items.len());
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                let key = match &item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if !seen.contains(&key) {
                    seen.push(key);
                    kept.push(item);
                }
            }
            Value::Array(kept)
        }
        other => other,
    }
}

// Non-string entries are skipped; other clients may have written numbers.
fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
