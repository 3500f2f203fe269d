use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::tmdb::{self, Movie};

pub const DEFAULT_TOP: usize = 5;

/// A persisted search counter. `last_hit` is the document's update time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingEntry {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "searchTerm")]
    pub search_term: String,
    pub movie_id: i64,
    pub count: u64,
    pub title: String,
    #[serde(default)]
    pub poster_url: String,
    #[serde(rename = "$updatedAt", default)]
    pub last_hit: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTrendingEntry {
    #[serde(rename = "searchTerm")]
    pub search_term: String,
    pub movie_id: i64,
    pub count: u64,
    pub title: String,
    pub poster_url: String,
}

#[async_trait]
pub trait TrendingStore: Send + Sync {
    async fn find_by_term(&self, term: &str) -> Result<Option<TrendingEntry>>;
    async fn create(&self, entry: &NewTrendingEntry) -> Result<TrendingEntry>;
    async fn set_count(&self, id: &str, count: u64) -> Result<TrendingEntry>;
    /// Up to `limit` entries, highest count first, most recent hit first
    /// among equal counts.
    async fn top(&self, limit: usize) -> Result<Vec<TrendingEntry>>;
}

#[derive(Clone)]
pub struct Trending {
    store: Arc<dyn TrendingStore>,
}

impl Trending {
    pub fn new(store: Arc<dyn TrendingStore>) -> Self {
        Self { store }
    }

    /// Counts one search for `term`, creating its record on first use.
    ///
    /// Terms are matched exactly: no case folding, no trimming. The increment
    /// is read-then-write, so two sessions bumping the same term at once can
    /// lose one hit.
    pub async fn record_search_hit(&self, term: &str, movie: &Movie) -> Result<TrendingEntry> {
        match self.store.find_by_term(term).await? {
            Some(existing) => {
                let count = existing.count + 1;
                debug!(term = %term, count, "Incrementing trending counter");
                self.store.set_count(&existing.id, count).await
            }
            None => {
                info!("New trending term '{}' -> '{}'", term, movie.title);
                let entry = NewTrendingEntry {
                    search_term: term.to_string(),
                    movie_id: movie.id,
                    count: 1,
                    title: movie.title.clone(),
                    poster_url: tmdb::poster_url(movie.poster_path.as_deref())
                        .unwrap_or_default(),
                };
                self.store.create(&entry).await
            }
        }
    }

    pub async fn top(&self, n: usize) -> Result<Vec<TrendingEntry>> {
        let mut entries = self.store.top(n).await?;
        rank(&mut entries);
        entries.truncate(n);
        Ok(entries)
    }
}

/// Count descending, then most recent hit, then term.
pub fn rank(entries: &mut [TrendingEntry]) {
    entries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| match (&a.last_hit, &b.last_hit) {
                (Some(x), Some(y)) => y.cmp(x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.search_term.cmp(&b.search_term))
    });
}
