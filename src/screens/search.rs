use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::warn;

use crate::fetch::{Fetch, FetchState};
use crate::tmdb::{Movie, TmdbApi};
use crate::trending::Trending;

#[derive(Clone)]
pub struct SearchScreen {
    results: Fetch<Vec<Movie>>,
    query: Arc<RwLock<String>>,
    trending: Trending,
    // One search at a time: a hit is recorded against the movie its own
    // query returned.
    running: Arc<Mutex<()>>,
}

impl SearchScreen {
    pub fn new(tmdb: Arc<dyn TmdbApi>, trending: Trending) -> Self {
        let query = Arc::new(RwLock::new(String::new()));
        let current = query.clone();
        let results = Fetch::new(
            move || {
                let tmdb = tmdb.clone();
                let query = current.read().map(|q| q.clone()).unwrap_or_default();
                async move { tmdb.fetch_movies(&query, None).await }
            },
            false,
        );
        Self {
            results,
            query,
            trending,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Runs the search. A blank query clears the results instead. When the
    /// search returns movies, the query is counted as a trending hit for the
    /// first result; a failed count is logged and does not fail the search.
    /// Concurrent calls run one after another.
    pub async fn search(&self, query: &str) -> FetchState<Vec<Movie>> {
        let _running = self.running.lock().await;
        if let Ok(mut q) = self.query.write() {
            *q = query.to_string();
        }
        if query.trim().is_empty() {
            self.results.reset();
            return self.results.state();
        }

        self.results.refetch().await;
        let state = self.results.state();
        if let Some(first) = state.data.as_ref().and_then(|movies| movies.first()) {
            if let Err(e) = self.trending.record_search_hit(query, first).await {
                warn!("Failed to record trending hit for '{}': {}", query, e);
            }
        }
        state
    }

    pub fn results(&self) -> FetchState<Vec<Movie>> {
        self.results.state()
    }
}
