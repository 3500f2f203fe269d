use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::account::Accounts;
use crate::error::{Error, Result};
use crate::tmdb::{MovieDetails, TmdbApi};

/// The signed-in user's favorite movies.
#[derive(Clone)]
pub struct SavedScreen {
    tmdb: Arc<dyn TmdbApi>,
    accounts: Accounts,
}

impl SavedScreen {
    pub fn new(tmdb: Arc<dyn TmdbApi>, accounts: Accounts) -> Self {
        Self { tmdb, accounts }
    }

    /// Fetches details for every favorite id concurrently, keeping the stored
    /// order. Ids that fail to parse or fetch are skipped.
    pub async fn load(&self) -> Result<Vec<MovieDetails>> {
        if self.accounts.current_user().await.is_none() {
            return Err(Error::Auth("Please login to view favorites".to_string()));
        }
        let favorite_ids = self.accounts.preferences().await.favorites();

        let mut tasks = JoinSet::new();
        for (position, raw_id) in favorite_ids.into_iter().enumerate() {
            let Ok(id) = raw_id.trim().parse::<i64>() else {
                warn!("Skipping malformed favorite id '{}'", raw_id);
                continue;
            };
            let tmdb = self.tmdb.clone();
            tasks.spawn(async move { (position, id, tmdb.fetch_movie_details(id).await) });
        }

        let mut found = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, _, Ok(movie))) => found.push((position, movie)),
                Ok((_, id, Err(e))) => warn!("Failed to fetch movie {}: {}", id, e),
                Err(e) => warn!("Favorite fetch task failed: {}", e),
            }
        }
        found.sort_by_key(|(position, _)| *position);
        info!("Loaded {} favorite movies", found.len());
        Ok(found.into_iter().map(|(_, movie)| movie).collect())
    }
}
