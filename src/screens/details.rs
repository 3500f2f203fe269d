use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::account::Accounts;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, FetchState};
use crate::tmdb::{MovieDetails, TmdbApi};

#[derive(Clone)]
pub struct DetailsScreen {
    movie_id: i64,
    details: Fetch<MovieDetails>,
    accounts: Accounts,
    toggling: Arc<AtomicBool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FavoriteToggle {
    pub favorite: bool,
    pub title: &'static str,
    pub message: &'static str,
}

impl FavoriteToggle {
    fn new(favorite: bool) -> Self {
        if favorite {
            Self {
                favorite,
                title: "Added to favorites",
                message: "This movie was added to your favorites",
            }
        } else {
            Self {
                favorite,
                title: "Removed from favorites",
                message: "This movie was removed from your favorites",
            }
        }
    }
}

/// Holds the busy flag; released on drop, including when the toggling future
/// is cancelled mid-request.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DetailsScreen {
    /// Starts loading the movie's details immediately.
    pub fn new(tmdb: Arc<dyn TmdbApi>, accounts: Accounts, movie_id: i64) -> Self {
        let details = Fetch::new(
            move || {
                let tmdb = tmdb.clone();
                async move { tmdb.fetch_movie_details(movie_id).await }
            },
            true,
        );
        Self {
            movie_id,
            details,
            accounts,
            toggling: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn movie_id(&self) -> i64 {
        self.movie_id
    }

    pub async fn details(&self) -> FetchState<MovieDetails> {
        self.details.settled().await
    }

    /// False when signed out or when the preferences cannot be read.
    pub async fn is_favorite(&self) -> bool {
        if self.accounts.current_user().await.is_none() {
            return false;
        }
        match self.accounts.is_favorite(&self.movie_id.to_string()).await {
            Ok(favorite) => favorite,
            Err(e) => {
                warn!("Error checking favorites: {}", e);
                false
            }
        }
    }

    /// Flips the favorite flag. Refused while a previous toggle is still
    /// running.
    pub async fn toggle_favorite(&self) -> Result<FavoriteToggle> {
        let Some(_busy) = BusyGuard::acquire(&self.toggling) else {
            return Err(Error::Invalid(
                "Favorite update already in progress".to_string(),
            ));
        };
        self.accounts
            .toggle_favorite(&self.movie_id.to_string())
            .await
            .map(FavoriteToggle::new)
    }

    /// Loads the details again if the last attempt failed.
    pub async fn retry_failed(&self) {
        if self.details.error().is_some() {
            self.details.refetch().await;
        }
    }
}
