use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::fetch::{Fetch, FetchState};
use crate::genres::{self, CatalogGenre, CATALOG_GENRES};
use crate::tmdb::{Movie, TmdbApi};
use crate::trending::{Trending, TrendingEntry, DEFAULT_TOP};

/// Trending searches plus the popular-movies grid, optionally filtered by one
/// catalog genre.
#[derive(Clone)]
pub struct HomeScreen {
    trending: Fetch<Vec<TrendingEntry>>,
    movies: Fetch<Vec<Movie>>,
    selected_genre: Arc<RwLock<Option<i64>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HomeView {
    pub trending: FetchState<Vec<TrendingEntry>>,
    pub movies: FetchState<Vec<Movie>>,
    pub selected_genre: Option<i64>,
    pub heading: String,
    pub genres: &'static [CatalogGenre],
}

impl HomeScreen {
    /// Both lists start loading right away.
    pub fn new(tmdb: Arc<dyn TmdbApi>, trending: Trending) -> Self {
        let trending = Fetch::new(
            move || {
                let trending = trending.clone();
                async move { trending.top(DEFAULT_TOP).await }
            },
            true,
        );

        let selected_genre = Arc::new(RwLock::new(None));
        let genre = selected_genre.clone();
        let movies = Fetch::new(
            move || {
                let tmdb = tmdb.clone();
                let genre_id = genre.read().ok().and_then(|g| *g);
                async move { tmdb.fetch_movies("", genre_id).await }
            },
            true,
        );

        Self {
            trending,
            movies,
            selected_genre,
        }
    }

    pub fn selected_genre(&self) -> Option<i64> {
        self.selected_genre.read().ok().and_then(|g| *g)
    }

    /// Selects `genre_id`, or clears the filter when it is already selected,
    /// then reloads the movie grid.
    pub async fn toggle_genre(&self, genre_id: i64) -> Option<i64> {
        let next = {
            let mut selected = match self.selected_genre.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *selected = if *selected == Some(genre_id) {
                None
            } else {
                Some(genre_id)
            };
            *selected
        };
        info!("Home genre filter -> {:?}", next);
        self.movies.refetch().await;
        next
    }

    /// Reloads both lists, as when the screen is shown again.
    pub async fn refresh(&self) {
        tokio::join!(self.trending.refetch(), self.movies.refetch());
    }

    pub fn heading(&self) -> String {
        match self.selected_genre().and_then(genres::catalog_genre) {
            Some(g) => format!("{} Movies", g.name),
            None => "Latest Movies".to_string(),
        }
    }

    pub fn view(&self) -> HomeView {
        HomeView {
            trending: self.trending.state(),
            movies: self.movies.state(),
            selected_genre: self.selected_genre(),
            heading: self.heading(),
            genres: CATALOG_GENRES,
        }
    }

    /// Waits for both lists to finish loading.
    pub async fn settled(&self) -> HomeView {
        tokio::join!(self.trending.settled(), self.movies.settled());
        self.view()
    }
}
