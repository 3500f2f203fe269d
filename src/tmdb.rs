use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

pub const TMDB_BASE: &str = "https://api.themoviedb.org/3";
pub const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base: String,
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn discover_movies(&self, genre_id: Option<i64>) -> Result<Vec<Movie>>;
    async fn search_movies(&self, query: &str, genre_id: Option<i64>) -> Result<Vec<Movie>>;
    async fn fetch_movie_details(&self, id: i64) -> Result<MovieDetails>;

    /// Search when `query` is non-empty, otherwise discover by popularity.
    async fn fetch_movies(&self, query: &str, genre_id: Option<i64>) -> Result<Vec<Movie>> {
        if query.is_empty() {
            self.discover_movies(genre_id).await
        } else {
            self.search_movies(query, genre_id).await
        }
    }
}

/// A catalog list item as returned by discover and search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
}

impl Movie {
    pub fn poster_url(&self) -> Option<String> {
        poster_url(self.poster_path.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionCompany {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub budget: u64,
    #[serde(default)]
    pub revenue: u64,
    #[serde(default)]
    pub production_companies: Vec<ProductionCompany>,
}

impl MovieDetails {
    pub fn poster_url(&self) -> Option<String> {
        poster_url(self.poster_path.as_deref())
    }

    pub fn year(&self) -> Option<String> {
        self.release_date
            .as_deref()
            .filter(|d| !d.is_empty())
            .and_then(extract_year)
    }

    /// Vote average rounded to a whole number out of ten.
    pub fn rating(&self) -> u32 {
        self.vote_average.round().clamp(0.0, 10.0) as u32
    }

    pub fn genre_line(&self) -> String {
        join_or_na(self.genres.iter().map(|g| g.name.as_str()))
    }

    pub fn companies_line(&self) -> String {
        join_or_na(self.production_companies.iter().map(|c| c.name.as_str()))
    }

    pub fn budget_millions(&self) -> f64 {
        self.budget as f64 / 1_000_000.0
    }

    pub fn revenue_millions(&self) -> f64 {
        self.revenue as f64 / 1_000_000.0
    }
}

impl From<&MovieDetails> for Movie {
    fn from(d: &MovieDetails) -> Self {
        Movie {
            id: d.id,
            title: d.title.clone(),
            poster_path: d.poster_path.clone(),
            vote_average: d.vote_average,
            vote_count: d.vote_count,
            release_date: d.release_date.clone(),
            overview: d.overview.clone(),
            genre_ids: d.genres.iter().map(|g| g.id).collect(),
        }
    }
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let user_agent = format!("moviedeck/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base: TMDB_BASE.to_string(),
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
        let mut client = Self::new(api_key).context("Failed to build TMDB HTTP client")?;
        if let Ok(base) = env::var("TMDB_BASE_URL") {
            client.base = base.trim_end_matches('/').to_string();
        }
        Ok(client)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let res = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status,
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Deserialize)]
struct MovieList {
    #[serde(default)]
    results: Vec<Movie>,
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn discover_movies(&self, genre_id: Option<i64>) -> Result<Vec<Movie>> {
        let url = movies_url(&self.base, "", genre_id);
        let data: MovieList = self.get_json(&url).await?;
        Ok(data.results)
    }

    async fn search_movies(&self, query: &str, genre_id: Option<i64>) -> Result<Vec<Movie>> {
        let url = movies_url(&self.base, query, genre_id);
        let data: MovieList = self.get_json(&url).await?;
        Ok(data.results)
    }

    async fn fetch_movie_details(&self, id: i64) -> Result<MovieDetails> {
        let url = format!("{}/movie/{id}", self.base);
        self.get_json(&url).await
    }
}

/// Discover URL for an empty query, search URL otherwise. A genre filter is
/// appended to either.
pub fn movies_url(base: &str, query: &str, genre_id: Option<i64>) -> String {
    let mut url = if query.is_empty() {
        format!("{base}/discover/movie?sort_by=popularity.desc")
    } else {
        format!("{base}/search/movie?query={}", urlencoding::encode(query))
    };
    if let Some(id) = genre_id {
        url.push_str(&format!("&with_genres={id}"));
    }
    url
}

pub fn poster_url(path: Option<&str>) -> Option<String> {
    path.filter(|p| !p.is_empty())
        .map(|p| format!("{POSTER_BASE}{p}"))
}

fn extract_year(date: &str) -> Option<String> {
    date.split('-').next().map(|s| s.to_string())
}

fn join_or_na<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let joined = names.collect::<Vec<_>>().join(" - ");
    if joined.is_empty() {
        "N/A".to_string()
    } else {
        joined
    }
}
