use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{env, net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::account::{AccountBackend, Accounts, User};
use crate::appwrite::AppwriteClient;
use crate::error::Error;
use crate::fetch::FetchState;
use crate::screens::{
    DetailsScreen, FavoriteToggle, HomeScreen, HomeView, LoginForm, ProfileScreen, ProfileView,
    RegisterForm, SavedScreen, SearchScreen,
};
use crate::tmdb::{Movie, MovieDetails, TmdbApi, TmdbClient};
use crate::trending::{Trending, TrendingEntry, TrendingStore, DEFAULT_TOP};

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_ADDR: &str = "127.0.0.1:3146";

/// One account session per process, like one app per device.
#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub accounts: Accounts,
    pub trending: Trending,
    pub home: HomeScreen,
    pub search: SearchScreen,
    pub saved: SavedScreen,
    pub profile: ProfileScreen,
    pub details: Arc<Mutex<Option<DetailsScreen>>>,
}

impl AppState {
    /// Must be called inside a tokio runtime; the home lists start loading
    /// immediately.
    pub fn new(
        tmdb: Arc<dyn TmdbApi>,
        account_backend: Arc<dyn AccountBackend>,
        trending_store: Arc<dyn TrendingStore>,
    ) -> Self {
        let accounts = Accounts::new(account_backend);
        let trending = Trending::new(trending_store);
        Self {
            home: HomeScreen::new(tmdb.clone(), trending.clone()),
            search: SearchScreen::new(tmdb.clone(), trending.clone()),
            saved: SavedScreen::new(tmdb.clone(), accounts.clone()),
            profile: ProfileScreen::new(accounts.clone()),
            details: Arc::new(Mutex::new(None)),
            tmdb,
            accounts,
            trending,
        }
    }

    /// The details screen for `movie_id`, reusing the open one when it
    /// matches. A reused screen whose last load failed loads again.
    async fn open_details(&self, movie_id: i64) -> DetailsScreen {
        let open = {
            let mut current = self.details.lock().await;
            match current.as_ref() {
                Some(screen) if screen.movie_id() == movie_id => screen.clone(),
                _ => {
                    let screen =
                        DetailsScreen::new(self.tmdb.clone(), self.accounts.clone(), movie_id);
                    *current = Some(screen.clone());
                    return screen;
                }
            }
        };
        open.retry_failed().await;
        open
    }
}

pub async fn run_server() -> Result<()> {
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::from_env()?);
    let appwrite = AppwriteClient::from_env()?;
    let trending_store: Arc<dyn TrendingStore> = Arc::new(appwrite.collection_from_env()?);
    let state = AppState::new(tmdb, Arc::new(appwrite), trending_store);

    let app = build_router(state);

    let addr: SocketAddr = env::var("MOVIEDECK_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("MOVIEDECK_ADDR is not a socket address")?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/home", get(home))
        .route("/home/genre/:id", post(toggle_genre))
        .route("/trending", get(trending))
        .route("/search", get(search))
        .route("/movies/:id", get(movie))
        .route("/movies/:id/favorite", post(toggle_favorite))
        .route("/favorites", get(favorites))
        .route("/profile", get(profile))
        .route("/profile/name", put(rename))
        .route("/profile/genres", put(save_genres))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Auth(_) | Error::Session(_) => StatusCode::UNAUTHORIZED,
            Error::Invalid(_) => StatusCode::BAD_REQUEST,
            Error::Network(_) | Error::Status { .. } | Error::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        if status == StatusCode::BAD_GATEWAY {
            error!("Upstream failure: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, Error>;

async fn health() -> &'static str {
    "OK"
}

async fn login(State(state): State<AppState>, Json(form): Json<LoginForm>) -> ApiResult<User> {
    let user = form.submit(&state.accounts).await?;
    Ok(Json(user))
}

async fn register(
    State(state): State<AppState>,
    Json(form): Json<RegisterForm>,
) -> ApiResult<User> {
    let user = form.submit(&state.accounts).await?;
    Ok(Json(user))
}

async fn logout(State(state): State<AppState>) -> std::result::Result<StatusCode, Error> {
    state.profile.logout().await?;
    *state.details.lock().await = None;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(state): State<AppState>) -> Json<Option<User>> {
    Json(state.accounts.current_user().await)
}

async fn home(State(state): State<AppState>) -> Json<HomeView> {
    state.home.refresh().await;
    Json(state.home.settled().await)
}

async fn toggle_genre(State(state): State<AppState>, Path(id): Path<i64>) -> Json<HomeView> {
    state.home.toggle_genre(id).await;
    Json(state.home.settled().await)
}

async fn trending(State(state): State<AppState>) -> ApiResult<Vec<TrendingEntry>> {
    Ok(Json(state.trending.top(DEFAULT_TOP).await?))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<FetchState<Vec<Movie>>> {
    Json(state.search.search(&params.query).await)
}

#[derive(Debug, Serialize)]
struct MovieView {
    details: FetchState<MovieDetails>,
    favorite: bool,
}

async fn movie(State(state): State<AppState>, Path(id): Path<i64>) -> Json<MovieView> {
    let screen = state.open_details(id).await;
    let (details, favorite) = tokio::join!(screen.details(), screen.is_favorite());
    Json(MovieView { details, favorite })
}

async fn toggle_favorite(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<FavoriteToggle> {
    let screen = state.open_details(id).await;
    Ok(Json(screen.toggle_favorite().await?))
}

async fn favorites(State(state): State<AppState>) -> ApiResult<Vec<MovieDetails>> {
    Ok(Json(state.saved.load().await?))
}

async fn profile(State(state): State<AppState>) -> Json<ProfileView> {
    Json(state.profile.load().await)
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

async fn rename(
    State(state): State<AppState>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<Option<User>> {
    Ok(Json(state.profile.rename(&req.name).await?))
}

#[derive(Debug, Deserialize)]
struct GenresRequest {
    genres: Vec<String>,
}

async fn save_genres(
    State(state): State<AppState>,
    Json(req): Json<GenresRequest>,
) -> ApiResult<Vec<String>> {
    state.profile.set_interests(req.genres)?;
    Ok(Json(state.profile.save_interests().await?))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
