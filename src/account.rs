use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::preferences::Preferences;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "$id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub secret: String,
}

/// Raw account operations of the hosted backend. Implementations hold the
/// current session; every call is attempted once.
#[async_trait]
pub trait AccountBackend: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<User>;
    async fn create_session(&self, email: &str, password: &str) -> Result<Session>;
    async fn delete_session(&self) -> Result<()>;
    async fn get_account(&self) -> Result<User>;
    async fn get_prefs(&self) -> Result<Preferences>;
    async fn update_prefs(&self, prefs: &Preferences) -> Result<()>;
    async fn update_name(&self, name: &str) -> Result<User>;
}

/// Session lifecycle and the preferences document.
///
/// Preference writes are read-merge-write with no version check: two writers
/// racing on the same account can lose one side's keys. The backend offers no
/// compare-and-swap, so this is an accepted limitation.
#[derive(Clone)]
pub struct Accounts {
    backend: Arc<dyn AccountBackend>,
}

impl Accounts {
    pub fn new(backend: Arc<dyn AccountBackend>) -> Self {
        Self { backend }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        self.backend
            .create_session(email, password)
            .await
            .map_err(auth_error)?;
        let user = self.backend.get_account().await?;
        info!("Signed in as {}", user.email);
        Ok(user)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        self.backend
            .create_account(email, password)
            .await
            .map_err(auth_error)?;
        info!("Created account for {}", email);
        self.login(email, password).await
    }

    /// The signed-in user, or `None`. Lookup failures are logged, not returned.
    pub async fn current_user(&self) -> Option<User> {
        match self.backend.get_account().await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Failed to get current user: {}", e);
                None
            }
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.backend.delete_session().await.map_err(|e| {
            if e.status() == Some(StatusCode::UNAUTHORIZED) {
                Error::Session("no active session".to_string())
            } else {
                e
            }
        })?;
        info!("Signed out");
        Ok(())
    }

    /// The full preferences document, or an empty one when it cannot be read.
    pub async fn preferences(&self) -> Preferences {
        match self.backend.get_prefs().await {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("Failed to get preferences: {}", e);
                Preferences::new()
            }
        }
    }

    /// Reads the document, merges `partial` over it per top-level key and
    /// writes the result back. An empty partial returns the current document
    /// without writing.
    pub async fn update_preferences(&self, partial: Preferences) -> Result<Preferences> {
        let current = self.backend.get_prefs().await?;
        if partial.is_empty() {
            return Ok(current);
        }
        let merged = current.merged(partial);
        self.backend.update_prefs(&merged).await?;
        Ok(merged)
    }

    pub async fn update_favorite_genres(&self, genres: &[String]) -> Result<Preferences> {
        self.update_preferences(Preferences::with_genres(genres.iter().cloned()))
            .await
    }

    pub async fn update_username(&self, name: &str) -> Result<User> {
        self.backend.update_name(name).await
    }

    pub async fn is_favorite(&self, movie_id: &str) -> Result<bool> {
        let prefs = self.update_preferences(Preferences::new()).await?;
        Ok(prefs.favorites().iter().any(|id| id == movie_id))
    }

    /// Adds or removes `movie_id` from favorites. Returns whether the movie is
    /// a favorite afterwards.
    pub async fn toggle_favorite(&self, movie_id: &str) -> Result<bool> {
        if self.current_user().await.is_none() {
            return Err(Error::Auth(
                "You need to be logged in to save favorites".to_string(),
            ));
        }
        let prefs = self.update_preferences(Preferences::new()).await?;
        let mut favorites = prefs.favorites();
        let now_favorite = if favorites.iter().any(|id| id == movie_id) {
            favorites.retain(|id| id != movie_id);
            false
        } else {
            favorites.push(movie_id.to_string());
            true
        };
        self.update_preferences(Preferences::with_favorites(favorites))
            .await?;
        info!(
            "Movie {} {} favorites",
            movie_id,
            if now_favorite { "added to" } else { "removed from" }
        );
        Ok(now_favorite)
    }
}

/// Rejections from session or account creation become `Error::Auth` carrying
/// the backend's message.
fn auth_error(e: Error) -> Error {
    match e {
        Error::Status { status, body, .. }
            if matches!(status.as_u16(), 400 | 401 | 409) =>
        {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or(body);
            Error::Auth(message)
        }
        other => other,
    }
}
