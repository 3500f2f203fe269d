use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::account::{Accounts, User};
use crate::error::{Error, Result};
use crate::genres;

#[derive(Clone)]
pub struct ProfileScreen {
    accounts: Accounts,
    interests: Arc<RwLock<Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileView {
    pub email: Option<String>,
    pub name: Option<String>,
    pub interests: Vec<String>,
}

/// Name shown for a user without a display name: the email, minus a trailing
/// `@gmail.com`.
pub fn display_name(email: &str) -> String {
    email.strip_suffix("@gmail.com").unwrap_or(email).to_string()
}

impl ProfileScreen {
    pub fn new(accounts: Accounts) -> Self {
        Self {
            accounts,
            interests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn load(&self) -> ProfileView {
        let Some(user) = self.accounts.current_user().await else {
            return ProfileView {
                email: None,
                name: None,
                interests: self.interests(),
            };
        };
        let genres = self.accounts.preferences().await.genres();
        if !genres.is_empty() {
            self.replace_interests(genres);
        }
        ProfileView {
            name: Some(if user.name.is_empty() {
                display_name(&user.email)
            } else {
                user.name.clone()
            }),
            email: Some(user.email),
            interests: self.interests(),
        }
    }

    pub fn interests(&self) -> Vec<String> {
        self.interests
            .read()
            .map(|i| i.clone())
            .unwrap_or_default()
    }

    /// Adds `genre` to the local selection, or removes it if present.
    pub fn toggle_interest(&self, genre: &str) -> Vec<String> {
        if let Ok(mut interests) = self.interests.write() {
            if interests.iter().any(|g| g == genre) {
                interests.retain(|g| g != genre);
            } else {
                interests.push(genre.to_string());
            }
        }
        self.interests()
    }

    /// Replaces the local selection. Every name must be one of the offered
    /// interest genres.
    pub fn set_interests(&self, selection: Vec<String>) -> Result<()> {
        if let Some(unknown) = selection.iter().find(|g| !genres::is_interest(g)) {
            return Err(Error::Invalid(format!("Unknown genre '{unknown}'")));
        }
        self.replace_interests(selection);
        Ok(())
    }

    pub async fn save_interests(&self) -> Result<Vec<String>> {
        let selection = self.interests();
        let prefs = self.accounts.update_favorite_genres(&selection).await?;
        info!("Saved {} interests", selection.len());
        Ok(prefs.genres())
    }

    /// Trims `name` and saves it. Blank names are ignored and return `None`.
    pub async fn rename(&self, name: &str) -> Result<Option<User>> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let user = self.accounts.update_username(trimmed).await?;
        Ok(Some(user))
    }

    pub async fn logout(&self) -> Result<()> {
        self.accounts.logout().await?;
        self.replace_interests(Vec::new());
        Ok(())
    }

    fn replace_interests(&self, selection: Vec<String>) {
        if let Ok(mut interests) = self.interests.write() {
            *interests = selection;
        }
    }
}
