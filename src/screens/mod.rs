//! Screen controllers. Each one owns the state a screen needs and talks to the
//! clients; nothing here renders.

mod auth;
mod details;
mod home;
mod profile;
mod saved;
mod search;

pub use auth::{LoginForm, RegisterForm};
pub use details::{DetailsScreen, FavoriteToggle};
pub use home::{HomeScreen, HomeView};
pub use profile::{display_name, ProfileScreen, ProfileView};
pub use saved::SavedScreen;
pub use search::SearchScreen;
