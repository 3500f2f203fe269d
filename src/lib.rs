pub mod account;
pub mod app;
pub mod appwrite;
pub mod error;
pub mod fetch;
pub mod genres;
pub mod preferences;
pub mod screens;
pub mod tmdb;
pub mod trending;

pub use error::{Error, Result};
