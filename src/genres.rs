//! Static genre tables: catalog genre ids for filtering, and the interest names
//! offered on the profile screen.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogGenre {
    pub id: i64,
    pub name: &'static str,
}

pub const CATALOG_GENRES: &[CatalogGenre] = &[
    CatalogGenre { id: 28, name: "Action" },
    CatalogGenre { id: 12, name: "Adventure" },
    CatalogGenre { id: 16, name: "Animation" },
    CatalogGenre { id: 35, name: "Comedy" },
    CatalogGenre { id: 80, name: "Crime" },
    CatalogGenre { id: 99, name: "Documentary" },
    CatalogGenre { id: 18, name: "Drama" },
    CatalogGenre { id: 10751, name: "Family" },
    CatalogGenre { id: 14, name: "Fantasy" },
    CatalogGenre { id: 36, name: "History" },
    CatalogGenre { id: 27, name: "Horror" },
    CatalogGenre { id: 10402, name: "Music" },
    CatalogGenre { id: 9648, name: "Mystery" },
    CatalogGenre { id: 10749, name: "Romance" },
    CatalogGenre { id: 878, name: "Science Fiction" },
    CatalogGenre { id: 10770, name: "TV Movie" },
    CatalogGenre { id: 53, name: "Thriller" },
    CatalogGenre { id: 10752, name: "War" },
    CatalogGenre { id: 37, name: "Western" },
];

pub const INTEREST_GENRES: &[&str] = &[
    "Action",
    "Adventure",
    "Animation",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Family",
    "Fantasy",
    "Horror",
    "Mystery",
    "Romance",
    "Science Fiction",
    "Thriller",
    "War",
    "Western",
];

pub fn catalog_genre(id: i64) -> Option<&'static CatalogGenre> {
    CATALOG_GENRES.iter().find(|g| g.id == id)
}

pub fn is_interest(name: &str) -> bool {
    INTEREST_GENRES.contains(&name)
}
