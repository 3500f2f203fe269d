//! Query the movie catalog and print what the screens would show.
//! Usage:
//!   cargo run --bin tmdb_props -- discover [genre_id]
//!   cargo run --bin tmdb_props -- search <query> [genre_id]
//!   cargo run --bin tmdb_props -- movie <tmdb_id>
//! Requires TMDB_API_KEY in the environment (.env supported).

use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use moviedeck::genres;
use moviedeck::tmdb::{Movie, TmdbApi, TmdbClient};
use serde_json::{json, Value};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Discover,
    Search,
    Movie,
}

impl FromStr for Command {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "discover" => Ok(Command::Discover),
            "search" => Ok(Command::Search),
            "movie" => Ok(Command::Movie),
            _ => Err(anyhow!("command must be 'discover', 'search' or 'movie'")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .compact()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin tmdb_props -- discover [genre_id]");
        eprintln!("       cargo run --bin tmdb_props -- search <query> [genre_id]");
        eprintln!("       cargo run --bin tmdb_props -- movie <tmdb_id>");
        std::process::exit(1);
    }

    let command = Command::from_str(&args[1])?;
    let client = TmdbClient::from_env()?;

    let output = match command {
        Command::Discover => {
            let genre_id = parse_genre(args.get(2))?;
            list_output(client.discover_movies(genre_id).await?)
        }
        Command::Search => {
            let query = args
                .get(2)
                .ok_or_else(|| anyhow!("missing search query"))?;
            let genre_id = parse_genre(args.get(3))?;
            list_output(client.search_movies(query, genre_id).await?)
        }
        Command::Movie => {
            let id: i64 = args
                .get(2)
                .ok_or_else(|| anyhow!("missing tmdb_id"))?
                .parse()
                .context("tmdb_id must be an integer")?;
            let detail = client.fetch_movie_details(id).await?;
            json!({
                "id": detail.id,
                "title": detail.title,
                "year": detail.year(),
                "rating": detail.rating(),
                "vote_count": detail.vote_count,
                "runtime_minutes": detail.runtime,
                "genres": detail.genre_line(),
                "companies": detail.companies_line(),
                "budget_millions": detail.budget_millions(),
                "revenue_millions": detail.revenue_millions(),
                "overview": detail.overview,
                "img": detail.poster_url(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_genre(arg: Option<&String>) -> Result<Option<i64>> {
    let Some(raw) = arg else {
        return Ok(None);
    };
    let id: i64 = raw.parse().context("genre_id must be an integer")?;
    if genres::catalog_genre(id).is_none() {
        bail!("unknown genre id {id}");
    }
    Ok(Some(id))
}

fn list_output(movies: Vec<Movie>) -> Value {
    Value::Array(
        movies
            .iter()
            .map(|m| {
                json!({
                    "id": m.id,
                    "title": m.title,
                    "release_date": m.release_date,
                    "vote_average": m.vote_average,
                    "img": m.poster_url(),
                })
            })
            .collect(),
    )
}
