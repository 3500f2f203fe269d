use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use moviedeck::account::{AccountBackend, Session, User};
use moviedeck::app::{build_router, AppState};
use moviedeck::preferences::Preferences;
use moviedeck::tmdb::{Genre, Movie, MovieDetails, ProductionCompany, TmdbApi};
use moviedeck::trending::{NewTrendingEntry, TrendingEntry, TrendingStore};
use moviedeck::{Error, Result};
use reqwest::StatusCode as UpstreamStatus;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tower::util::ServiceExt;

const EMAIL: &str = "vigu.george@gmail.com";
const PASSWORD: &str = "12345678";

struct FakeTmdb {
    catalog: Vec<MovieDetails>,
    broken_ids: Vec<i64>,
    // Fail the next details fetch for these ids, then recover.
    flaky_ids: Mutex<Vec<i64>>,
    genre_requests: Mutex<Vec<Option<i64>>>,
    // Searches for this query wait on `release` after signalling `entered`.
    held_query: Mutex<Option<String>>,
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl TmdbApi for FakeTmdb {
    async fn discover_movies(&self, genre_id: Option<i64>) -> Result<Vec<Movie>> {
        self.genre_requests.lock().unwrap().push(genre_id);
        Ok(self
            .catalog
            .iter()
            .filter(|m| genre_id.map_or(true, |g| m.genres.iter().any(|x| x.id == g)))
            .map(Movie::from)
            .collect())
    }

    async fn search_movies(&self, query: &str, _genre_id: Option<i64>) -> Result<Vec<Movie>> {
        let held = self.held_query.lock().unwrap().as_deref() == Some(query);
        if held {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let needle = query.to_lowercase();
        Ok(self
            .catalog
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&needle))
            .map(Movie::from)
            .collect())
    }

    async fn fetch_movie_details(&self, id: i64) -> Result<MovieDetails> {
        let flaky = {
            let mut ids = self.flaky_ids.lock().unwrap();
            let hit = ids.contains(&id);
            ids.retain(|x| *x != id);
            hit
        };
        if flaky {
            return Err(Error::Status {
                url: format!("/movie/{id}"),
                status: UpstreamStatus::SERVICE_UNAVAILABLE,
                body: "try again later".to_string(),
            });
        }
        if self.broken_ids.contains(&id) {
            return Err(Error::Status {
                url: format!("/movie/{id}"),
                status: UpstreamStatus::INTERNAL_SERVER_ERROR,
                body: "upstream broke".to_string(),
            });
        }
        self.catalog
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| Error::Status {
                url: format!("/movie/{id}"),
                status: UpstreamStatus::NOT_FOUND,
                body: "The resource you requested could not be found.".to_string(),
            })
    }
}

#[derive(Default)]
struct FakeAccount {
    signed_in: Mutex<bool>,
    name: Mutex<String>,
    prefs: Mutex<Preferences>,
    // When set, preference writes wait on it after signalling `write_entered`.
    write_gate: Mutex<Option<Arc<Notify>>>,
    write_entered: Notify,
}

#[async_trait::async_trait]
impl AccountBackend for FakeAccount {
    async fn create_account(&self, email: &str, _password: &str) -> Result<User> {
        if email == EMAIL {
            return Err(Error::Status {
                url: "/account".to_string(),
                status: UpstreamStatus::CONFLICT,
                body: json!({ "message": "A user with the same id, email, or phone already exists" })
                    .to_string(),
            });
        }
        Ok(User {
            id: "u2".to_string(),
            email: email.to_string(),
            name: String::new(),
        })
    }

    async fn create_session(&self, email: &str, password: &str) -> Result<Session> {
        if email != EMAIL || password != PASSWORD {
            return Err(Error::Status {
                url: "/account/sessions/email".to_string(),
                status: UpstreamStatus::UNAUTHORIZED,
                body: json!({ "message": "Invalid credentials. Please check the email and password." })
                    .to_string(),
            });
        }
        *self.signed_in.lock().unwrap() = true;
        Ok(Session {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            secret: "secret".to_string(),
        })
    }

    async fn delete_session(&self) -> Result<()> {
        let mut signed_in = self.signed_in.lock().unwrap();
        if !*signed_in {
            return Err(Error::Session("no active session".to_string()));
        }
        *signed_in = false;
        Ok(())
    }

    async fn get_account(&self) -> Result<User> {
        if !*self.signed_in.lock().unwrap() {
            return Err(Error::Session("no active session".to_string()));
        }
        Ok(User {
            id: "u1".to_string(),
            email: EMAIL.to_string(),
            name: self.name.lock().unwrap().clone(),
        })
    }

    async fn get_prefs(&self) -> Result<Preferences> {
        if !*self.signed_in.lock().unwrap() {
            return Err(Error::Session("no active session".to_string()));
        }
        Ok(self.prefs.lock().unwrap().clone())
    }

    async fn update_prefs(&self, prefs: &Preferences) -> Result<()> {
        let gate = self.write_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.write_entered.notify_one();
            gate.notified().await;
        }
        *self.prefs.lock().unwrap() = prefs.clone();
        Ok(())
    }

    async fn update_name(&self, name: &str) -> Result<User> {
        *self.name.lock().unwrap() = name.to_string();
        self.get_account().await
    }
}

#[derive(Default)]
struct MemoryTrending {
    entries: Mutex<Vec<TrendingEntry>>,
    clock: Mutex<i64>,
}

impl MemoryTrending {
    fn tick(&self) -> Option<DateTime<Utc>> {
        let mut clock = self.clock.lock().unwrap();
        *clock += 1;
        DateTime::from_timestamp(1_750_000_000 + *clock, 0)
    }
}

#[async_trait::async_trait]
impl TrendingStore for MemoryTrending {
    async fn find_by_term(&self, term: &str) -> Result<Option<TrendingEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.search_term == term)
            .cloned())
    }

    async fn create(&self, entry: &NewTrendingEntry) -> Result<TrendingEntry> {
        let last_hit = self.tick();
        let mut entries = self.entries.lock().unwrap();
        let created = TrendingEntry {
            id: format!("doc-{}", entries.len() + 1),
            search_term: entry.search_term.clone(),
            movie_id: entry.movie_id,
            count: entry.count,
            title: entry.title.clone(),
            poster_url: entry.poster_url.clone(),
            last_hit,
        };
        entries.push(created.clone());
        Ok(created)
    }

    async fn set_count(&self, id: &str, count: u64) -> Result<TrendingEntry> {
        let last_hit = self.tick();
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.iter_mut().find(|e| e.id == id).unwrap();
        entry.count = count;
        entry.last_hit = last_hit;
        Ok(entry.clone())
    }

    async fn top(&self, limit: usize) -> Result<Vec<TrendingEntry>> {
        let mut entries = self.entries.lock().unwrap().clone();
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries.truncate(limit);
        Ok(entries)
    }
}

fn details(id: i64, title: &str, genres: &[(i64, &str)]) -> MovieDetails {
    MovieDetails {
        id,
        title: title.to_string(),
        poster_path: Some(format!("/{id}.jpg")),
        vote_average: 7.8,
        vote_count: 1200,
        release_date: Some("2019-10-02".to_string()),
        runtime: Some(122),
        overview: format!("{title} overview"),
        genres: genres
            .iter()
            .map(|(id, name)| Genre {
                id: *id,
                name: name.to_string(),
            })
            .collect(),
        budget: 55_000_000,
        revenue: 1_074_000_000,
        production_companies: vec![ProductionCompany {
            name: "Warner Bros. Pictures".to_string(),
        }],
    }
}

fn catalog() -> Vec<MovieDetails> {
    vec![
        details(268, "Batman", &[(28, "Action"), (14, "Fantasy")]),
        details(475557, "Joker", &[(80, "Crime"), (18, "Drama")]),
        details(155, "The Dark Knight", &[(18, "Drama"), (28, "Action")]),
        details(348, "Alien", &[(27, "Horror"), (878, "Science Fiction")]),
    ]
}

struct Harness {
    app: Router,
    tmdb: Arc<FakeTmdb>,
    account: Arc<FakeAccount>,
}

fn harness() -> Harness {
    let tmdb = Arc::new(FakeTmdb {
        catalog: catalog(),
        broken_ids: vec![999],
        flaky_ids: Mutex::new(Vec::new()),
        genre_requests: Mutex::new(Vec::new()),
        held_query: Mutex::new(None),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let account = Arc::new(FakeAccount::default());
    let state = AppState::new(
        tmdb.clone(),
        account.clone(),
        Arc::new(MemoryTrending::default()),
    );
    Harness {
        app: build_router(state),
        tmdb,
        account,
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn sign_in(app: &Router) {
    let (status, user) = call(
        app,
        send_json("POST", "/login", json!({ "email": EMAIL, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], EMAIL);
}

fn titles(list: &Value) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_is_ok() {
    let h = harness();
    let (status, body) = call(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn home_lists_popular_movies_and_toggles_genre() {
    let h = harness();
    let (status, view) = call(&h.app, get("/home")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["heading"], "Latest Movies");
    assert_eq!(view["movies"]["loading"], false);
    assert_eq!(view["movies"]["data"].as_array().unwrap().len(), 4);
    assert_eq!(view["trending"]["data"], json!([]));

    let (_, view) = call(&h.app, send_json("POST", "/home/genre/27", json!({}))).await;
    assert_eq!(view["heading"], "Horror Movies");
    assert_eq!(view["selected_genre"], 27);
    assert_eq!(titles(&view["movies"]["data"]), vec!["Alien"]);

    let (_, view) = call(&h.app, send_json("POST", "/home/genre/27", json!({}))).await;
    assert_eq!(view["selected_genre"], Value::Null);
    assert_eq!(view["movies"]["data"].as_array().unwrap().len(), 4);

    let requests = h.tmdb.genre_requests.lock().unwrap().clone();
    assert_eq!(requests.last(), Some(&None));
    assert!(requests.contains(&Some(27)));
}

#[tokio::test]
async fn searches_feed_trending_ranking() {
    let h = harness();
    for _ in 0..3 {
        let (status, results) = call(&h.app, get("/search?query=batman")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(titles(&results["data"]), vec!["Batman"]);
    }
    call(&h.app, get("/search?query=joker")).await;
    // No results, so nothing is recorded.
    call(&h.app, get("/search?query=zzz")).await;

    let (status, top) = call(&h.app, get("/trending")).await;
    assert_eq!(status, StatusCode::OK);
    let ranked: Vec<(String, u64)> = top
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["searchTerm"].as_str().unwrap().to_string(),
                e["count"].as_u64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        ranked,
        vec![("batman".to_string(), 3), ("joker".to_string(), 1)]
    );
    assert_eq!(
        top[0]["poster_url"],
        "https://image.tmdb.org/t/p/w500/268.jpg"
    );
}

#[tokio::test]
async fn blank_search_clears_results() {
    let h = harness();
    let (_, results) = call(&h.app, get("/search?query=%20%20")).await;
    assert_eq!(results["data"], Value::Null);
    assert_eq!(results["loading"], false);
    let (_, top) = call(&h.app, get("/trending")).await;
    assert_eq!(top, json!([]));
}

#[tokio::test]
async fn rejects_bad_credentials_and_form_errors() {
    let h = harness();
    let (status, body) = call(
        &h.app,
        send_json("POST", "/login", json!({ "email": EMAIL, "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("Invalid credentials"));

    let (status, body) = call(&h.app, send_json("POST", "/login", json!({ "email": EMAIL }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please enter both email and password.");

    let (status, body) = call(
        &h.app,
        send_json(
            "POST",
            "/register",
            json!({ "email": "new@example.com", "password": "a", "confirm_password": "b" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Passwords do not match.");

    let (status, _) = call(
        &h.app,
        send_json(
            "POST",
            "/register",
            json!({ "email": EMAIL, "password": PASSWORD, "confirm_password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_lifecycle() {
    let h = harness();
    let (_, me) = call(&h.app, get("/me")).await;
    assert_eq!(me, Value::Null);

    let (status, _) = call(&h.app, send_json("POST", "/logout", json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    sign_in(&h.app).await;
    let (_, me) = call(&h.app, get("/me")).await;
    assert_eq!(me["email"], EMAIL);

    let (status, _) = call(&h.app, send_json("POST", "/logout", json!({}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, me) = call(&h.app, get("/me")).await;
    assert_eq!(me, Value::Null);
}

#[tokio::test]
async fn favorites_round_trip() {
    let h = harness();
    let (status, body) = call(&h.app, get("/favorites")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication failed: Please login to view favorites");

    let (status, _) = call(&h.app, send_json("POST", "/movies/155/favorite", json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    sign_in(&h.app).await;

    let (_, view) = call(&h.app, get("/movies/155")).await;
    assert_eq!(view["details"]["data"]["title"], "The Dark Knight");
    assert_eq!(view["favorite"], false);

    let (status, toggle) = call(&h.app, send_json("POST", "/movies/155/favorite", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggle["favorite"], true);
    assert_eq!(toggle["title"], "Added to favorites");
    call(&h.app, send_json("POST", "/movies/348/favorite", json!({}))).await;

    let (_, view) = call(&h.app, get("/movies/155")).await;
    assert_eq!(view["favorite"], true);

    let (status, saved) = call(&h.app, get("/favorites")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&saved), vec!["The Dark Knight", "Alien"]);

    let (_, toggle) = call(&h.app, send_json("POST", "/movies/155/favorite", json!({}))).await;
    assert_eq!(toggle["favorite"], false);
    assert_eq!(toggle["title"], "Removed from favorites");
    let (_, saved) = call(&h.app, get("/favorites")).await;
    assert_eq!(titles(&saved), vec!["Alien"]);
}

#[tokio::test]
async fn saved_skips_movies_that_fail_to_load() {
    let h = harness();
    sign_in(&h.app).await;
    *h.account.prefs.lock().unwrap() =
        Preferences::with_favorites(["268", "999", "not-a-number", "475557"]);

    let (status, saved) = call(&h.app, get("/favorites")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&saved), vec!["Batman", "Joker"]);
}

#[tokio::test]
async fn missing_movie_reports_error_in_state() {
    let h = harness();
    let (status, view) = call(&h.app, get("/movies/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["details"]["data"], Value::Null);
    assert_eq!(view["details"]["loading"], false);
    assert!(view["details"]["error"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn profile_genres_replace_and_keep_favorites() {
    let h = harness();
    sign_in(&h.app).await;
    call(&h.app, send_json("POST", "/movies/268/favorite", json!({}))).await;

    let (status, genres) = call(
        &h.app,
        send_json("PUT", "/profile/genres", json!({ "genres": ["Action", "Horror"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(genres, json!(["Action", "Horror"]));

    let (_, genres) = call(
        &h.app,
        send_json("PUT", "/profile/genres", json!({ "genres": ["Comedy"] })),
    )
    .await;
    assert_eq!(genres, json!(["Comedy"]));

    let prefs = h.account.prefs.lock().unwrap().clone();
    assert_eq!(prefs.genres(), vec!["Comedy"]);
    assert_eq!(prefs.favorites(), vec!["268"]);

    let (status, _) = call(
        &h.app,
        send_json("PUT", "/profile/genres", json!({ "genres": ["Musicals"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_name_falls_back_to_gmail_user() {
    let h = harness();
    sign_in(&h.app).await;
    let (_, profile) = call(&h.app, get("/profile")).await;
    assert_eq!(profile["name"], "vigu.george");
    assert_eq!(profile["email"], EMAIL);

    let (_, user) = call(&h.app, send_json("PUT", "/profile/name", json!({ "name": "   " }))).await;
    assert_eq!(user, Value::Null);

    let (status, user) = call(
        &h.app,
        send_json("PUT", "/profile/name", json!({ "name": "  Vigu  " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["name"], "Vigu");
    let (_, profile) = call(&h.app, get("/profile")).await;
    assert_eq!(profile["name"], "Vigu");
}

#[tokio::test]
async fn home_picks_up_new_trending_searches() {
    let h = harness();
    let (_, before) = call(&h.app, get("/home")).await;
    assert_eq!(before["trending"]["data"], json!([]));

    call(&h.app, get("/search?query=batman")).await;

    let (_, after) = call(&h.app, get("/home")).await;
    let trending = after["trending"]["data"].as_array().unwrap();
    assert_eq!(trending.len(), 1);
    assert_eq!(trending[0]["searchTerm"], "batman");
    assert_eq!(trending[0]["count"], 1);
}

#[tokio::test]
async fn overlapping_searches_record_their_own_movie() {
    let h = harness();
    *h.tmdb.held_query.lock().unwrap() = Some("knight".to_string());

    let slow_app = h.app.clone();
    let slow = tokio::spawn(async move { call(&slow_app, get("/search?query=knight")).await });
    h.tmdb.entered.notified().await;

    let fast_app = h.app.clone();
    let fast = tokio::spawn(async move { call(&fast_app, get("/search?query=alien")).await });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    h.tmdb.release.notify_one();

    let (_, slow_body) = slow.await.unwrap();
    let (_, fast_body) = fast.await.unwrap();
    assert_eq!(titles(&slow_body["data"]), vec!["The Dark Knight"]);
    assert_eq!(titles(&fast_body["data"]), vec!["Alien"]);

    let (_, top) = call(&h.app, get("/trending")).await;
    let mut recorded: Vec<(String, i64)> = top
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["searchTerm"].as_str().unwrap().to_string(),
                e["movie_id"].as_i64().unwrap(),
            )
        })
        .collect();
    recorded.sort();
    assert_eq!(
        recorded,
        vec![("alien".to_string(), 348), ("knight".to_string(), 155)]
    );
}

#[tokio::test]
async fn cancelled_favorite_toggle_does_not_block_the_next_one() {
    let h = harness();
    sign_in(&h.app).await;

    let gate = Arc::new(Notify::new());
    *h.account.write_gate.lock().unwrap() = Some(gate);
    let app = h.app.clone();
    let pending = tokio::spawn(async move {
        call(&app, send_json("POST", "/movies/155/favorite", json!({}))).await
    });
    h.account.write_entered.notified().await;
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());

    *h.account.write_gate.lock().unwrap() = None;
    let (status, toggle) = call(&h.app, send_json("POST", "/movies/155/favorite", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggle["favorite"], true);
}

#[tokio::test]
async fn failed_movie_load_is_retried_on_next_visit() {
    let h = harness();
    h.tmdb.flaky_ids.lock().unwrap().push(155);

    let (_, first) = call(&h.app, get("/movies/155")).await;
    assert_eq!(first["details"]["data"], Value::Null);
    assert!(first["details"]["error"].as_str().unwrap().contains("503"));

    let (_, second) = call(&h.app, get("/movies/155")).await;
    assert_eq!(second["details"]["data"]["title"], "The Dark Knight");
    assert_eq!(second["details"]["error"], Value::Null);
}
