use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::account::{AccountBackend, Session, User};
use crate::error::{Error, Result};
use crate::preferences::Preferences;
use crate::trending::{NewTrendingEntry, TrendingEntry, TrendingStore};

pub const APPWRITE_ENDPOINT: &str = "https://cloud.appwrite.io/v1";
const PROJECT_HEADER: &str = "X-Appwrite-Project";
const SESSION_HEADER: &str = "X-Appwrite-Session";
const UNIQUE_ID: &str = "unique()";

/// REST client for the hosted account and document service. Holds at most one
/// session, shared by clones.
#[derive(Debug, Clone)]
pub struct AppwriteClient {
    client: Client,
    endpoint: String,
    project_id: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl AppwriteClient {
    pub fn new(endpoint: impl Into<String>, project_id: impl Into<String>) -> Result<Self> {
        let user_agent = format!("moviedeck/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            session: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let endpoint =
            env::var("APPWRITE_ENDPOINT").unwrap_or_else(|_| APPWRITE_ENDPOINT.to_string());
        let project_id = env::var("APPWRITE_PROJECT_ID").context("APPWRITE_PROJECT_ID not set")?;
        Self::new(endpoint, project_id).context("Failed to build Appwrite HTTP client")
    }

    pub fn collection(
        &self,
        database_id: impl Into<String>,
        collection_id: impl Into<String>,
    ) -> DocumentCollection {
        DocumentCollection {
            client: self.clone(),
            database_id: database_id.into(),
            collection_id: collection_id.into(),
        }
    }

    pub fn collection_from_env(&self) -> anyhow::Result<DocumentCollection> {
        let database_id =
            env::var("APPWRITE_DATABASE_ID").context("APPWRITE_DATABASE_ID not set")?;
        let collection_id =
            env::var("APPWRITE_COLLECTION_ID").context("APPWRITE_COLLECTION_ID not set")?;
        Ok(self.collection(database_id, collection_id))
    }

    pub fn has_session(&self) -> bool {
        self.session_secret().is_some()
    }

    fn session_secret(&self) -> Option<String> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.secret.clone()))
            .filter(|s| !s.is_empty())
    }

    fn store_session(&self, session: Option<Session>) {
        if let Ok(mut guard) = self.session.write() {
            *guard = session;
        }
    }

    fn require_session(&self) -> Result<()> {
        if self.has_session() {
            Ok(())
        } else {
            Err(Error::Session("no active session".to_string()))
        }
    }

    fn request(&self, method: Method, path: &str) -> (String, RequestBuilder) {
        let url = format!("{}{}", self.endpoint, path);
        let mut builder = self
            .client
            .request(method, &url)
            .header(PROJECT_HEADER, &self.project_id)
            .header(header::ACCEPT, "application/json");
        if let Some(secret) = self.session_secret() {
            builder = builder.header(SESSION_HEADER, secret);
        }
        (url, builder)
    }

    async fn send(&self, url: &str, builder: RequestBuilder) -> Result<Response> {
        debug!("Appwrite request {}", url);
        let res = builder.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(Error::Status {
                url: url.to_string(),
                status,
                body,
            });
        }
        Ok(res)
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        builder: RequestBuilder,
    ) -> Result<T> {
        let res = self.send(url, builder).await?;
        let text = res.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl AccountBackend for AppwriteClient {
    async fn create_account(&self, email: &str, password: &str) -> Result<User> {
        let (url, req) = self.request(Method::POST, "/account");
        let body = json!({ "userId": UNIQUE_ID, "email": email, "password": password });
        self.send_json(&url, req.json(&body)).await
    }

    async fn create_session(&self, email: &str, password: &str) -> Result<Session> {
        let (url, req) = self.request(Method::POST, "/account/sessions/email");
        let body = json!({ "email": email, "password": password });
        let res = self.send(&url, req.json(&body)).await?;
        let cookie_secret = session_cookie(res.headers(), &self.project_id);
        let text = res.text().await?;
        let mut session: Session = serde_json::from_str(&text)?;
        if session.secret.is_empty() {
            session.secret = cookie_secret.unwrap_or_default();
        }
        if session.secret.is_empty() {
            return Err(Error::Session(
                "session created without a usable secret".to_string(),
            ));
        }
        self.store_session(Some(session.clone()));
        Ok(session)
    }

    async fn delete_session(&self) -> Result<()> {
        self.require_session()?;
        let (url, req) = self.request(Method::DELETE, "/account/sessions/current");
        self.send(&url, req).await?;
        self.store_session(None);
        Ok(())
    }

    async fn get_account(&self) -> Result<User> {
        self.require_session()?;
        let (url, req) = self.request(Method::GET, "/account");
        self.send_json(&url, req).await
    }

    async fn get_prefs(&self) -> Result<Preferences> {
        self.require_session()?;
        let (url, req) = self.request(Method::GET, "/account/prefs");
        self.send_json(&url, req).await
    }

    async fn update_prefs(&self, prefs: &Preferences) -> Result<()> {
        self.require_session()?;
        let (url, req) = self.request(Method::PATCH, "/account/prefs");
        self.send(&url, req.json(&json!({ "prefs": prefs }))).await?;
        Ok(())
    }

    async fn update_name(&self, name: &str) -> Result<User> {
        self.require_session()?;
        let (url, req) = self.request(Method::PATCH, "/account/name");
        self.send_json(&url, req.json(&json!({ "name": name })))
            .await
    }
}

/// One document collection of one database.
#[derive(Debug, Clone)]
pub struct DocumentCollection {
    client: AppwriteClient,
    database_id: String,
    collection_id: String,
}

#[derive(Debug, Deserialize)]
struct DocumentList<T> {
    documents: Vec<T>,
}

impl DocumentCollection {
    fn documents_path(&self) -> String {
        format!(
            "/databases/{}/collections/{}/documents",
            self.database_id, self.collection_id
        )
    }

    async fn list<T: for<'de> Deserialize<'de>>(&self, queries: &[Value]) -> Result<Vec<T>> {
        let path = format!("{}{}", self.documents_path(), queries_param(queries));
        let (url, req) = self.client.request(Method::GET, &path);
        let list: DocumentList<T> = self.client.send_json(&url, req).await?;
        Ok(list.documents)
    }
}

#[async_trait]
impl TrendingStore for DocumentCollection {
    async fn find_by_term(&self, term: &str) -> Result<Option<TrendingEntry>> {
        let docs = self
            .list(&[query::equal("searchTerm", json!(term)), query::limit(1)])
            .await?;
        Ok(docs.into_iter().next())
    }

    async fn create(&self, entry: &NewTrendingEntry) -> Result<TrendingEntry> {
        let (url, req) = self.client.request(Method::POST, &self.documents_path());
        let body = json!({ "documentId": UNIQUE_ID, "data": entry });
        self.client.send_json(&url, req.json(&body)).await
    }

    async fn set_count(&self, id: &str, count: u64) -> Result<TrendingEntry> {
        let path = format!("{}/{}", self.documents_path(), id);
        let (url, req) = self.client.request(Method::PATCH, &path);
        let body = json!({ "data": { "count": count } });
        self.client.send_json(&url, req.json(&body)).await
    }

    async fn top(&self, limit: usize) -> Result<Vec<TrendingEntry>> {
        self.list(&[
            query::order_desc("count"),
            query::order_desc("$updatedAt"),
            query::limit(limit),
        ])
        .await
    }
}

/// Document query builders in the service's JSON query syntax.
pub mod query {
    use serde_json::{json, Value};

    pub fn equal(attribute: &str, value: Value) -> Value {
        json!({ "method": "equal", "attribute": attribute, "values": [value] })
    }

    pub fn order_desc(attribute: &str) -> Value {
        json!({ "method": "orderDesc", "attribute": attribute })
    }

    pub fn limit(n: usize) -> Value {
        json!({ "method": "limit", "values": [n] })
    }
}

fn queries_param(queries: &[Value]) -> String {
    if queries.is_empty() {
        return String::new();
    }
    let parts = queries
        .iter()
        .map(|q| format!("queries%5B%5D={}", urlencoding::encode(&q.to_string())))
        .collect::<Vec<_>>()
        .join("&");
    format!("?{parts}")
}

/// Session secret from the `a_session_<project>` cookie, for deployments that
/// leave `secret` empty in the response body.
fn session_cookie(headers: &header::HeaderMap, project_id: &str) -> Option<String> {
    let name = format!("a_session_{}=", project_id.to_lowercase());
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            cookie
                .split(';')
                .next()
                .and_then(|pair| pair.trim().strip_prefix(name.as_str()))
                .map(|s| s.to_string())
        })
        .filter(|s| !s.is_empty())
}
