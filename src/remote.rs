//! REST client for the remote mirror (PostgREST-style tables plus a
//! management endpoint for schema provisioning).

use crate::config::RemoteConfig;
use crate::garden::GardenState;
use crate::models::{HistoryEntry, TimerMode, TodoItem};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const SCHEMA_SQL: &str = include_str!("../sql/remote_schema.sql");

const GARDEN_TABLE: &str = "garden_sessions";
const HISTORY_TABLE: &str = "garden_history";
const TODOS_TABLE: &str = "garden_todos";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("network error while {action}: {source}")]
    Network {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("remote api error while {action}: http {status}; body={body}")]
    Status {
        action: &'static str,
        status: u16,
        body: String,
    },
    #[error("invalid remote payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid remote url: {0}")]
    Url(String),
    #[error("schema provisioning needs a project reference")]
    NoProjectRef,
}

/// The three remote resources, keyed by user id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Runs the idempotent schema script.
    async fn provision_schema(&self) -> Result<(), RemoteError>;

    async fn fetch_garden(&self, user_id: &str) -> Result<Option<Value>, RemoteError>;

    /// Newest-first history rows.
    async fn fetch_history(&self, user_id: &str, limit: usize) -> Result<Vec<Value>, RemoteError>;

    async fn fetch_todos(&self, user_id: &str) -> Result<Vec<Value>, RemoteError>;

    async fn upsert_garden(&self, user_id: &str, garden: &GardenState) -> Result<(), RemoteError>;

    async fn insert_history(&self, user_id: &str, entry: &HistoryEntry) -> Result<(), RemoteError>;

    async fn upsert_todo(&self, user_id: &str, todo: &TodoItem) -> Result<(), RemoteError>;

    async fn delete_todo(&self, user_id: &str, todo_id: &str) -> Result<(), RemoteError>;
}

#[derive(Debug, Serialize)]
struct GardenRow<'a> {
    user_id: &'a str,
    total_sessions: u32,
    sessions_today: u32,
    streak_days: u32,
    last_session_date: Option<NaiveDate>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    id: &'a str,
    user_id: &'a str,
    session_type: TimerMode,
    duration_minutes: u32,
    completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct TodoRow<'a> {
    id: &'a str,
    user_id: &'a str,
    todo_text: &'a str,
    completed: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

fn owner_query(user_id: &str) -> Vec<(&'static str, String)> {
    vec![("select", "*".to_string()), ("user_id", eq(user_id))]
}

fn history_query(user_id: &str, limit: usize) -> Vec<(&'static str, String)> {
    let mut query = owner_query(user_id);
    query.push(("order", "completed_at.desc".to_string()));
    query.push(("limit", limit.to_string()));
    query
}

fn todos_query(user_id: &str) -> Vec<(&'static str, String)> {
    let mut query = owner_query(user_id);
    query.push(("order", "created_at.asc".to_string()));
    query
}

fn parse_rows(body: &str) -> Result<Vec<Value>, RemoteError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(body)? {
        Value::Array(rows) => Ok(rows),
        other => Ok(vec![other]),
    }
}

/// Talks to the remote tier over HTTPS with bearer authentication.
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    client: Client,
    config: RemoteConfig,
}

impl RestRemoteStore {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| RemoteError::Network {
                action: "building http client",
                source,
            })?;
        Ok(Self { client, config })
    }

    fn table_endpoint(&self, table: &str) -> Result<Url, RemoteError> {
        let mut url = self.config.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Url("remote base URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("rest");
            segments.push("v1");
            segments.push(table);
        }
        Ok(url)
    }

    fn provision_endpoint(&self) -> Result<Url, RemoteError> {
        let project_ref = self
            .config
            .project_ref
            .as_deref()
            .ok_or(RemoteError::NoProjectRef)?;
        let mut url = self.config.management_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Url("management URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("v1");
            segments.push("projects");
            segments.push(project_ref);
            segments.push("database");
            segments.push("query");
        }
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_token)
            .bearer_auth(&self.config.api_token)
    }

    async fn send(&self, action: &'static str, request: RequestBuilder) -> Result<String, RemoteError> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|source| RemoteError::Network { action, source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| RemoteError::Network { action, source })?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                action,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn fetch_rows(
        &self,
        action: &'static str,
        table: &str,
        query: &[(&'static str, String)],
    ) -> Result<Vec<Value>, RemoteError> {
        let endpoint = self.table_endpoint(table)?;
        let body = self
            .send(action, self.client.get(endpoint).query(query))
            .await?;
        parse_rows(&body)
    }

    async fn upsert<T: Serialize + Sync>(
        &self,
        action: &'static str,
        table: &str,
        conflict_key: &str,
        row: &T,
    ) -> Result<(), RemoteError> {
        let endpoint = self.table_endpoint(table)?;
        let request = self
            .client
            .post(endpoint)
            .query(&[("on_conflict", conflict_key)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row);
        self.send(action, request).await.map(|_| ())
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn provision_schema(&self) -> Result<(), RemoteError> {
        let endpoint = self.provision_endpoint()?;
        let request = self
            .client
            .post(endpoint)
            .json(&QueryRequest { query: SCHEMA_SQL });

        match self.send("provisioning schema", request).await {
            Ok(_) => Ok(()),
            // Objects left over from an earlier run are fine
            Err(RemoteError::Status { body, .. }) if body.contains("already exists") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn fetch_garden(&self, user_id: &str) -> Result<Option<Value>, RemoteError> {
        let mut query = owner_query(user_id);
        query.push(("limit", "1".to_string()));
        let rows = self.fetch_rows("fetching garden", GARDEN_TABLE, &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_history(&self, user_id: &str, limit: usize) -> Result<Vec<Value>, RemoteError> {
        self.fetch_rows("fetching history", HISTORY_TABLE, &history_query(user_id, limit))
            .await
    }

    async fn fetch_todos(&self, user_id: &str) -> Result<Vec<Value>, RemoteError> {
        self.fetch_rows("fetching todos", TODOS_TABLE, &todos_query(user_id))
            .await
    }

    async fn upsert_garden(&self, user_id: &str, garden: &GardenState) -> Result<(), RemoteError> {
        let row = GardenRow {
            user_id,
            total_sessions: garden.total_sessions,
            sessions_today: garden.sessions_today,
            streak_days: garden.streak_days,
            last_session_date: garden.last_session_date,
            updated_at: Utc::now(),
        };
        self.upsert("upserting garden", GARDEN_TABLE, "user_id", &row)
            .await
    }

    async fn insert_history(&self, user_id: &str, entry: &HistoryEntry) -> Result<(), RemoteError> {
        let row = HistoryRow {
            id: &entry.id,
            user_id,
            session_type: entry.session_type,
            duration_minutes: entry.duration_minutes,
            completed_at: entry.completed_at,
        };
        let endpoint = self.table_endpoint(HISTORY_TABLE)?;
        let request = self
            .client
            .post(endpoint)
            .header("Prefer", "return=minimal")
            .json(&row);
        self.send("inserting history", request).await.map(|_| ())
    }

    async fn upsert_todo(&self, user_id: &str, todo: &TodoItem) -> Result<(), RemoteError> {
        let row = TodoRow {
            id: &todo.id,
            user_id,
            todo_text: &todo.todo_text,
            completed: todo.completed,
            created_at: todo.created_at,
        };
        self.upsert("upserting todo", TODOS_TABLE, "id", &row).await
    }

    async fn delete_todo(&self, user_id: &str, todo_id: &str) -> Result<(), RemoteError> {
        let endpoint = self.table_endpoint(TODOS_TABLE)?;
        let request = self
            .client
            .delete(endpoint)
            .query(&[("id", eq(todo_id)), ("user_id", eq(user_id))]);
        self.send("deleting todo", request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(url: &str) -> RestRemoteStore {
        RestRemoteStore::new(RemoteConfig::from_parts(Some(url), Some("token")).unwrap()).unwrap()
    }

    #[test]
    fn test_table_endpoint() {
        let store = store("https://abc.supabase.co");
        assert_eq!(
            store.table_endpoint("garden_history").unwrap().as_str(),
            "https://abc.supabase.co/rest/v1/garden_history"
        );

        let store = self::store("http://localhost:54321/");
        assert_eq!(
            store.table_endpoint("garden_todos").unwrap().as_str(),
            "http://localhost:54321/rest/v1/garden_todos"
        );
    }

    #[test]
    fn test_provision_endpoint() {
        let store = store("https://abc.supabase.co");
        assert_eq!(
            store.provision_endpoint().unwrap().as_str(),
            "https://api.supabase.com/v1/projects/abc/database/query"
        );

        let store = self::store("http://localhost:54321");
        assert!(matches!(
            store.provision_endpoint(),
            Err(RemoteError::NoProjectRef)
        ));
    }

    #[test]
    fn test_history_query() {
        let query = history_query("u1", 40);
        assert!(query.contains(&("user_id", "eq.u1".to_string())));
        assert!(query.contains(&("order", "completed_at.desc".to_string())));
        assert!(query.contains(&("limit", "40".to_string())));
        assert!(query.contains(&("select", "*".to_string())));
    }

    #[test]
    fn test_todos_query_orders_by_creation() {
        let query = todos_query("u1");
        assert!(query.contains(&("order", "created_at.asc".to_string())));
    }

    #[test]
    fn test_parse_rows() {
        assert!(parse_rows("").unwrap().is_empty());
        assert_eq!(parse_rows(r#"[{"a":1},{"a":2}]"#).unwrap().len(), 2);
        assert_eq!(parse_rows(r#"{"a":1}"#).unwrap().len(), 1);
        assert!(parse_rows("<html>").is_err());
    }

    #[test]
    fn test_rows_use_snake_case_columns() {
        let entry = HistoryEntry::new(TimerMode::Break, 5, Utc::now());
        let row = HistoryRow {
            id: &entry.id,
            user_id: "u1",
            session_type: entry.session_type,
            duration_minutes: entry.duration_minutes,
            completed_at: entry.completed_at,
        };
        let value = serde_json::to_value(&row).unwrap();

        assert_eq!(value["session_type"], "break");
        assert_eq!(value["duration_minutes"], 5);
        assert_eq!(value["user_id"], "u1");
    }

    #[test]
    fn test_schema_creates_all_tables() {
        for table in [GARDEN_TABLE, HISTORY_TABLE, TODOS_TABLE] {
            assert!(SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
    }
}
