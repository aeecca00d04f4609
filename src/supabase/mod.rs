//! Blocking client for the hosted Supabase project.
//!
//! Table access goes through PostgREST (`/rest/v1`), user management through
//! the GoTrue admin API (`/auth/v1/admin`) and bucket listing through the
//! storage API. Every request carries the project key twice, as `apikey` and
//! as a bearer token, which is what the gateway expects.

use std::time::Duration;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::SupabaseCredentials;
use crate::store::{Filter, Query, Row, RowStore};

pub mod auth;
pub mod error;

pub use auth::AuthUser;
pub use error::SupabaseError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct SupabaseClient {
    agent: ureq::Agent,
    base_url: String,
    key: String,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    pub fn new(credentials: &SupabaseCredentials) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self::with_agent(agent, credentials)
    }

    pub fn with_agent(agent: ureq::Agent, credentials: &SupabaseCredentials) -> Self {
        Self {
            agent,
            base_url: credentials.url.trim_end_matches('/').to_string(),
            key: credentials.key.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}{}", self.base_url, path))
            .set("apikey", &self.key)
            .set("Authorization", &format!("Bearer {}", self.key))
            .set("Accept", "application/json")
    }

    fn send(
        &self,
        request: ureq::Request,
        body: Option<&Value>,
    ) -> Result<ureq::Response, SupabaseError> {
        let method = request.method().to_string();
        let path = strip_query(request.url()).to_string();
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        match result {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, response)) => {
                Err(SupabaseError::from_status(&method, &path, status, response))
            }
            Err(ureq::Error::Transport(transport)) => Err(SupabaseError::Transport {
                method,
                path,
                message: transport.to_string(),
            }),
        }
    }

    fn decode<T: DeserializeOwned>(response: ureq::Response) -> Result<T, SupabaseError> {
        let path = strip_query(response.get_url()).to_string();
        response.into_json::<T>().map_err(|err| SupabaseError::Decode {
            path,
            message: err.to_string(),
        })
    }

    fn table_request(&self, method: &str, table: &str, filters: &[Filter]) -> ureq::Request {
        let mut request = self.request(method, &format!("/rest/v1/{table}"));
        for filter in filters {
            request = request.query(filter.column(), &filter.operator());
        }
        request
    }

    /// Calls a Postgres function exposed through PostgREST, e.g. `exec_sql`.
    pub fn rpc(&self, function: &str, args: &Value) -> Result<Value, SupabaseError> {
        let request = self.request("POST", &format!("/rest/v1/rpc/{function}"));
        let response = self.send(request, Some(args))?;
        let text = response.into_string().map_err(|err| SupabaseError::Decode {
            path: format!("/rest/v1/rpc/{function}"),
            message: err.to_string(),
        })?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| SupabaseError::Decode {
            path: format!("/rest/v1/rpc/{function}"),
            message: err.to_string(),
        })
    }

    pub fn list_buckets(&self) -> Result<Vec<Value>, SupabaseError> {
        let response = self.send(self.request("GET", "/storage/v1/bucket"), None)?;
        Self::decode(response)
    }
}

impl RowStore for SupabaseClient {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let mut request = self
            .table_request("GET", table, &query.filters)
            .query("select", query.columns.as_deref().unwrap_or("*"));
        if let Some((column, ascending)) = &query.order {
            let direction = if *ascending { "asc" } else { "desc" };
            request = request.query("order", &format!("{column}.{direction}"));
        }
        if let Some(limit) = query.limit {
            request = request.query("limit", &limit.to_string());
        }
        if let Some(offset) = query.offset {
            request = request.query("offset", &offset.to_string());
        }
        let response = self.send(request, None)?;
        Ok(Self::decode(response)?)
    }

    fn insert(&self, table: &str, rows: &[Row]) -> Result<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .table_request("POST", table, &[])
            .set("Prefer", "return=representation");
        let body = Value::Array(rows.iter().cloned().map(Value::Object).collect());
        let response = self.send(request, Some(&body))?;
        Ok(Self::decode(response)?)
    }

    fn insert_minimal(&self, table: &str, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = self
            .table_request("POST", table, &[])
            .set("Prefer", "return=minimal");
        let body = Value::Array(rows.iter().cloned().map(Value::Object).collect());
        self.send(request, Some(&body))?;
        Ok(())
    }

    fn update(&self, table: &str, filters: &[Filter], patch: &Row) -> Result<usize> {
        let request = self
            .table_request("PATCH", table, filters)
            .set("Prefer", "return=representation");
        let response = self.send(request, Some(&Value::Object(patch.clone())))?;
        let rows: Vec<Row> = Self::decode(response)?;
        Ok(rows.len())
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        let request = self
            .table_request("DELETE", table, filters)
            .set("Prefer", "return=representation");
        let response = self.send(request, None)?;
        let rows: Vec<Row> = Self::decode(response)?;
        Ok(rows.len())
    }

    fn count(&self, table: &str) -> Result<u64> {
        let request = self
            .table_request("HEAD", table, &[])
            .query("select", "*")
            .set("Prefer", "count=exact");
        let response = self.send(request, None)?;
        let header = response.header("Content-Range").unwrap_or_default().to_string();
        parse_content_range(&header).ok_or_else(|| {
            anyhow::anyhow!("{table}: missing row count in Content-Range {header:?}")
        })
    }
}

/// Extracts the total from a PostgREST `Content-Range` header such as
/// `0-24/3573` or `*/0`. An unknown total (`*/*`) yields `None`.
pub fn parse_content_range(header: &str) -> Option<u64> {
    let (_, total) = header.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
