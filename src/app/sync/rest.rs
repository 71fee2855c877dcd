//! # REST Remote
//!
//! HTTP client for a PostgREST-style authority with an object storage
//! endpoint for photos.
//!
//! | Call | Request |
//! |------|---------|
//! | upsert | `POST /rest/v1/{table}?on_conflict=id` with `Prefer: resolution=merge-duplicates` |
//! | delete | `DELETE /rest/v1/{table}?id=eq.{id}` |
//! | select | `GET /rest/v1/{table}?select=*&user_id=eq.{owner}` |
//! | photo  | `POST /storage/v1/object/{bucket}/{owner}/{project}/{photo}.jpg` with `x-upsert: true` |
//!
//! Every request carries the project `apikey` header and a bearer token: the
//! signed-in user's access token when one is set, the api key otherwise.

use crate::app::sync::remote::{BlobStore, RemoteError, RemoteStore};
use crate::app::sync::rows;
use crate::shared::survey::Photo;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug)]
pub struct RestRemote {
    client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
    timeout: Duration,
    access_token: RwLock<Option<String>>,
}

impl RestRemote {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bucket: bucket.into(),
            timeout,
            access_token: RwLock::new(None),
        })
    }

    /// Set or clear the signed-in user's access token
    pub fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn bearer(&self) -> String {
        let token = match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        token.unwrap_or_else(|| self.api_key.clone())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(self.timeout)
            } else {
                RemoteError::Transport(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteStore for RestRemote {
    async fn upsert(&self, table: &str, row: Value) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&row);
        self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{}", id))]);
        self.send(request).await?;
        Ok(())
    }

    async fn select_by_owner(&self, table: &str, owner_id: &str) -> Result<Vec<Value>, RemoteError> {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*".to_string()), ("user_id", format!("eq.{}", owner_id))]);
        let response = self.send(request).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for RestRemote {
    async fn upload_photo(&self, owner_id: &str, photo: &Photo) -> Result<String, RemoteError> {
        let path = rows::photo_path(owner_id, photo);
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let request = self
            .client
            .post(url)
            .header("Content-Type", "image/jpeg")
            .header("x-upsert", "true")
            .body(photo.image.clone());
        self.send(request).await?;
        Ok(path)
    }
}
