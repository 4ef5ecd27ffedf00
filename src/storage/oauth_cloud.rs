//! Snapshot storage on an OAuth-protected cloud-storage service.
//!
//! Speaks the Dropbox v2 HTTP API: file bodies go through the content host with
//! the call arguments in the `Dropbox-API-Arg` header, metadata calls go through
//! the API host as JSON.
//!
//! | Reply | Result |
//! |-------|--------|
//! | transport failure | `Network` |
//! | 401 | session marked expired, `Auth(Expired)` |
//! | 409 `path/not_found` | `NotFound` (empty list for `list`) |
//! | 409 `path/conflict` | `AlreadyExists` |
//! | anything else | `Remote` |
//!
//! Nothing is retried here; retry timing belongs to the user.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::HeaderValue, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{filesystem::sort_entries, Result, SnapshotEntry, StorageBackend, StorageBackendKind};
use crate::{
    config::{ConfigError, OAuthConfig},
    errors::{AuthError, BackendError},
    naming::{self, SNAPSHOT_EXTENSION},
    oauth::OAuthSession,
};

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

#[derive(Debug, Deserialize)]
struct ListFolderPage {
    entries: Vec<RemoteEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct RemoteEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    error_summary: String,
}

#[derive(Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'a str,
    autorename: bool,
    mute: bool,
}

pub struct OAuthCloudBackend {
    session: Arc<OAuthSession>,
    http: Client,
    api_base: Url,
    content_base: Url,
    folder: String,
}

impl std::fmt::Debug for OAuthCloudBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCloudBackend")
            .field("api_base", &self.api_base.as_str())
            .field("folder", &self.folder)
            .field("session", &self.session)
            .finish()
    }
}

impl OAuthCloudBackend {
    pub fn new(session: Arc<OAuthSession>, config: &OAuthConfig) -> std::result::Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!("backup-core/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ConfigError::Invalid(format!("failed to create HTTP client: {err}")))?;
        Self::with_http_client(session, config, http)
    }

    pub fn with_http_client(
        session: Arc<OAuthSession>,
        config: &OAuthConfig,
        http: Client,
    ) -> std::result::Result<Self, ConfigError> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|err| ConfigError::Invalid(format!("bad service URL `{raw}`: {err}")))
        };
        Ok(Self {
            session,
            http,
            api_base: parse(&config.api_base_url)?,
            content_base: parse(&config.content_base_url)?,
            folder: normalize_folder(&config.remote_folder),
        })
    }

    pub fn session(&self) -> &Arc<OAuthSession> {
        &self.session
    }

    fn remote_path(&self, name: &str) -> Result<String> {
        if !naming::is_safe_name(name) {
            return Err(BackendError::InvalidName(name.to_string()));
        }
        Ok(format!("{}/{}", self.folder, name))
    }

    fn endpoint(base: &Url, path: &str) -> Result<Url> {
        base.join(path).map_err(|err| BackendError::Remote {
            status: 0,
            message: format!("invalid endpoint `{path}`: {err}"),
        })
    }

    fn api_arg(value: &impl Serialize) -> Result<HeaderValue> {
        let raw = serde_json::to_string(value).map_err(|err| BackendError::Remote {
            status: 0,
            message: err.to_string(),
        })?;
        HeaderValue::from_str(&raw).map_err(|_| BackendError::InvalidName(raw))
    }

    /// Sends an authorized request and maps every failure into the backend taxonomy.
    async fn send(&self, token: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.bearer_auth(token).send().await.map_err(|err| {
            tracing::warn!(backend = %StorageBackendKind::OAuthCloud, error = %err, "cloud request failed");
            BackendError::Network(err.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.session.mark_expired(token);
            return Err(AuthError::Expired.into());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<RemoteErrorBody>(&body)
            .map(|parsed| parsed.error_summary)
            .unwrap_or(body);
        tracing::warn!(
            backend = %StorageBackendKind::OAuthCloud,
            status = status.as_u16(),
            summary = %message,
            "cloud service rejected request"
        );
        Err(BackendError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    async fn list_page(&self, token: &str, cursor: Option<&str>) -> Result<ListFolderPage> {
        let request = match cursor {
            None => self
                .http
                .post(Self::endpoint(&self.api_base, "/2/files/list_folder")?)
                .json(&json!({
                    "path": self.folder,
                    "recursive": false,
                    "include_deleted": false,
                })),
            Some(cursor) => self
                .http
                .post(Self::endpoint(&self.api_base, "/2/files/list_folder/continue")?)
                .json(&json!({ "cursor": cursor })),
        };
        let response = self.send(token, request).await?;
        response
            .json::<ListFolderPage>()
            .await
            .map_err(|err| BackendError::Network(format!("unreadable listing: {err}")))
    }
}

#[async_trait]
impl StorageBackend for OAuthCloudBackend {
    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::OAuthCloud
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let token = self.session.access_token()?;
        let path = self.remote_path(name)?;
        let arg = Self::api_arg(&UploadArg {
            path: &path,
            mode: "add",
            autorename: false,
            mute: true,
        })?;
        let request = self
            .http
            .post(Self::endpoint(&self.content_base, "/2/files/upload")?)
            .header(API_ARG_HEADER, arg)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec());

        self.send(&token, request)
            .await
            .map_err(|err| classify_conflict(err, name))?;
        tracing::info!(backend = %self.kind(), snapshot = name, bytes = bytes.len(), "snapshot uploaded");
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let token = self.session.access_token()?;
        let path = self.remote_path(name)?;
        let request = self
            .http
            .post(Self::endpoint(&self.content_base, "/2/files/download")?)
            .header(API_ARG_HEADER, Self::api_arg(&json!({ "path": path }))?);

        let response = self
            .send(&token, request)
            .await
            .map_err(|err| classify_conflict(err, name))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| BackendError::Network(format!("download interrupted: {err}")))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self) -> Result<Vec<SnapshotEntry>> {
        let token = self.session.access_token()?;
        let mut entries = Vec::new();
        let mut page = match self.list_page(&token, None).await {
            Ok(page) => page,
            Err(BackendError::Remote { status: 409, message }) if message.contains("not_found") => {
                tracing::debug!(folder = %self.folder, "remote backup folder does not exist yet");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        loop {
            entries.extend(
                page.entries
                    .into_iter()
                    .filter(|entry| entry.tag == "file")
                    .filter(|entry| entry.name.ends_with(&format!(".{SNAPSHOT_EXTENSION}")))
                    .map(|entry| SnapshotEntry {
                        name: entry.name,
                        size_bytes: entry.size,
                    }),
            );
            if !page.has_more {
                break;
            }
            page = self.list_page(&token, Some(page.cursor.as_str())).await?;
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let token = self.session.access_token()?;
        let path = self.remote_path(name)?;
        let request = self
            .http
            .post(Self::endpoint(&self.api_base, "/2/files/delete_v2")?)
            .json(&json!({ "path": path }));
        self.send(&token, request)
            .await
            .map_err(|err| classify_conflict(err, name))?;
        tracing::info!(backend = %self.kind(), snapshot = name, "snapshot deleted");
        Ok(())
    }
}

fn classify_conflict(err: BackendError, name: &str) -> BackendError {
    match err {
        BackendError::Remote { status: 409, ref message } if message.contains("not_found") => {
            BackendError::NotFound(name.to_string())
        }
        BackendError::Remote { status: 409, ref message } if message.contains("conflict") => {
            BackendError::AlreadyExists(name.to_string())
        }
        other => other,
    }
}

/// `"/backups/"` -> `"/backups"`, `"/"` or `""` -> `""` (the account root).
fn normalize_folder(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
