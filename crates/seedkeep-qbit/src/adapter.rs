//! `TorrentEngine` implementation over the qBittorrent Web API v2.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use seedkeep_torrent_core::{
    AddRequest, ContentIdentity, SubmitAck, TaskFile, TaskSnapshot, TorrentEngine, TorrentResult,
    TorrentSource, TrackerEntry,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::convert::{to_file, to_snapshot, to_tracker};
use crate::error::{QbitError, QbitResult};
use crate::types::{FileInfo, QbitSettings, TorrentInfo, TrackerInfo};

const LOGIN_OK: &str = "Ok.";

/// Cookie-session client for a single qBittorrent daemon.
#[derive(Clone)]
pub struct QbitEngine {
    http: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl QbitEngine {
    /// Build the HTTP client; no request is sent until [`QbitEngine::login`].
    ///
    /// # Errors
    ///
    /// Returns [`QbitError::ClientBuild`] when the TLS backend cannot be initialised.
    pub fn new(mut settings: QbitSettings) -> QbitResult<Self> {
        if !settings.base_url.path().ends_with('/') {
            let path = format!("{}/", settings.base_url.path());
            settings.base_url.set_path(&path);
        }
        let mut headers = HeaderMap::new();
        let referer = HeaderValue::from_str(settings.base_url.as_str()).map_err(|_| {
            QbitError::InvalidUrl {
                value: settings.base_url.to_string(),
            }
        })?;
        headers.insert(REFERER, referer);

        let http = Client::builder()
            .cookie_store(true)
            .timeout(settings.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|source| QbitError::ClientBuild { source })?;

        Ok(Self {
            http,
            base_url: settings.base_url,
            username: settings.username,
            password: settings.password,
        })
    }

    /// Open a session; the cookie is kept by the client.
    ///
    /// # Errors
    ///
    /// Returns [`QbitError::LoginRejected`] when the daemon refuses the credentials.
    pub async fn login(&self) -> QbitResult<()> {
        let url = self.endpoint("auth/login")?;
        let response = self
            .http
            .post(url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|source| QbitError::Transport {
                operation: "auth.login",
                source,
            })?;
        if response.status() == StatusCode::FORBIDDEN {
            return Err(QbitError::LoginRejected);
        }
        let body = read_text("auth.login", ensure_success("auth.login", response)?).await?;
        if body.trim() != LOGIN_OK {
            return Err(QbitError::LoginRejected);
        }
        info!(engine = %self.base_url, "engine session opened");
        Ok(())
    }

    fn endpoint(&self, method: &str) -> QbitResult<Url> {
        self.base_url
            .join(&format!("api/v2/{method}"))
            .map_err(|_| QbitError::InvalidUrl {
                value: format!("{}api/v2/{method}", self.base_url),
            })
    }

    /// Send a request, logging in again once if the session expired.
    async fn send<F>(&self, operation: &'static str, build: F) -> QbitResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let response = build(&self.http)
            .send()
            .await
            .map_err(|source| QbitError::Transport { operation, source })?;
        if response.status() != StatusCode::FORBIDDEN {
            return ensure_success(operation, response);
        }

        debug!(operation, "engine session expired; logging in again");
        self.login().await?;
        let retried = build(&self.http)
            .send()
            .await
            .map_err(|source| QbitError::Transport { operation, source })?;
        ensure_success(operation, retried)
    }

    async fn post_form(
        &self,
        operation: &'static str,
        method: &str,
        form: &[(&str, &str)],
    ) -> QbitResult<()> {
        let url = self.endpoint(method)?;
        self.send(operation, |client| client.post(url.clone()).form(form))
            .await?;
        Ok(())
    }

    /// POST to `primary`, falling back to `renamed` when the daemon no longer knows it.
    async fn post_hashes_with_fallback(
        &self,
        operation: &'static str,
        primary: &str,
        renamed: &str,
        identity: &ContentIdentity,
    ) -> QbitResult<()> {
        let form = [("hashes", identity.as_str())];
        match self.post_form(operation, primary, &form).await {
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND.as_u16()) => {
                debug!(operation, primary, renamed, "endpoint missing; using fallback");
                self.post_form(operation, renamed, &form).await
            }
            other => other,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        query: &[(&str, &str)],
    ) -> QbitResult<T> {
        let url = self.endpoint(method)?;
        let response = self
            .send(operation, |client| client.get(url.clone()).query(query))
            .await?;
        let body = read_text(operation, response).await?;
        serde_json::from_str(&body).map_err(|source| QbitError::Decode { operation, source })
    }

    async fn add(&self, request: &AddRequest) -> QbitResult<SubmitAck> {
        let operation = "torrents.add";
        let url = self.endpoint("torrents/add")?;
        let fields = add_fields(request);

        let response = match &request.source {
            TorrentSource::File { path } => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|source| QbitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                let file_name = path.file_name().map_or_else(
                    || "upload.torrent".to_string(),
                    |name| name.to_string_lossy().into_owned(),
                );
                self.send(operation, |client| {
                    let part = Part::bytes(bytes.clone())
                        .file_name(file_name.clone())
                        .mime_str("application/x-bittorrent")
                        .unwrap_or_else(|_| Part::bytes(bytes.clone()));
                    let form = fields
                        .iter()
                        .fold(Form::new(), |form, (key, value)| {
                            form.text(*key, value.clone())
                        })
                        .part("torrents", part);
                    client.post(url.clone()).multipart(form)
                })
                .await
            }
            TorrentSource::Magnet { uri: link } | TorrentSource::Url { url: link } => {
                let mut form: Vec<(&str, String)> = fields.clone();
                form.push(("urls", link.clone()));
                self.send(operation, |client| client.post(url.clone()).form(&form))
                    .await
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(QbitError::Status { status: 415, .. }) => {
                return Ok(SubmitAck::Rejected {
                    message: "torrent file is not valid".to_string(),
                });
            }
            Err(err) => return Err(err),
        };
        let body = read_text(operation, response).await?;
        let trimmed = body.trim();
        if trimmed == LOGIN_OK {
            Ok(SubmitAck::Accepted)
        } else {
            Ok(SubmitAck::Rejected {
                message: trimmed.to_string(),
            })
        }
    }
}

/// Text fields shared by link and file submissions.
fn add_fields(request: &AddRequest) -> Vec<(&'static str, String)> {
    let paused = request.paused.to_string();
    let mut fields = vec![
        ("savepath", request.save_path.display().to_string()),
        ("paused", paused.clone()),
        ("stopped", paused),
        ("tags", request.tag.clone()),
    ];
    if let Some(ratio) = request.ratio_limit {
        fields.push(("ratioLimit", ratio.to_string()));
    }
    if let Some(limit) = request.seed_time_limit {
        fields.push(("seedingTimeLimit", (limit.as_secs() / 60).to_string()));
    }
    fields
}

fn ensure_success(operation: &'static str, response: Response) -> QbitResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(QbitError::Status {
            operation,
            status: status.as_u16(),
        })
    }
}

async fn read_text(operation: &'static str, response: Response) -> QbitResult<String> {
    response
        .text()
        .await
        .map_err(|source| QbitError::Transport { operation, source })
}

#[async_trait]
impl TorrentEngine for QbitEngine {
    async fn submit(&self, request: AddRequest) -> TorrentResult<SubmitAck> {
        let ack = self
            .add(&request)
            .await
            .map_err(|err| err.into_torrent("submit", None))?;
        if let SubmitAck::Rejected { message } = &ack {
            warn!(tag = %request.tag, response = %message, "engine rejected submission");
        }
        Ok(ack)
    }

    async fn list(&self, identity: Option<&ContentIdentity>) -> TorrentResult<Vec<TaskSnapshot>> {
        let query: Vec<(&str, &str)> = identity
            .map(|identity| vec![("hashes", identity.as_str())])
            .unwrap_or_default();
        let entries: Vec<TorrentInfo> = self
            .get_json("torrents.info", "torrents/info", &query)
            .await
            .map_err(|err| err.into_torrent("list", identity))?;
        Ok(entries.into_iter().filter_map(to_snapshot).collect())
    }

    async fn pause(&self, identity: &ContentIdentity) -> TorrentResult<()> {
        self.post_hashes_with_fallback("torrents.pause", "torrents/pause", "torrents/stop", identity)
            .await
            .map_err(|err| err.into_torrent("pause", Some(identity)))
    }

    async fn resume(&self, identity: &ContentIdentity) -> TorrentResult<()> {
        self.post_hashes_with_fallback(
            "torrents.resume",
            "torrents/resume",
            "torrents/start",
            identity,
        )
        .await
        .map_err(|err| err.into_torrent("resume", Some(identity)))
    }

    async fn recheck(&self, identity: &ContentIdentity) -> TorrentResult<()> {
        self.post_form(
            "torrents.recheck",
            "torrents/recheck",
            &[("hashes", identity.as_str())],
        )
        .await
        .map_err(|err| err.into_torrent("recheck", Some(identity)))
    }

    async fn reannounce(&self, identity: &ContentIdentity) -> TorrentResult<()> {
        self.post_form(
            "torrents.reannounce",
            "torrents/reannounce",
            &[("hashes", identity.as_str())],
        )
        .await
        .map_err(|err| err.into_torrent("reannounce", Some(identity)))
    }

    async fn remove(&self, identity: &ContentIdentity, delete_files: bool) -> TorrentResult<()> {
        let delete = if delete_files { "true" } else { "false" };
        self.post_form(
            "torrents.delete",
            "torrents/delete",
            &[("hashes", identity.as_str()), ("deleteFiles", delete)],
        )
        .await
        .map_err(|err| err.into_torrent("remove", Some(identity)))
    }

    async fn trackers(&self, identity: &ContentIdentity) -> TorrentResult<Vec<TrackerEntry>> {
        let entries: Vec<TrackerInfo> = self
            .get_json(
                "torrents.trackers",
                "torrents/trackers",
                &[("hash", identity.as_str())],
            )
            .await
            .map_err(|err| err.into_torrent("trackers", Some(identity)))?;
        Ok(entries.into_iter().map(to_tracker).collect())
    }

    async fn remove_trackers(
        &self,
        identity: &ContentIdentity,
        urls: &[String],
    ) -> TorrentResult<()> {
        if urls.is_empty() {
            return Ok(());
        }
        let joined = urls.join("|");
        self.post_form(
            "torrents.remove_trackers",
            "torrents/removeTrackers",
            &[("hash", identity.as_str()), ("urls", joined.as_str())],
        )
        .await
        .map_err(|err| err.into_torrent("remove_trackers", Some(identity)))
    }

    async fn files(&self, identity: &ContentIdentity) -> TorrentResult<Vec<TaskFile>> {
        let entries: Vec<FileInfo> = self
            .get_json(
                "torrents.files",
                "torrents/files",
                &[("hash", identity.as_str())],
            )
            .await
            .map_err(|err| err.into_torrent("files", Some(identity)))?;
        Ok(entries.into_iter().map(to_file).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn request(paused: bool) -> AddRequest {
        AddRequest {
            source: TorrentSource::Magnet {
                uri: "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567".into(),
            },
            save_path: PathBuf::from("/downloads/42"),
            paused,
            ratio_limit: Some(1.5),
            seed_time_limit: Some(Duration::from_secs(7_200)),
            tag: "42".into(),
        }
    }

    #[test]
    fn add_fields_carry_pause_and_limits() {
        let fields = add_fields(&request(true));
        let lookup = |key: &str| {
            fields
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(lookup("savepath"), Some("/downloads/42"));
        assert_eq!(lookup("paused"), Some("true"));
        assert_eq!(lookup("stopped"), Some("true"));
        assert_eq!(lookup("tags"), Some("42"));
        assert_eq!(lookup("ratioLimit"), Some("1.5"));
        assert_eq!(lookup("seedingTimeLimit"), Some("120"));
    }

    #[test]
    fn add_fields_omit_unset_limits() {
        let mut unlimited = request(false);
        unlimited.ratio_limit = None;
        unlimited.seed_time_limit = None;
        let fields = add_fields(&unlimited);
        assert!(fields.iter().all(|(name, _)| *name != "ratioLimit"));
        assert!(fields.iter().all(|(name, _)| *name != "seedingTimeLimit"));
        assert!(fields.contains(&("paused", "false".to_string())));
    }
}
