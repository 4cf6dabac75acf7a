//! Purpose: Provide a blocking HTTP client for the clientbook REST surface.
//! Exports: `RemoteClient`, `DEFAULT_TIMEOUT`.
//! Role: Transport used by the CLI and the record book to reach a server.
//! Invariants: Every request carries the configured timeout; none blocks forever.
//! Invariants: Server error envelopes are surfaced verbatim (message + error).
//! Invariants: Transport failures map to `Network`/`Timeout`, never to server kinds.
#![allow(clippy::result_large_err)]

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use super::{ApiResult, RecordApi};
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{ClientId, Record, RecordDraft, RecordId, RecordPatch};
use crate::core::rules::{Field, FieldErrors};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    error: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct Confirmation {
    message: String,
}

#[derive(Deserialize)]
struct Availability {
    available: bool,
}

#[derive(Deserialize)]
struct Health {
    status: String,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            inner: Arc::new(RemoteClientInner {
                base_url,
                agent: build_agent(DEFAULT_TIMEOUT),
            }),
        })
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RemoteClientInner {
                base_url: self.inner.base_url.clone(),
                agent: build_agent(timeout),
            }),
        }
    }

    pub fn health(&self) -> ApiResult<String> {
        let url = self.url(&["health"])?;
        let health: Health = self.request_json("GET", &url, None)?;
        Ok(health.status)
    }

    pub fn list(&self) -> ApiResult<Vec<Record>> {
        let url = self.url(&["records"])?;
        self.request_json("GET", &url, None)
    }

    pub fn get(&self, id: &RecordId) -> ApiResult<Record> {
        let url = self.url(&["records", id.as_str()])?;
        self.request_json("GET", &url, None)
    }

    pub fn create(&self, draft: &RecordDraft) -> ApiResult<Record> {
        self.create_json(&encode(draft)?)
    }

    /// Sends an arbitrary body, leaving all validation to the server.
    pub fn create_json(&self, body: &Value) -> ApiResult<Record> {
        let url = self.url(&["records"])?;
        self.request_json("POST", &url, Some(body))
    }

    pub fn update(&self, id: &RecordId, patch: &RecordPatch) -> ApiResult<Record> {
        self.update_json(id, &encode(patch)?)
    }

    pub fn update_json(&self, id: &RecordId, body: &Value) -> ApiResult<Record> {
        let url = self.url(&["records", id.as_str()])?;
        self.request_json("PUT", &url, Some(body))
    }

    /// Deletes `id` and returns the server's confirmation text.
    pub fn delete(&self, id: &RecordId) -> ApiResult<String> {
        let url = self.url(&["records", id.as_str()])?;
        let confirmation: Confirmation = self.request_json("DELETE", &url, None)?;
        Ok(confirmation.message)
    }

    pub fn client_id_available(&self, client_id: ClientId) -> ApiResult<bool> {
        let url = self.url(&["records", "check-client-id", &client_id.to_string()])?;
        let availability: Availability = self.request_json("GET", &url, None)?;
        Ok(availability.available)
    }

    fn url(&self, segments: &[&str]) -> ApiResult<Url> {
        build_url(&self.inner.base_url, segments)
    }

    fn request_json<R>(&self, method: &str, url: &Url, body: Option<&Value>) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        debug!(method, url = %url, "request being sent");
        let request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        let response = match body {
            None => request.call(),
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => {
                debug!(method, url = %url, status = resp.status(), "response received");
                read_json_response(resp)
            }
            Err(ureq::Error::Status(code, resp)) => {
                debug!(method, url = %url, status = code, "error response received");
                Err(parse_error_response(code, resp))
            }
            Err(ureq::Error::Transport(err)) => Err(transport_error(err)),
        }
    }
}

impl RecordApi for RemoteClient {
    fn list_records(&self) -> ApiResult<Vec<Record>> {
        self.list()
    }

    fn create_record(&self, draft: &RecordDraft) -> ApiResult<Record> {
        self.create(draft)
    }

    fn update_record(&self, id: &RecordId, patch: &RecordPatch) -> ApiResult<Record> {
        self.update(id, patch)
    }

    fn delete_record(&self, id: &RecordId) -> ApiResult<()> {
        self.delete(id).map(|_| ())
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

fn encode<T: serde::Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode request json")
            .with_source(err)
    })
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid server url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Usage).with_message("server url must use http or https scheme")
        );
    }
    if url.cannot_be_a_base() {
        return Err(Error::new(ErrorKind::Usage).with_message("server url cannot be a base"));
    }
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Appends `segments` to the base url's own path prefix (e.g. `/api`).
fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("server url cannot be a base")
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Network)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let kind = error_kind_from_status(status);
    let body = response.into_string().unwrap_or_default();
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) else {
        return Error::new(kind).with_message(format!("server error status {status}"));
    };
    let mut err = Error::new(kind).with_message(
        envelope
            .message
            .unwrap_or_else(|| format!("server error status {status}")),
    );
    if let Some(detail) = envelope.error {
        err = err.with_detail(detail);
    }
    let mut fields = FieldErrors::new();
    for (name, message) in envelope.fields {
        if let Some(field) = Field::parse(&name) {
            fields.insert(field, message);
        }
    }
    if !fields.is_empty() {
        err = err.with_fields(fields);
    }
    err
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 415 | 422 => ErrorKind::Validation,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        408 | 504 => ErrorKind::Timeout,
        503 => ErrorKind::Unavailable,
        _ => ErrorKind::Internal,
    }
}

fn transport_error(err: ureq::Transport) -> Error {
    let timed_out = StdError::source(&err)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|io_err| {
            matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        });
    if timed_out {
        Error::new(ErrorKind::Timeout)
            .with_message("request timed out")
            .with_source(err)
    } else {
        Error::new(ErrorKind::Network)
            .with_message("request failed")
            .with_hint("Check that the server is running and reachable.")
            .with_source(err)
    }
}
