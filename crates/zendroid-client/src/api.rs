//! HTTP calls against the test-agent server.

use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zendroid_core::{ClientError, PollSnapshot, RunId};
use zendroid_settings::ServerSettings;

type Result<T> = std::result::Result<T, ClientError>;

const APK_MIME: &str = "application/vnd.android.package-archive";

/// Response of `POST /upload`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    /// Server-side path to pass to run creation.
    pub path: String,
}

#[derive(Debug, Serialize)]
struct StartRunRequest<'a> {
    apk_path: &'a str,
    test_prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct StartRunResponse {
    #[serde(default)]
    run_id: Option<String>,
}

/// Thin reqwest wrapper. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    legacy_endpoints: bool,
}

impl ApiClient {
    pub fn new(settings: &ServerSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| ClientError::transport(format!("failed to build HTTP client: {e}")))?;
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| ClientError::validation(format!("invalid base url {}: {e}", settings.base_url)))?;
        Ok(Self {
            http,
            base_url,
            legacy_endpoints: settings.legacy_endpoints,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Append `segments` to the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        segment_url(&self.base_url, segments)
    }

    /// Upload an application package as multipart field `file`.
    pub async fn upload(&self, path: &Path) -> Result<UploadReceipt> {
        let is_apk = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"));
        if !is_apk {
            return Err(ClientError::validation(format!(
                "{} is not an .apk file",
                path.display()
            )));
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::validation(format!("invalid file name: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::validation(format!("cannot read {}: {e}", path.display())))?;

        info!(file = %filename, size = bytes.len(), "uploading package");

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str(APK_MIME)
            .map_err(|e| ClientError::transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(self.url(&["upload"])?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("upload failed: {e}")))?;
        decode(resp).await
    }

    /// Ask the server to create a run. No validation, no retry.
    pub async fn create_run(&self, apk_path: &str, test_prompt: &str) -> Result<RunId> {
        let endpoint: &[&str] = if self.legacy_endpoints { &["test"] } else { &["test", "start"] };
        debug!(endpoint = %endpoint.join("/"), "creating run");

        let resp = self
            .http
            .post(self.url(endpoint)?)
            .json(&StartRunRequest {
                apk_path,
                test_prompt,
            })
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("run start failed: {e}")))?;

        let body: StartRunResponse = decode(resp).await?;
        match body.run_id {
            Some(id) if !id.is_empty() => Ok(RunId::from_raw(id)),
            _ => Err(ClientError::transport("run start response has no run_id")),
        }
    }

    /// `GET /test/{run_id}`: one full snapshot.
    pub async fn fetch_status(&self, run_id: &RunId) -> Result<PollSnapshot> {
        let resp = self
            .http
            .get(self.url(&["test", run_id.as_str()])?)
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("status fetch failed: {e}")))?;
        decode(resp).await
    }
}

/// `base` with `segments` appended as encoded path segments. A trailing
/// slash on `base` does not produce an empty segment.
pub(crate) fn segment_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::validation(format!("{base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::from_status(status.as_u16(), &body));
    }
    resp.json::<T>()
        .await
        .map_err(|e| ClientError::transport(format!("invalid response body: {e}")))
}
