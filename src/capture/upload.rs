//! Multipart upload of capture artefacts to the media ingest endpoint.
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::TransportError;

/// Both parts go under this field name.
const FILES_FIELD: &str = "files";

/// Sends a still and a video to the media ingest endpoint.
#[derive(Clone, Debug)]
pub struct MediaUploader {
    client: Client,
    url: String,
}

impl MediaUploader {
    pub fn new(url: String, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    async fn part(path: &Path, mime: &str) -> Result<Part, TransportError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|error| TransportError::File {
                path: path.display().to_string(),
                error,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Part::bytes(data).file_name(name).mime_str(mime)?)
    }

    /// Uploads both files in one request and returns the endpoint's JSON
    /// reply.
    pub async fn upload(
        &self,
        image: &Path,
        video: &Path,
    ) -> Result<Value, TransportError> {
        let form = Form::new()
            .part(FILES_FIELD, Self::part(image, "image/jpeg").await?)
            .part(FILES_FIELD, Self::part(video, "video/mp4").await?);

        debug!(url = %self.url, "uploading capture");
        let response =
            self.client.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.json().await?;
        info!(%status, "capture uploaded");

        Ok(body)
    }
}
