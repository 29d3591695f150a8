use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::PhotoConfig;
use crate::core::contact::{InlineImage, decode_base64_chunked};
use crate::error::{Error, Result};

const UPLOAD_FILE_NAME: &str = "photo.jpg";
const UPLOAD_MIME: &str = "image/jpeg";

/// What to send to the image host.
#[derive(Debug, Clone, Copy)]
pub enum UploadSource<'a> {
    /// A `data:` URL, or bare base64 text.
    DataUrl(&'a str),
    /// Already-decoded image bytes.
    Blob(&'a [u8]),
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HostErrorBody {
    error: Option<HostError>,
}

#[derive(Debug, Deserialize)]
struct HostError {
    message: Option<String>,
}

/// Uploads and destroys contact photos on a Cloudinary-style image host.
pub struct PhotoGateway {
    host: String,
    cloud_name: String,
    upload_preset: String,
    http: Client,
}

impl PhotoGateway {
    pub fn new(config: &PhotoConfig) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.trim().to_string(),
            upload_preset: config.upload_preset.trim().to_string(),
            http,
        })
    }

    /// Fails unless both credentials are present. Checked before every request.
    fn credentials(&self) -> Result<(&str, &str)> {
        if self.upload_preset.is_empty() {
            return Err(Error::Config("image host upload preset is not set".into()));
        }
        if self.cloud_name.is_empty() {
            return Err(Error::Config("image host cloud name is not set".into()));
        }
        Ok((&self.cloud_name, &self.upload_preset))
    }

    pub async fn upload_image(&self, image: &InlineImage) -> Result<String> {
        self.upload_photo(UploadSource::Blob(&image.data)).await
    }

    /// Upload a photo and return its durable secure URL.
    pub async fn upload_photo(&self, source: UploadSource<'_>) -> Result<String> {
        let (cloud, preset) = self.credentials()?;

        let bytes = match source {
            UploadSource::DataUrl(text) => {
                let payload = match text.split_once(',') {
                    Some((_, payload)) if text.starts_with("data:") => payload,
                    _ => text,
                };
                decode_base64_chunked(payload)?
            }
            UploadSource::Blob(data) => data.to_vec(),
        };
        log::info!("Uploading photo ({} bytes)", bytes.len());

        let part = Part::bytes(bytes)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(UPLOAD_MIME)?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", preset.to_string());

        let url = format!("{}/v1_1/{}/image/upload", self.host, cloud);
        let resp = self.http.post(&url).multipart(form).send().await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<HostErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            log::error!("Image host rejected upload ({}): {}", status, text);
            return Err(Error::Rejected {
                status,
                message: format!("Failed to upload photo: {}", message),
            });
        }

        let body: UploadResponse = serde_json::from_str(&text)?;
        let secure_url = body
            .secure_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Protocol("upload response has no secure_url".into()))?;
        log::info!("Photo uploaded: {}", secure_url);
        Ok(secure_url)
    }

    /// Destroy a hosted photo by URL. Empty URLs are ignored.
    pub async fn delete_photo(&self, url: &str) -> Result<()> {
        if url.is_empty() {
            return Ok(());
        }
        let (cloud, _) = self.credentials()?;
        let public_id = public_id_from_url(url);
        log::info!("Deleting photo {}", public_id);

        let endpoint = format!("{}/v1_1/{}/image/destroy", self.host, cloud);
        let resp = self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({ "public_id": public_id }))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Rejected {
                status,
                message: format!("Failed to delete photo: {}", status.as_u16()),
            })
        }
    }
}

/// Last path segment of the URL, up to its first `.`.
pub fn public_id_from_url(url: &str) -> &str {
    let segment = url.rsplit('/').next().unwrap_or(url);
    segment.split('.').next().unwrap_or(segment)
}
