//! Fetch image attachments and inline them as base64 data URLs.

use crate::ImageRef;

use base64::Engine as _;
use std::time::Duration;

/// Default per-image download timeout.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Used when neither the response nor the attachment declares a type.
const FALLBACK_MIME_TYPE: &str = "image/png";

/// Downloads images for vision requests.
///
/// Every failure (timeout, non-2xx, transport error) yields `None`; the caller
/// drops that image and keeps going.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    http: reqwest::Client,
    timeout: Duration,
}

impl ImageFetcher {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Fetch one image as a `data:<mime>;base64,<payload>` URL.
    pub async fn fetch_data_url(&self, image: &ImageRef) -> Option<String> {
        let response = match self
            .http
            .get(&image.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(%error, url = %image.url, "failed to download image");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, url = %image.url, "image download returned non-success status");
            return None;
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .or_else(|| Some(image.content_type.clone()).filter(|value| !value.is_empty()))
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(%error, url = %image.url, "failed to read image bytes");
                return None;
            }
        };

        tracing::debug!(url = %image.url, mime = %mime_type, size = bytes.len(), "downloaded image");

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Some(format!("data:{mime_type};base64,{encoded}"))
    }

    /// Fetch all images, keeping input order and skipping failures.
    pub async fn fetch_all(&self, images: &[ImageRef]) -> Vec<String> {
        let mut urls = Vec::with_capacity(images.len());
        for image in images {
            if let Some(url) = self.fetch_data_url(image).await {
                urls.push(url);
            }
        }
        urls
    }
}
