//! Input resolution: turn a user-supplied path or URL into a [`MenuImage`].
//!
//! This is the capture-source boundary for non-interactive callers. Local
//! files are read and sniffed by magic bytes; URLs are downloaded with a
//! timeout and typed from the `Content-Type` header, falling back to sniffing
//! when the server sends something generic. Media-type validation itself
//! happens in the extractor, so a non-image still enters the pipeline and
//! fails there with `InvalidInput`.

use crate::error::MenuError;
use crate::menu::{sniff_media_type, MenuImage};
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a [`MenuImage`].
pub async fn resolve_image(input: &str, timeout_secs: u64) -> Result<MenuImage, MenuError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        let image = MenuImage::from_path(input).await?;
        debug!("Loaded local image: {} ({})", input, image.media_type());
        Ok(image)
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<MenuImage, MenuError> {
    info!("Downloading menu image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MenuError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            MenuError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            MenuError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(MenuError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let header_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| MenuError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let media_type = pick_media_type(header_type.as_deref(), &bytes);
    info!("Downloaded {} bytes ({})", bytes.len(), media_type);
    Ok(MenuImage::new(bytes.to_vec(), media_type))
}

/// Prefer a specific `image/*` Content-Type; otherwise sniff the bytes.
fn pick_media_type(header: Option<&str>, bytes: &[u8]) -> String {
    let declared = header
        .and_then(|h| h.split(';').next())
        .map(|h| h.trim().to_ascii_lowercase());

    match declared {
        Some(mt) if mt.starts_with("image/") => mt,
        _ => sniff_media_type(bytes),
    }
}
