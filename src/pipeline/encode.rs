//! Image encoding: [`MenuImage`] → base64 `ImageData` for vision requests.
//!
//! The photo is forwarded in its original format; re-encoding a JPEG camera
//! frame to PNG would only inflate the request. `detail: "high"` lets
//! GPT-4-class models tile the image so small menu print stays legible.

use crate::menu::MenuImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Encode a menu photo as base64 ready for a multimodal chat message.
pub fn encode_image(image: &MenuImage) -> ImageData {
    let b64 = STANDARD.encode(image.bytes());
    debug!("Encoded {} → {} bytes base64", image.media_type(), b64.len());

    ImageData::new(b64, image.media_type()).with_detail("high")
}
