//! Image encoding: rasterised pages → PNG bytes → provider payloads.
//!
//! PNG is used for rasterised PDF pages because it is lossless; JPEG
//! artefacts around glyph edges measurably hurt recognition at typical
//! render sizes. Image files given directly by the caller are sent as-is
//! with their own MIME type.

use crate::output::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(PageImage::png(buf))
}

/// `data:{mime};base64,{payload}` for OpenAI-style `image_url` parts.
pub fn to_data_url(image: &PageImage) -> String {
    format!("data:{};base64,{}", image.mime_type, STANDARD.encode(&image.data))
}

/// Image attachment for edgequake-llm providers.
///
/// `detail: "high"` lets GPT-4-class models tile the page at full
/// resolution; without it fine print and small tables are lost.
pub fn to_image_data(image: &PageImage) -> ImageData {
    ImageData::new(STANDARD.encode(&image.data), image.mime_type.as_str()).with_detail("high")
}
