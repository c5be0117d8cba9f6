use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use std::path::Path;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const JPEG_QUALITY: u8 = 75;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("could not decode image: {0}")]
    Decode(image::ImageError),
    #[error("could not encode image as JPEG: {0}")]
    Encode(image::ImageError),
}

/// Checks the upload's file name against the jpg/jpeg/png allow-list.
pub fn is_supported_upload(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Decodes whatever was uploaded, drops any alpha channel and re-encodes as JPEG.
pub fn reencode_as_jpeg(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(bytes).map_err(ImageError::Decode)?;
    let rgb = decoded.to_rgb8();
    log::debug!("🖼️ Decoded upload: {}x{}", rgb.width(), rgb.height());

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(ImageError::Encode)?;

    Ok(jpeg)
}
