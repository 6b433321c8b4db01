//! Bottle photo handling.
//!
//! Uploads are checked before anything is stored (size, extension, sniffed
//! format, dimensions, full decode). Photos over 1 MB are then flattened onto
//! white, shrunk to fit 800x600 and re-encoded as JPEG.

use crate::validation::ValidationError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Largest accepted upload
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Largest accepted width or height
pub const MAX_IMAGE_DIMENSION: u32 = 4000;

/// Uploads above this size are recompressed
pub const COMPRESS_THRESHOLD_BYTES: usize = 1024 * 1024;

pub const TARGET_WIDTH: u32 = 800;
pub const TARGET_HEIGHT: u32 = 600;
pub const JPEG_QUALITY: u8 = 85;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Raw file as received in the `image` multipart part.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Image ready to be written to media storage.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Whether the bytes were re-encoded
    pub compressed: bool,
}

/// Validate an upload and compress it if needed, on the blocking pool.
pub async fn process_upload(upload: ImageUpload) -> Result<ProcessedImage, ValidationError> {
    tokio::task::spawn_blocking(move || prepare_image(upload))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "image processing task failed");
            ValidationError::ImageProcessing
        })?
}

/// Validate an upload, then compress it when it is over the threshold.
pub fn prepare_image(upload: ImageUpload) -> Result<ProcessedImage, ValidationError> {
    let image = validate_image(&upload)?;
    let (width, height) = (image.width(), image.height());

    if upload.bytes.len() <= COMPRESS_THRESHOLD_BYTES {
        return Ok(ProcessedImage {
            file_name: upload.file_name,
            bytes: upload.bytes,
            width,
            height,
            compressed: false,
        });
    }

    let compressed = compress(&image)?;
    tracing::debug!(
        file = %upload.file_name,
        original_bytes = upload.bytes.len(),
        compressed_bytes = compressed.len(),
        "compressed image"
    );
    let resized = fit_within(width, height, TARGET_WIDTH, TARGET_HEIGHT);
    Ok(ProcessedImage {
        file_name: compressed_name(&upload.file_name),
        bytes: compressed,
        width: resized.0,
        height: resized.1,
        compressed: true,
    })
}

/// Run every upload check and return the decoded image.
pub fn validate_image(upload: &ImageUpload) -> Result<DynamicImage, ValidationError> {
    if upload.bytes.len() > MAX_IMAGE_BYTES {
        return Err(ValidationError::ImageTooLarge {
            max_mb: MAX_IMAGE_BYTES / (1024 * 1024),
        });
    }

    let extension = Path::new(&upload.file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);
    if !extension.is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str())) {
        return Err(ValidationError::ImageExtension);
    }

    let format = sniff_format(&upload.bytes)?;

    let (width, height) = ImageReader::with_format(Cursor::new(&upload.bytes), format)
        .into_dimensions()
        .map_err(|_| ValidationError::ImageCorrupt)?;
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(ValidationError::ImageDimensions {
            max: MAX_IMAGE_DIMENSION,
        });
    }

    image::load_from_memory_with_format(&upload.bytes, format)
        .map_err(|_| ValidationError::ImageCorrupt)
}

/// Identify the content type from magic bytes, ignoring the file name.
fn sniff_format(bytes: &[u8]) -> Result<ImageFormat, ValidationError> {
    match image::guess_format(bytes) {
        Ok(
            format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP),
        ) => Ok(format),
        Ok(other) => Err(ValidationError::ImageFormat(
            other.to_mime_type().to_string(),
        )),
        Err(_) => Err(ValidationError::ImageFormat(
            "application/octet-stream".to_string(),
        )),
    }
}

/// Flatten, shrink to fit the target box and encode as JPEG.
fn compress(image: &DynamicImage) -> Result<Vec<u8>, ValidationError> {
    let mut rgb = if image.color().has_alpha() {
        flatten_on_white(image)
    } else {
        image.to_rgb8()
    };

    let (width, height) = fit_within(rgb.width(), rgb.height(), TARGET_WIDTH, TARGET_HEIGHT);
    if (width, height) != rgb.dimensions() {
        rgb = imageops::resize(&rgb, width, height, FilterType::Lanczos3);
    }

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    rgb.write_with_encoder(encoder).map_err(|e| {
        tracing::warn!(error = %e, "jpeg encoding failed");
        ValidationError::ImageProcessing
    })?;
    Ok(buf)
}

/// Composite every pixel over an opaque white background.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Proportional size that fits `max_width` x `max_height`. Never upscales;
/// the scaled size is truncated.
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let ratio = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    if ratio >= 1.0 {
        return (width, height);
    }
    (
        ((width as f64 * ratio) as u32).max(1),
        ((height as f64 * ratio) as u32).max(1),
    )
}

/// `photo.png` becomes `photo_compressed.jpg`
fn compressed_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!("{stem}_compressed.jpg")
}
