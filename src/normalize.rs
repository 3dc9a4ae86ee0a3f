use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result, anyhow};
use image::imageops::FilterType;
use image::{GenericImageView, Rgba, RgbaImage};

use crate::data::EncodedBitmap;

/// Output canvas width for every normalized image; height follows the aspect.
pub const OUTPUT_WIDTH_PX: u32 = 1200;
pub const JPEG_QUALITY: u8 = 88;
pub const CORNER_RADIUS_PX: u32 = 24;

pub const COVER_ASPECT: f32 = 16.0 / 9.0;
pub const PLAN_ASPECT: f32 = 4.0 / 3.0;

pub type ImageLoadFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send>>;

/// Resolves an asset URL to its raw bytes. The HTTP implementation is the
/// production path; tests substitute an in-memory loader.
pub trait ImageLoader: Send + Sync {
    fn load(&self, url: &str) -> ImageLoadFuture;
}

pub struct HttpLoader {
    client: reqwest::Client,
    base: Option<reqwest::Url>,
}

impl HttpLoader {
    pub fn new(base: Option<reqwest::Url>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    fn resolve(&self, url: &str) -> Result<reqwest::Url> {
        if let Ok(absolute) = reqwest::Url::parse(url) {
            return Ok(absolute);
        }
        let base = self
            .base
            .as_ref()
            .ok_or_else(|| anyhow!("relative asset url '{}' but no base url configured", url))?;
        base.join(url)
            .with_context(|| format!("failed to resolve asset url '{}'", url))
    }
}

impl ImageLoader for HttpLoader {
    fn load(&self, url: &str) -> ImageLoadFuture {
        let resolved = self.resolve(url);
        let client = self.client.clone();
        Box::pin(async move {
            let url = resolved?;
            let response = client
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("failed to fetch image: {}", url))?
                .error_for_status()
                .with_context(|| format!("image fetch was rejected: {}", url))?;
            let bytes = response
                .bytes()
                .await
                .with_context(|| format!("failed to read image body: {}", url))?;
            Ok(bytes.to_vec())
        })
    }
}

/// Loads `source_url`, center-crops it to `target_aspect`, scales it onto the
/// fixed-width output canvas, rounds the corners and encodes the result.
///
/// An `Err` here means "omit this image"; callers continue the export.
pub async fn normalize(
    loader: &dyn ImageLoader,
    source_url: &str,
    target_aspect: f32,
    corner_radius_px: u32,
) -> Result<EncodedBitmap> {
    let bytes = loader.load(source_url).await?;
    normalize_bytes(&bytes, target_aspect, corner_radius_px)
}

pub fn normalize_bytes(
    bytes: &[u8],
    target_aspect: f32,
    corner_radius_px: u32,
) -> Result<EncodedBitmap> {
    let source = image::load_from_memory(bytes).with_context(|| "failed to decode image")?;
    let (width, height) = source.dimensions();
    let (crop_x, crop_y, crop_w, crop_h) = center_crop_rect(width, height, target_aspect);
    let cropped = source.crop_imm(crop_x, crop_y, crop_w, crop_h);

    let out_w = OUTPUT_WIDTH_PX;
    let out_h = ((out_w as f32 / target_aspect).round() as u32).max(1);
    let scaled = cropped.resize_exact(out_w, out_h, FilterType::Lanczos3);

    let masked = round_corners(scaled.to_rgba8(), corner_radius_px);
    encode_jpeg(&masked)
}

/// Centered crop rectangle for `target_aspect`: a source wider than the
/// target loses width, a taller one loses height.
pub(crate) fn center_crop_rect(width: u32, height: u32, target_aspect: f32) -> (u32, u32, u32, u32) {
    let source_aspect = width as f32 / height as f32;
    if source_aspect > target_aspect {
        let crop_w = ((height as f32 * target_aspect).round() as u32)
            .clamp(1, width);
        let crop_x = (width - crop_w) / 2;
        (crop_x, 0, crop_w, height)
    } else {
        let crop_h = ((width as f32 / target_aspect).round() as u32)
            .clamp(1, height);
        let crop_y = (height - crop_h) / 2;
        (0, crop_y, width, crop_h)
    }
}

/// The output is lossy and carries no alpha channel, so clipped corners
/// composite to the page background (white) instead of staying transparent.
fn round_corners(mut image: RgbaImage, radius_px: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let radius = radius_px.min(width / 2).min(height / 2) as f32;
    if radius <= 0.0 {
        return image;
    }
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;
        if !inside_rounded_rect(px, py, width as f32, height as f32, radius) {
            *pixel = Rgba([255, 255, 255, 255]);
        }
    }
    image
}

fn inside_rounded_rect(x: f32, y: f32, width: f32, height: f32, radius: f32) -> bool {
    let edge_x = x.min(width - x);
    let edge_y = y.min(height - y);
    if edge_x >= radius || edge_y >= radius {
        return true;
    }
    let dx = radius - edge_x;
    let dy = radius - edge_y;
    dx * dx + dy * dy <= radius * radius
}

fn encode_jpeg(image: &RgbaImage) -> Result<EncodedBitmap> {
    let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&rgb)
        .with_context(|| "failed to encode normalized image")?;
    Ok(EncodedBitmap {
        bytes,
        width_px: image.width(),
        height_px: image.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    #[test]
    fn wide_source_crops_width_keeps_height() {
        let (x, y, w, h) = center_crop_rect(4000, 1000, 16.0 / 9.0);
        assert_eq!(h, 1000);
        assert_eq!(w, 1778);
        assert_eq!(y, 0);
        // crop stays centered to within integer truncation
        assert!((2 * x + w).abs_diff(4000) <= 1);
    }

    #[test]
    fn tall_source_crops_height_keeps_width() {
        let (x, y, w, h) = center_crop_rect(1000, 4000, 4.0 / 3.0);
        assert_eq!(w, 1000);
        assert_eq!(h, 750);
        assert_eq!(x, 0);
        assert!((2 * y + h).abs_diff(4000) <= 1);
    }

    #[test]
    fn matching_aspect_keeps_everything() {
        let (x, y, w, h) = center_crop_rect(1600, 900, 16.0 / 9.0);
        assert_eq!((x, y, w, h), (0, 0, 1600, 900));
    }

    #[test]
    fn output_resolution_is_fixed_per_aspect() {
        for (source_w, source_h) in [(300, 900), (2000, 300), (1200, 675)] {
            let bytes = png_bytes(source_w, source_h, [10, 120, 10, 255]);
            let bitmap = normalize_bytes(&bytes, 16.0 / 9.0, CORNER_RADIUS_PX).unwrap();
            assert_eq!(bitmap.width_px, OUTPUT_WIDTH_PX);
            assert_eq!(bitmap.height_px, 675);
        }
    }

    #[test]
    fn corners_composite_to_white() {
        let bytes = png_bytes(800, 600, [0, 0, 0, 255]);
        let bitmap = normalize_bytes(&bytes, 4.0 / 3.0, CORNER_RADIUS_PX).unwrap();
        let decoded = image::load_from_memory(&bitmap.bytes).unwrap().to_rgb8();
        let corner = decoded.get_pixel(0, 0);
        assert!(corner[0] > 200 && corner[1] > 200 && corner[2] > 200);
        let center = decoded.get_pixel(OUTPUT_WIDTH_PX / 2, bitmap.height_px / 2);
        assert!(center[0] < 60 && center[1] < 60 && center[2] < 60);
    }

    #[test]
    fn garbage_bytes_are_a_load_failure() {
        assert!(normalize_bytes(b"not an image", COVER_ASPECT, 0).is_err());
    }

    #[test]
    fn relative_url_without_base_is_rejected() {
        let loader = HttpLoader::new(None);
        assert!(loader.resolve("uploads/photo.jpg").is_err());
    }

    #[test]
    fn relative_url_joins_base() {
        let base = reqwest::Url::parse("https://files.example.org/projects/").unwrap();
        let loader = HttpLoader::new(Some(base));
        let url = loader.resolve("uploads/photo.jpg").unwrap();
        assert_eq!(
            url.as_str(),
            "https://files.example.org/projects/uploads/photo.jpg"
        );
    }
}
