use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::imageops::{self, FilterType as ResizeFilter};
use image::{ExtendedColorType, ImageEncoder, ImageFormat, Rgba, RgbaImage};
use tracing::{debug, info};

use crate::error::{Result, StudioError};
use crate::metadata::{apply_orientation, read_orientation};
use crate::models::{CropRegion, ImageId};
use crate::viewport::{normalize_rotation, rotated_bounds};

/// A decoded, upright source raster and its identity.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: ImageId,
    pub image: Arc<RgbaImage>,
}

impl SourceImage {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            id: ImageId::new(),
            image: Arc::new(image),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

fn target_size(w: u32, h: u32, max_dimension: u32) -> (u32, u32) {
    if w == 0 || h == 0 {
        return (1, 1);
    }
    if w >= h {
        let nh = ((max_dimension as f32 / w as f32) * h as f32) as u32;
        (max_dimension, nh.max(1))
    } else {
        let nw = ((max_dimension as f32 / h as f32) * w as f32) as u32;
        (nw.max(1), max_dimension)
    }
}

fn resize_rgba_preserve_aspect(img: &RgbaImage, max_dimension: u32) -> RgbaImage {
    let max_dimension = max_dimension.max(1);
    let (nw, nh) = target_size(img.width(), img.height(), max_dimension);
    if nw == img.width() && nh == img.height() {
        return img.clone();
    }
    imageops::resize(img, nw, nh, ResizeFilter::CatmullRom)
}

/// Downscaled working copy for interactive preview; never upscales.
pub fn preview_copy(img: &RgbaImage, max_dimension: u32) -> RgbaImage {
    let source_max = img.width().max(img.height()).max(1);
    resize_rgba_preserve_aspect(img, max_dimension.min(source_max))
}

fn decode_file(path: &Path) -> Result<RgbaImage> {
    match image::open(path) {
        Ok(img) => Ok(img.to_rgba8()),
        Err(primary) => {
            // extension may lie about the container; sniff the bytes instead
            let bytes = fs::read(path).map_err(|e| StudioError::io(path, e))?;
            match image::load_from_memory(&bytes) {
                Ok(img) => Ok(img.to_rgba8()),
                Err(_) => Err(StudioError::Decode(primary)),
            }
        }
    }
}

/// Decodes a JPEG/PNG and applies its EXIF orientation.
pub fn load_source(path: &Path) -> Result<SourceImage> {
    let mut rgba = decode_file(path)?;
    match read_orientation(path) {
        Ok(Some(orientation)) => rgba = apply_orientation(rgba, orientation),
        Ok(None) => {}
        Err(e) => debug!(path = %path.display(), "no usable EXIF orientation: {e}"),
    }
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(StudioError::EmptyImage);
    }
    let source = SourceImage::new(rgba);
    info!(
        path = %path.display(),
        image = %source.id,
        width = source.image.width(),
        height = source.image.height(),
        "source loaded"
    );
    Ok(source)
}

fn bilinear_sample(img: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;
    let (w, h) = (img.width() as i64, img.height() as i64);

    let sample = |sx: i64, sy: i64| -> [f64; 4] {
        if sx < 0 || sy < 0 || sx >= w || sy >= h {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            [p[0] as f64, p[1] as f64, p[2] as f64, p[3] as f64]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Rotates clockwise about the centre into the full bounding-box raster.
/// Uncovered corners are transparent.
pub fn rotate_about_center(src: &RgbaImage, deg: f64) -> RgbaImage {
    let deg = normalize_rotation(deg);
    if deg == 0.0 {
        return src.clone();
    }
    if deg == 90.0 {
        return imageops::rotate90(src);
    }
    if deg == 180.0 {
        return imageops::rotate180(src);
    }
    if deg == 270.0 {
        return imageops::rotate270(src);
    }

    let (dst_w, dst_h) = rotated_bounds(src.width(), src.height(), deg);
    let (sin, cos) = deg.to_radians().sin_cos();
    let src_cx = src.width() as f64 / 2.0;
    let src_cy = src.height() as f64 / 2.0;
    let dst_cx = dst_w as f64 / 2.0;
    let dst_cy = dst_h as f64 / 2.0;

    RgbaImage::from_fn(dst_w, dst_h, |dx, dy| {
        let u = dx as f64 + 0.5 - dst_cx;
        let v = dy as f64 + 0.5 - dst_cy;
        let sx = cos * u + sin * v + src_cx - 0.5;
        let sy = -sin * u + cos * v + src_cy - 0.5;
        bilinear_sample(src, sx, sy)
    })
}

/// Pulls the committed region out of the full-resolution source, rotating
/// first when the region carries a rotation.
pub async fn extract_crop(source: &RgbaImage, region: &CropRegion) -> Result<RgbaImage> {
    if source.width() == 0 || source.height() == 0 {
        return Err(StudioError::EmptyImage);
    }
    let rotated;
    let frame = if normalize_rotation(region.rotation_deg) == 0.0 {
        source
    } else {
        rotated = rotate_about_center(source, region.rotation_deg);
        tokio::task::yield_now().await;
        &rotated
    };

    let x = region.x.min(frame.width().saturating_sub(1));
    let y = region.y.min(frame.height().saturating_sub(1));
    let width = region.width.clamp(1, frame.width() - x);
    let height = region.height.clamp(1, frame.height() - y);
    let cropped = imageops::crop_imm(frame, x, y, width, height).to_image();
    debug!(x, y, width, height, "crop extracted");
    Ok(cropped)
}

fn encode_png_with(img: &RgbaImage, compression: CompressionType) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let cursor = Cursor::new(&mut buffer);
    let encoder = PngEncoder::new_with_quality(cursor, compression, FilterType::Adaptive);
    encoder
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| StudioError::Encode(e.to_string()))?;
    Ok(buffer)
}

pub fn encode_png_fast(img: &RgbaImage) -> Result<Vec<u8>> {
    encode_png_with(img, CompressionType::Fast)
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    encode_png_with(img, CompressionType::Default)
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    Ok(img.to_rgba8())
}

pub fn png_data_uri(png: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(png);
    format!("data:image/png;base64,{b64}")
}

pub fn write_png_to_path(img: &RgbaImage, path: &Path) -> Result<Vec<u8>> {
    let buffer = encode_png(img)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StudioError::io(parent, e))?;
    }
    fs::write(path, &buffer).map_err(|e| StudioError::io(path, e))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn numbered(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 7, 255]))
    }

    #[test]
    fn preview_never_upscales() {
        let img = numbered(100, 50);
        assert_eq!(preview_copy(&img, 1440).dimensions(), (100, 50));
        assert_eq!(preview_copy(&img, 40).dimensions(), (40, 20));
        let tall = numbered(30, 90);
        assert_eq!(preview_copy(&tall, 45).dimensions(), (15, 45));
    }

    #[tokio::test]
    async fn extracts_exact_pixels() {
        let img = numbered(20, 30);
        let region = CropRegion {
            x: 3,
            y: 5,
            width: 4,
            height: 6,
            rotation_deg: 0.0,
        };
        let out = extract_crop(&img, &region).await.unwrap();
        assert_eq!(out.dimensions(), (4, 6));
        assert_eq!(out.get_pixel(0, 0), &Rgba([3, 5, 7, 255]));
        assert_eq!(out.get_pixel(3, 5), &Rgba([6, 10, 7, 255]));
    }

    #[tokio::test]
    async fn extraction_clamps_overhanging_regions() {
        let img = numbered(10, 10);
        let region = CropRegion {
            x: 8,
            y: 12,
            width: 50,
            height: 50,
            rotation_deg: 0.0,
        };
        let out = extract_crop(&img, &region).await.unwrap();
        assert_eq!(out.dimensions(), (2, 1));
        assert_eq!(out.get_pixel(0, 0), &Rgba([8, 9, 7, 255]));
    }

    #[tokio::test]
    async fn rotated_extraction_uses_rotated_frame() {
        let img = numbered(4, 2);
        let region = CropRegion {
            x: 0,
            y: 0,
            width: 2,
            height: 4,
            rotation_deg: 90.0,
        };
        let out = extract_crop(&img, &region).await.unwrap();
        assert_eq!(out, imageops::rotate90(&img));
        // clockwise: the source's bottom-left lands top-left
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 1, 7, 255]));
    }

    #[test]
    fn oblique_rotation_fills_bounding_box() {
        let img = RgbaImage::from_pixel(40, 40, Rgba([200, 10, 10, 255]));
        let out = rotate_about_center(&img, 45.0);
        assert_eq!(out.dimensions(), (57, 57));
        assert_eq!(out.get_pixel(28, 28), &Rgba([200, 10, 10, 255]));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(rotate_about_center(&img, 360.0), img);
    }

    #[test]
    fn png_round_trip_and_data_uri() {
        let img = numbered(5, 3);
        let png = encode_png_fast(&img).unwrap();
        assert_eq!(decode_png(&png).unwrap(), img);
        let uri = png_data_uri(&png);
        assert!(uri.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn load_source_decodes_and_assigns_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("face.png");
        write_png_to_path(&numbered(6, 9), &path).unwrap();
        let a = load_source(&path).unwrap();
        let b = load_source(&path).unwrap();
        assert_eq!(a.dimensions(), (6, 9));
        assert_ne!(a.id, b.id);
        assert!(load_source(&dir.path().join("missing.png")).is_err());
    }
}
