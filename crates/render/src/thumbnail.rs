//! Inline square thumbnails.

use crate::error::{ErrorKind, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use exn::ResultExt;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba};
use std::io::Cursor;

pub const DATA_URL_PREFIX: &str = "data:image/png;base64,";
/// Largest per-channel difference still treated as border colour.
const BORDER_TOLERANCE: u8 = 8;

/// Decode an image, trim its uniform border, crop the centre square and
/// scale it to `size` pixels, returned as a PNG `data:` URL.
///
/// Decoding and scaling are CPU-bound and run on the blocking thread pool.
pub async fn thumbnail(bytes: Vec<u8>, size: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || thumbnail_blocking(&bytes, size))
        .await
        .or_raise(|| ErrorKind::Io)?
}

fn thumbnail_blocking(bytes: &[u8], size: u32) -> Result<String> {
    let image = image::load_from_memory(bytes).or_raise(|| ErrorKind::Image)?;
    let image = square(trim_border(image)).resize_exact(size, size, FilterType::Lanczos3);
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png).or_raise(|| ErrorKind::Image)?;
    Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(png.into_inner())))
}

fn similar(a: Rgba<u8>, b: Rgba<u8>) -> bool {
    a.0.iter().zip(b.0.iter()).all(|(x, y)| x.abs_diff(*y) <= BORDER_TOLERANCE)
}

/// Crop away rows and columns matching the top-left pixel. An image that is
/// all border is returned unchanged.
fn trim_border(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image;
    }
    let background = image.get_pixel(0, 0);
    let (mut left, mut top, mut right, mut bottom) = (width, height, 0, 0);
    for (x, y, pixel) in image.pixels() {
        if !similar(pixel, background) {
            left = left.min(x);
            top = top.min(y);
            right = right.max(x);
            bottom = bottom.max(y);
        }
    }
    if left > right || top > bottom {
        return image;
    }
    image.crop_imm(left, top, right - left + 1, bottom - top + 1)
}

fn square(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    image.crop_imm((width - side) / 2, (height - side) / 2, side, side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const RED: Rgba<u8> = Rgba([200, 0, 0, 255]);

    fn png(image: RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn decode(url: &str) -> DynamicImage {
        let encoded = url.strip_prefix(DATA_URL_PREFIX).unwrap();
        image::load_from_memory(&STANDARD.decode(encoded).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_border_trimmed_then_resized() {
        let mut canvas = RgbaImage::from_pixel(60, 30, WHITE);
        for x in 20..30 {
            for y in 5..15 {
                canvas.put_pixel(x, y, RED);
            }
        }
        let url = thumbnail(png(canvas), 8).await.unwrap();
        let thumb = decode(&url);
        assert_eq!(thumb.dimensions(), (8, 8));
        // Only the red block survives the trim.
        assert!(similar(thumb.get_pixel(0, 0), RED));
        assert!(similar(thumb.get_pixel(7, 7), RED));
    }

    #[test]
    fn test_uniform_image_is_centre_cropped() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 10, WHITE));
        let cropped = square(trim_border(image));
        assert_eq!(cropped.dimensions(), (10, 10));
    }

    #[tokio::test]
    async fn test_rejects_non_images() {
        let err = thumbnail(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec(), 8).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Image));
    }
}
