//! Image preprocessing module
//!
//! Loads raster images and applies the fixed set of preprocessing filters
//! offered before OCR:
//! - Sharpen (3x3 kernel)
//! - Gaussian blur (5x5 window)
//! - Morphological opening, closing, erosion and dilation (5x5 square)
//! - Grayscale conversion
//!
//! Every transform returns a new image; inputs are never modified.

use crate::error::{PipelineError, Result};
use crate::types::FilterKind;
use image::{imageops, DynamicImage, GrayImage, ImageBuffer, ImageReader, Pixel, RgbImage};
use imageproc::filter::{filter3x3, separable_filter_equal};
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;

/// Sharpen kernel, row-major
const SHARPEN_KERNEL: [i32; 9] = [-1, -1, -1, -1, 9, -1, -1, -1, -1];

/// Side of the Gaussian window and of the morphology structuring element
const WINDOW: u32 = 5;

/// Load an image file, sniffing the format from its content
///
/// The result is normalized to 8-bit grayscale or 8-bit RGB.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let load_error = |source| PipelineError::ImageLoad {
        path: path.to_path_buf(),
        source,
    };

    let image = ImageReader::open(path)
        .map_err(|e| load_error(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| load_error(image::ImageError::IoError(e)))?
        .decode()
        .map_err(load_error)?;

    Ok(normalize(&image).into_owned())
}

/// Decode an in-memory image (uploads, tests)
pub fn load_image_from_memory(bytes: &[u8]) -> Result<DynamicImage> {
    let load_error = |source| PipelineError::ImageLoad {
        path: "<memory>".into(),
        source,
    };

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| load_error(image::ImageError::IoError(e)))?
        .decode()
        .map_err(load_error)?;

    Ok(normalize(&image).into_owned())
}

/// Reduce any decoded image to 8-bit Luma or 8-bit RGB
///
/// Alpha is dropped; 16-bit and float images are narrowed.
pub fn normalize(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(image),
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8())),
        _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
    }
}

/// Transform function selected by a [`FilterKind`]
pub type Transform = fn(&DynamicImage) -> DynamicImage;

/// Lookup from filter kind to its transform
pub fn transform_for(kind: FilterKind) -> Transform {
    match kind {
        FilterKind::None => identity,
        FilterKind::Sharpen => sharpen,
        FilterKind::GaussianBlur => gaussian_blur,
        FilterKind::Opening => opening,
        FilterKind::Closing => closing,
        FilterKind::Erosion => erosion,
        FilterKind::Dilation => dilation,
        FilterKind::Grayscale => grayscale,
    }
}

/// Apply a preprocessing filter, returning a new image
///
/// Width and height are always preserved. Only [`FilterKind::Grayscale`]
/// changes the channel count.
pub fn apply_filter(image: &DynamicImage, kind: FilterKind) -> DynamicImage {
    transform_for(kind)(image)
}

/// Reduce an image to the single-channel buffer the OCR engine expects
pub fn to_ocr_input(image: &DynamicImage) -> GrayImage {
    luma_bt601(image)
}

/// Luma with BT.601 weights (0.299 R + 0.587 G + 0.114 B), rounded
///
/// `image`'s own `to_luma8` uses Rec.709 weights, which darken reds and
/// blues noticeably compared to the usual OCR preprocessing.
fn luma_bt601(image: &DynamicImage) -> GrayImage {
    match normalize(image).as_ref() {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => {
            let rgb = other.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
                image::Luma([luma.round().clamp(0.0, 255.0) as u8])
            })
        }
    }
}

fn identity(image: &DynamicImage) -> DynamicImage {
    image.clone()
}

fn grayscale(image: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageLuma8(luma_bt601(image))
}

/// 3x3 sharpen with a reflected border
///
/// `filter3x3` repeats edge pixels past the border, so the input is padded
/// by one pixel mirrored about the edge (`b|abcd|c`) and the result is
/// cropped back. Border pixels then see the same neighbours as with the
/// reflect-101 convention used by common imaging libraries.
fn sharpen(image: &DynamicImage) -> DynamicImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    match normalize(image).as_ref() {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(unpad(&filter3x3::<_, i32, u8>(
            &reflect_pad(gray),
            &SHARPEN_KERNEL,
        ))),
        other => DynamicImage::ImageRgb8(unpad(&filter3x3::<_, i32, u8>(
            &reflect_pad(&other.to_rgb8()),
            &SHARPEN_KERNEL,
        ))),
    }
}

/// Index into `0..len` for a coordinate up to one pixel outside it
fn reflect_101(i: i64, len: u32) -> u32 {
    let last = i64::from(len) - 1;
    let mirrored = if i < 0 {
        -i
    } else if i > last {
        2 * last - i
    } else {
        i
    };
    mirrored.clamp(0, last) as u32
}

/// Grow an image by one mirrored pixel on every side
fn reflect_pad<P: Pixel + 'static>(
    img: &ImageBuffer<P, Vec<P::Subpixel>>,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let (width, height) = img.dimensions();
    ImageBuffer::from_fn(width + 2, height + 2, |x, y| {
        *img.get_pixel(
            reflect_101(i64::from(x) - 1, width),
            reflect_101(i64::from(y) - 1, height),
        )
    })
}

/// Drop the one-pixel frame added by [`reflect_pad`]
fn unpad<P: Pixel + 'static>(
    img: &ImageBuffer<P, Vec<P::Subpixel>>,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let (width, height) = img.dimensions();
    imageops::crop_imm(img, 1, 1, width - 2, height - 2).to_image()
}

fn gaussian_blur(image: &DynamicImage) -> DynamicImage {
    let kernel = gaussian_kernel(WINDOW);
    match normalize(image).as_ref() {
        DynamicImage::ImageLuma8(gray) => {
            DynamicImage::ImageLuma8(separable_filter_equal(gray, &kernel))
        }
        other => DynamicImage::ImageRgb8(separable_filter_equal(&other.to_rgb8(), &kernel)),
    }
}

fn erosion(image: &DynamicImage) -> DynamicImage {
    map_channels(image, erode_gray)
}

fn dilation(image: &DynamicImage) -> DynamicImage {
    map_channels(image, dilate_gray)
}

fn opening(image: &DynamicImage) -> DynamicImage {
    map_channels(image, |gray| dilate_gray(&erode_gray(gray)))
}

fn closing(image: &DynamicImage) -> DynamicImage {
    map_channels(image, |gray| erode_gray(&dilate_gray(gray)))
}

/// Normalized 1-D Gaussian weights for a window of `size` taps
///
/// Sigma is derived from the window the same way common imaging libraries
/// do when asked for an automatic sigma: `0.3 * ((size - 1) / 2 - 1) + 0.8`.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size as f32 - 1.0) / 2.0;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Run a grayscale operation on every channel independently
fn map_channels(image: &DynamicImage, op: impl Fn(&GrayImage) -> GrayImage) -> DynamicImage {
    match normalize(image).as_ref() {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(op(gray)),
        other => {
            let rgb = other.to_rgb8();
            let channels: Vec<GrayImage> = (0..3).map(|c| op(&extract_channel(&rgb, c))).collect();
            DynamicImage::ImageRgb8(RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                image::Rgb([
                    channels[0].get_pixel(x, y)[0],
                    channels[1].get_pixel(x, y)[0],
                    channels[2].get_pixel(x, y)[0],
                ])
            }))
        }
    }
}

fn extract_channel(rgb: &RgbImage, channel: usize) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        image::Luma([rgb.get_pixel(x, y)[channel]])
    })
}

fn erode_gray(gray: &GrayImage) -> GrayImage {
    rank_filter(gray, WINDOW / 2, |a, b| a.min(b))
}

fn dilate_gray(gray: &GrayImage) -> GrayImage {
    rank_filter(gray, WINDOW / 2, |a, b| a.max(b))
}

/// Min or max over a square window, as two separable passes
///
/// The window is clipped at the image border, so pixels outside the image
/// never take part.
fn rank_filter(gray: &GrayImage, radius: u32, pick: fn(u8, u8) -> u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let horizontal = GrayImage::from_fn(width, height, |x, y| {
        let lo = x.saturating_sub(radius);
        let hi = (x + radius).min(width - 1);
        let value = (lo..=hi)
            .map(|xx| gray.get_pixel(xx, y)[0])
            .fold(gray.get_pixel(x, y)[0], pick);
        image::Luma([value])
    });

    GrayImage::from_fn(width, height, |x, y| {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(height - 1);
        let value = (lo..=hi)
            .map(|yy| horizontal.get_pixel(x, yy)[0])
            .fold(horizontal.get_pixel(x, y)[0], pick);
        image::Luma([value])
    })
}
