//! Image codec: decode, rotate, crop, scale, encode and verbatim copy.

use crate::geometry::rotated_bounds;
use crate::types::CropRect;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Slack absorbed before rounding the rotated canvas up to whole pixels.
const CANVAS_EPS: f64 = 1e-6;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("crop {0:?} leaves no pixels")]
    EmptyCrop(CropRect),
    #[error("invalid scale factor {0}")]
    InvalidScale(f64),
}

/// Raster primitives the alignment stages are built from.
pub trait ImageCodec {
    fn decode(&self, path: &Path) -> Result<DynamicImage, CodecError>;

    /// Rotate clockwise by `angle_deg` (negative turns counter-clockwise),
    /// growing the canvas to the rotated bounding box.
    fn rotate(&self, image: &DynamicImage, angle_deg: f64) -> DynamicImage;

    /// Crop to `rect`, rounded to whole pixels and clamped to the canvas.
    fn crop(&self, image: &DynamicImage, rect: &CropRect) -> Result<DynamicImage, CodecError>;

    fn scale(&self, image: &DynamicImage, factor: f64) -> Result<DynamicImage, CodecError>;

    /// Write `image` to `path`, format chosen by extension.
    fn encode(&self, image: &DynamicImage, path: &Path) -> Result<(), CodecError>;

    /// Duplicate `src` byte for byte.
    fn copy(&self, src: &Path, dest: &Path) -> Result<(), CodecError>;
}

/// [`ImageCodec`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn decode(&self, path: &Path) -> Result<DynamicImage, CodecError> {
        image::open(path).map_err(|source| CodecError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    fn rotate(&self, image: &DynamicImage, angle_deg: f64) -> DynamicImage {
        DynamicImage::ImageRgba8(rotate_expand(&image.to_rgba8(), angle_deg))
    }

    fn crop(&self, image: &DynamicImage, rect: &CropRect) -> Result<DynamicImage, CodecError> {
        let (width, height) = (image.width() as f64, image.height() as f64);

        let x0 = rect.x.round().clamp(0.0, width);
        let y0 = rect.y.round().clamp(0.0, height);
        let x1 = rect.right().round().clamp(0.0, width);
        let y1 = rect.bottom().round().clamp(0.0, height);

        if x1 <= x0 || y1 <= y0 {
            return Err(CodecError::EmptyCrop(*rect));
        }

        Ok(image.crop_imm(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    fn scale(&self, image: &DynamicImage, factor: f64) -> Result<DynamicImage, CodecError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(CodecError::InvalidScale(factor));
        }
        let width = ((image.width() as f64 * factor).round() as u32).max(1);
        let height = ((image.height() as f64 * factor).round() as u32).max(1);
        Ok(image.resize_exact(width, height, FilterType::Triangle))
    }

    fn encode(&self, image: &DynamicImage, path: &Path) -> Result<(), CodecError> {
        let encode_err = |source| CodecError::Encode {
            path: path.to_path_buf(),
            source,
        };
        let format = ImageFormat::from_path(path).map_err(encode_err)?;

        // JPEG has no alpha channel.
        let result = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, format),
            _ => image.save_with_format(path, format),
        };
        result.map_err(encode_err)
    }

    fn copy(&self, src: &Path, dest: &Path) -> Result<(), CodecError> {
        std::fs::copy(src, dest).map(|_| ()).map_err(|source| CodecError::Io {
            path: dest.to_path_buf(),
            source,
        })
    }
}

/// Rotate `src` clockwise by `angle_deg` about its centre onto a canvas the
/// size of the rotated bounding box.
///
/// Inverse-maps every output pixel with bilinear interpolation. Pixels that
/// fall outside the source are transparent.
fn rotate_expand(src: &RgbaImage, angle_deg: f64) -> RgbaImage {
    let (src_width, src_height) = src.dimensions();
    let (bb_w, bb_h) = rotated_bounds(angle_deg, src_width as f64, src_height as f64);
    let out_width = ((bb_w - CANVAS_EPS).ceil() as u32).max(1);
    let out_height = ((bb_h - CANVAS_EPS).ceil() as u32).max(1);

    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let src_cx = src_width as f64 / 2.0;
    let src_cy = src_height as f64 / 2.0;
    let out_cx = out_width as f64 / 2.0;
    let out_cy = out_height as f64 / 2.0;

    let sample = |x: i64, y: i64| -> [f64; 4] {
        if x >= 0 && x < src_width as i64 && y >= 0 && y < src_height as i64 {
            let Rgba(p) = *src.get_pixel(x as u32, y as u32);
            [p[0] as f64, p[1] as f64, p[2] as f64, p[3] as f64]
        } else {
            [0.0; 4]
        }
    };

    RgbaImage::from_fn(out_width, out_height, |ox, oy| {
        // Offsets from the output centre, measured at pixel centres.
        let dx = ox as f64 + 0.5 - out_cx;
        let dy = oy as f64 + 0.5 - out_cy;

        // Forward map is (x cos - y sin, x sin + y cos); apply its transpose.
        let sx = dx * cos + dy * sin + src_cx - 0.5;
        let sy = -dx * sin + dy * cos + src_cy - 0.5;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f64;
        let fy = sy - y0 as f64;

        let tl = sample(x0, y0);
        let tr = sample(x0 + 1, y0);
        let bl = sample(x0, y0 + 1);
        let br = sample(x0 + 1, y0 + 1);

        let mut out = [0u8; 4];
        for c in 0..4 {
            let val = tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy;
            out[c] = val.round().clamp(0.0, 255.0) as u8;
        }
        Rgba(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 90, 255]))
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let src = gradient(40, 30);
        let out = rotate_expand(&src, 0.0);
        assert_eq!(out.dimensions(), (40, 30));
        assert_eq!(out, src);
    }

    #[test]
    fn test_rotate_quarter_turn_swaps_dimensions() {
        let out = rotate_expand(&gradient(40, 30), 90.0);
        assert_eq!(out.dimensions(), (30, 40));
    }

    #[test]
    fn test_rotate_grows_canvas_with_blank_corners() {
        let src = RgbaImage::from_pixel(100, 100, Rgba([200, 200, 200, 255]));
        let out = rotate_expand(&src, 45.0);
        assert_eq!(out.dimensions(), (142, 142));
        assert_eq!(out.get_pixel(0, 0)[3], 0, "corner should be blank");
        assert_eq!(*out.get_pixel(71, 71), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn test_rotate_is_clockwise() {
        // A bright pixel right of centre should move below centre.
        let mut src = RgbaImage::from_pixel(41, 41, Rgba([0, 0, 0, 255]));
        src.put_pixel(35, 20, Rgba([255, 255, 255, 255]));
        let out = rotate_expand(&src, 90.0);
        let (w, h) = out.dimensions();
        let (cx, cy) = (w / 2, h / 2);
        let brightest = out
            .enumerate_pixels()
            .max_by_key(|(_, _, p)| p[0])
            .map(|(x, y, _)| (x, y))
            .unwrap();
        assert!(brightest.1 > cy + 10, "moved to {brightest:?}, centre ({cx}, {cy})");
        assert!((brightest.0 as i64 - cx as i64).abs() <= 1, "moved to {brightest:?}");
    }

    #[test]
    fn test_crop_rounds_and_clamps() {
        let img = DynamicImage::ImageRgba8(gradient(50, 40));
        let cropped = RasterCodec
            .crop(&img, &CropRect { x: 10.4, y: -5.0, width: 100.0, height: 20.2 })
            .unwrap();
        assert_eq!((cropped.width(), cropped.height()), (40, 15));
    }

    #[test]
    fn test_crop_outside_is_error() {
        let img = DynamicImage::ImageRgba8(gradient(50, 40));
        let err = RasterCodec
            .crop(&img, &CropRect { x: 60.0, y: 0.0, width: 10.0, height: 10.0 })
            .unwrap_err();
        assert!(matches!(err, CodecError::EmptyCrop(_)));
    }

    #[test]
    fn test_scale() {
        let img = DynamicImage::ImageRgba8(gradient(50, 40));
        let scaled = RasterCodec.scale(&img, 1.5).unwrap();
        assert_eq!((scaled.width(), scaled.height()), (75, 60));
        assert!(matches!(RasterCodec.scale(&img, 0.0), Err(CodecError::InvalidScale(_))));
        assert!(matches!(RasterCodec.scale(&img, f64::INFINITY), Err(CodecError::InvalidScale(_))));
    }

    #[test]
    fn test_encode_decode_and_copy() {
        let dir = std::env::temp_dir().join(format!("facelapse-codec-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let png = dir.join("face.png");
        let img = DynamicImage::ImageRgba8(gradient(16, 12));
        RasterCodec.encode(&img, &png).unwrap();
        let decoded = RasterCodec.decode(&png).unwrap();
        assert_eq!(decoded.to_rgba8(), img.to_rgba8());

        let jpg = dir.join("face.jpg");
        RasterCodec.encode(&img, &jpg).unwrap();
        assert_eq!(RasterCodec.decode(&jpg).unwrap().width(), 16);

        let copy = dir.join("copy.png");
        RasterCodec.copy(&png, &copy).unwrap();
        assert_eq!(std::fs::read(&png).unwrap(), std::fs::read(&copy).unwrap());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_decode_missing_file() {
        let err = RasterCodec.decode(Path::new("/nonexistent/facelapse.png")).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }
}
