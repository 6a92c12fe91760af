//! Per-file work: level, measure, normalize, and the copy fallback.
//!
//! Everything here runs on a worker thread and touches only the file it was
//! given plus that file's own output paths.

use crate::report::{Failure, FileReport, Outcome};
use facelapse_core::{
    extract_landmarks, rotated_bounds, rotation_crop, AlignError, BatchStatistics, CodecError, CropRect,
    EyePair, ImageCodec, ImageMetadata, LandmarkDetector, NormalizePlan,
};
use image::DynamicImage;
use std::path::Path;

/// Eye metadata plus the canvas size it was measured on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub metadata: ImageMetadata,
    pub width: u32,
    pub height: u32,
}

/// Locate the eyes in a decoded image.
pub fn measure_image<D>(detector: &mut D, image: &DynamicImage) -> Result<Measurement, AlignError>
where
    D: LandmarkDetector + ?Sized,
{
    let shape = extract_landmarks(detector, image)?.ok_or(AlignError::NoFaceDetected)?;
    let eyes = EyePair::resolve(&shape).ok_or(AlignError::NoLandmarkShape)?;
    Ok(Measurement {
        metadata: ImageMetadata::compute(&eyes, image.width()),
        width: image.width(),
        height: image.height(),
    })
}

/// Decode `source` and measure it.
pub fn measure_file<D, C>(detector: &mut D, codec: &C, source: &Path) -> Result<Measurement, AlignError>
where
    D: LandmarkDetector + ?Sized,
    C: ImageCodec + ?Sized,
{
    let image = codec.decode(source)?;
    measure_image(detector, &image)
}

/// Stage 1: rotate `source` so its eyes are level, crop away the blank
/// corners and write the result to `output`.
pub fn level_file<D, C>(
    detector: &mut D,
    codec: &C,
    source: &Path,
    output: &Path,
) -> Result<Measurement, AlignError>
where
    D: LandmarkDetector + ?Sized,
    C: ImageCodec + ?Sized,
{
    let image = codec.decode(source)?;
    let measurement = measure_image(detector, &image)?;
    let rotation = measurement.metadata.rotation_deg;

    let (width, height) = (f64::from(measurement.width), f64::from(measurement.height));
    let crop = rotation_crop(rotation, width, height)?;
    let rotated = codec.rotate(&image, -rotation);

    // The canvas is the bounding box rounded up to whole pixels, centred.
    // Edge pixels only partly inside the crop blend in the blank fill.
    let (bb_w, bb_h) = rotated_bounds(rotation, width, height);
    let crop = CropRect {
        x: crop.x + (f64::from(rotated.width()) - bb_w) / 2.0,
        y: crop.y + (f64::from(rotated.height()) - bb_h) / 2.0,
        ..crop
    }
    .snapped_inward();
    let leveled = codec.crop(&rotated, &crop)?;

    ensure_parent(output)?;
    codec.encode(&leveled, output)?;
    Ok(measurement)
}

/// Stage 2, second pass: rescale `source` to the batch's interocular
/// distance, crop around its own eye-centre and write it to `output`.
pub fn normalize_file<C>(
    codec: &C,
    source: &Path,
    output: &Path,
    measurement: &Measurement,
    stats: &BatchStatistics,
) -> Result<NormalizePlan, AlignError>
where
    C: ImageCodec + ?Sized,
{
    let plan = NormalizePlan::for_image(stats, &measurement.metadata, measurement.width, measurement.height)?;

    let image = codec.decode(source)?;
    let scaled = codec.scale(&image, plan.scale)?;
    let cropped = codec.crop(&scaled, &plan.crop)?;

    ensure_parent(output)?;
    codec.encode(&cropped, output)?;
    Ok(plan)
}

/// Copy the untouched `source` into `failed_path` and report why.
pub fn fall_back<C>(codec: &C, source: &Path, failed_path: &Path, err: &AlignError) -> FileReport
where
    C: ImageCodec + ?Sized,
{
    copy_to_failed(codec, source, failed_path, Failure::from(err))
}

/// Copy the untouched `source` into `failed_path`, reporting `failure`.
pub fn copy_to_failed<C>(codec: &C, source: &Path, failed_path: &Path, failure: Failure) -> FileReport
where
    C: ImageCodec + ?Sized,
{
    let copied = ensure_parent(failed_path).and_then(|()| codec.copy(source, failed_path));

    let outcome = match copied {
        Ok(()) => Outcome::Failed {
            copied_to: failed_path.to_path_buf(),
            failure,
        },
        Err(copy_err) => Outcome::Unrecoverable {
            failure,
            copy_error: copy_err.to_string(),
        },
    };
    FileReport::new(source.to_path_buf(), outcome)
}

/// Create the parent directory of `path`. Safe to race with other workers.
fn ensure_parent(path: &Path) -> Result<(), CodecError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|source| CodecError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the pipeline tests.

    use facelapse_core::{DetectorError, FaceCandidate, FaceRect, LandmarkDetector, Point};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub const EYE: Rgb<u8> = Rgb([255, 0, 0]);
    const BACKGROUND: Rgb<u8> = Rgb([128, 128, 128]);

    /// Treats pure red pixels as eyes: leftmost is the left eye, rightmost the right.
    pub struct MarkerDetector;

    impl LandmarkDetector for MarkerDetector {
        fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceCandidate>, DetectorError> {
            let rgba = image.to_rgba8();
            let mut eyes: Vec<Point> = rgba
                .enumerate_pixels()
                .filter(|(_, _, p)| p.0 == [255, 0, 0, 255])
                .map(|(x, y, _)| Point::new(x as f64, y as f64))
                .collect();
            if eyes.len() < 2 {
                return Ok(vec![]);
            }
            eyes.sort_by(|a, b| a.x.total_cmp(&b.x));
            let (left, right) = (eyes[0], eyes[eyes.len() - 1]);
            let nose = Point::new((left.x + right.x) / 2.0, left.y.max(right.y) + 5.0);
            Ok(vec![FaceCandidate {
                rect: FaceRect {
                    x: 0.0,
                    y: 0.0,
                    width: image.width() as f64,
                    height: image.height() as f64,
                },
                points: vec![right, right, left, left, nose],
            }])
        }
    }

    /// Unique scratch directory under the system temp dir.
    pub fn scratch_dir(tag: &str) -> PathBuf {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "facelapse-{tag}-{}-{}",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Write a grey PNG with red eye markers.
    pub fn write_face(path: &Path, width: u32, height: u32, eyes: &[(u32, u32)]) {
        let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
        for &(x, y) in eyes {
            img.put_pixel(x, y, EYE);
        }
        img.save(path).unwrap();
    }
}
