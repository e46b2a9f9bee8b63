//! Predict stage: tiled two-stage inference and mask persistence.

use crate::constants::CLASSIFICATION_THRESHOLD;
use crate::db::{Store, WindowClipRecord};
use crate::error::{Error, Result};
use crate::inference::TilePredictor;
use crate::mask::PredictionSurface;
use crate::pipeline::paths::ResultPaths;
use crate::pipeline::progress;
use crate::raster::{clip_to_window, write_mask_tiff, GeoTransform, RasterImage};
use gdal::spatial_ref::SpatialRef;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of the per-image pre-checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictCheck {
    /// Run inference for the image.
    Process,
    /// A finalized mask is already persisted.
    SkipMaskExists,
    /// No window clips are registered; the image contributes no tiles.
    SkipNoClips,
}

/// Decide whether an image needs inference.
///
/// An image without registered window clips is a valid empty result, not an
/// error: it is skipped even on a forced run.
pub fn should_predict(
    img_name: &str,
    clip_count: usize,
    paths: &ResultPaths,
    force: bool,
) -> PredictCheck {
    if paths.mask_exists(img_name) && !force {
        return PredictCheck::SkipMaskExists;
    }
    if clip_count == 0 {
        return PredictCheck::SkipNoClips;
    }
    PredictCheck::Process
}

/// Run classify-then-segment inference over every registered image and
/// persist one finalized mask and score list per image.
///
/// Images whose mask file already exists are skipped unless `force` is set;
/// the mask is the stage's unit of completion, so a crashed run redoes at
/// most one image.
pub fn run_predict<P: TilePredictor>(
    store: &Store,
    predictor: &mut P,
    paths: &ResultPaths,
    force: bool,
    quiet: bool,
) -> Result<()> {
    let images = store.all_images()?;
    if images.is_empty() {
        info!("No registered images; nothing to predict");
        return Ok(());
    }
    paths.ensure_dirs()?;

    let mut processed = 0;
    let mut skipped = 0;
    for record in &images {
        let clips = store.window_clips(&record.img_name)?;
        match should_predict(&record.img_name, clips.len(), paths, force) {
            PredictCheck::SkipMaskExists => {
                info!("Skipping (mask exists): {}", record.img_name);
                skipped += 1;
                continue;
            }
            PredictCheck::SkipNoClips => {
                warn!("Skipping (no window clips): {}", record.img_name);
                skipped += 1;
                continue;
            }
            PredictCheck::Process => {}
        }
        predict_image(predictor, paths, record, &clips, quiet)?;
        processed += 1;
    }

    info!("Predict complete: {processed} processed, {skipped} skipped");
    Ok(())
}

fn predict_image<P: TilePredictor>(
    predictor: &mut P,
    paths: &ResultPaths,
    record: &crate::db::ImgMetadataRecord,
    clips: &[WindowClipRecord],
    quiet: bool,
) -> Result<()> {
    let img_name = record.img_name.as_str();
    let file = Path::new(&record.dir_path).join(&record.file_path);
    let raster = RasterImage::open(&file)?;
    let pixels = raster.read_pixels()?;

    let mut surface =
        PredictionSurface::init(raster.height(), raster.width(), raster.surface_dtype()?);

    let pb = progress::create_tile_progress(clips.len(), img_name, !quiet);
    for clip in clips {
        let tile = clip_to_window(&pixels.view(), &clip.window);
        let prediction = predictor.predict_tile(&tile.view())?;
        surface.merge(&prediction, &clip.window);
        progress::inc_progress(pb.as_ref());
    }
    progress::finish_progress(pb, "Done");

    let positives = surface
        .scores()
        .iter()
        .filter(|&&s| s > CLASSIFICATION_THRESHOLD)
        .count();
    info!(
        "{img_name}: {} tile(s), {positives} classified positive",
        clips.len()
    );

    persist_outputs(
        paths,
        img_name,
        &surface,
        &raster.geo_transform(),
        &raster.spatial_ref()?,
    )
}

/// Persist the score list, then the mask. The mask is the stage's
/// completion marker, so it is written last: a crash mid-persist leaves no
/// marker and the retry redoes the whole image.
fn persist_outputs(
    paths: &ResultPaths,
    img_name: &str,
    surface: &PredictionSurface,
    geo_transform: &GeoTransform,
    spatial_ref: &SpatialRef,
) -> Result<()> {
    write_scores(&paths.score_path(img_name), surface.scores())?;
    write_mask_tiff(
        &paths.mask_path(img_name),
        surface.data(),
        surface.dtype(),
        geo_transform,
        spatial_ref,
    )
}

fn write_scores(path: &Path, scores: &[f32]) -> Result<()> {
    let payload = serde_json::to_vec(scores).map_err(|e| Error::ScoreWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    std::fs::write(path, payload)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::raster::SurfaceDtype;

    #[test]
    fn test_zero_clip_image_is_skipped_not_processed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResultPaths::new(dir.path(), 112);
        assert_eq!(
            should_predict("img_a", 0, &paths, false),
            PredictCheck::SkipNoClips
        );
        // Even a forced run has nothing to do without clips.
        assert_eq!(
            should_predict("img_a", 0, &paths, true),
            PredictCheck::SkipNoClips
        );
    }

    #[test]
    fn test_existing_mask_skips_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResultPaths::new(dir.path(), 112);
        paths.ensure_dirs().unwrap();
        std::fs::write(paths.mask_path("img_a"), b"tiff").unwrap();
        assert_eq!(
            should_predict("img_a", 4, &paths, false),
            PredictCheck::SkipMaskExists
        );
        assert_eq!(
            should_predict("img_a", 4, &paths, true),
            PredictCheck::Process
        );
        assert_eq!(
            should_predict("img_b", 4, &paths, false),
            PredictCheck::Process
        );
    }

    #[test]
    fn test_failed_score_write_leaves_no_completion_marker() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResultPaths::new(dir.path(), 112);
        paths.ensure_dirs().unwrap();
        // Occupy the score path with a directory so its write must fail.
        std::fs::create_dir(paths.score_path("img_a")).unwrap();

        let surface = PredictionSurface::init(4, 4, SurfaceDtype::Int32);
        let gt = GeoTransform::new([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
        let srs = SpatialRef::from_epsg(25832).unwrap();

        let result = persist_outputs(&paths, "img_a", &surface, &gt, &srs);
        assert!(result.is_err());
        // The mask never appeared, so a retry will redo the image instead
        // of skipping it with its score list missing.
        assert!(!paths.mask_exists("img_a"));
    }
}
