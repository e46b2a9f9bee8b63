//! Preprocess stage: register imagery and its tile windows.

use crate::constants::{epsg, TILE_SIZE};
use crate::db::{ImgMetadataRecord, Store, WindowClipRecord};
use crate::error::Result;
use crate::pipeline::progress;
use crate::raster::{window_grid, RasterImage, Reprojector, Window};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Scan `imagery_dir` for GeoTIFF files, sorted by name.
pub fn collect_imagery(imagery_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(imagery_dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Register every image in `imagery_dir`: one metadata row carrying the
/// image's world-space boundary, plus one row per tile window.
///
/// Already-registered images are skipped, so interrupted runs can resume.
/// Metadata and window clips are checked independently because a crash can
/// land between the two inserts.
pub fn run_preprocess(
    store: &Store,
    imagery_dir: &Path,
    stride: usize,
    quiet: bool,
) -> Result<()> {
    let files = collect_imagery(imagery_dir)?;
    if files.is_empty() {
        warn!("No GeoTIFF imagery found in {}", imagery_dir.display());
        return Ok(());
    }
    info!("Found {} image(s) in {}", files.len(), imagery_dir.display());

    let to_target = Reprojector::new(epsg::SOURCE, epsg::TARGET)?;
    let pb = progress::create_image_progress(files.len(), !quiet);

    let mut registered = 0;
    let mut skipped = 0;
    for file in &files {
        let Some(img_name) = file.file_stem().and_then(|s| s.to_str()) else {
            warn!("Skipping file with unusable name: {}", file.display());
            progress::inc_progress(pb.as_ref());
            continue;
        };

        let has_metadata = store.image_exists(img_name)?;
        let has_clips = store.clips_exist(img_name)?;
        if has_metadata && has_clips {
            info!("Skipping (already registered): {img_name}");
            skipped += 1;
            progress::inc_progress(pb.as_ref());
            continue;
        }

        let raster = RasterImage::open(file)?;
        let geo_transform = raster.geo_transform();

        if !has_metadata {
            let full = Window {
                col_off: 0,
                row_off: 0,
                width: raster.width(),
                height: raster.height(),
            };
            let boundary = to_target.polygon(&geo_transform.window_polygon(&full))?;
            store.insert_image_metadata(&[ImgMetadataRecord {
                img_name: img_name.to_string(),
                boundary,
                dir_path: imagery_dir.display().to_string(),
                file_path: file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(img_name)
                    .to_string(),
            }])?;
        }

        if !has_clips {
            let windows = window_grid(raster.height(), raster.width(), TILE_SIZE, stride);
            let clips = windows
                .iter()
                .enumerate()
                .map(|(idx, window)| {
                    Ok(WindowClipRecord {
                        idx: idx as i64,
                        img_name: img_name.to_string(),
                        window: *window,
                        boundary: to_target.polygon(&geo_transform.window_polygon(window))?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            store.insert_window_clips(&clips)?;
            info!("Registered {img_name}: {} window(s)", clips.len());
        }

        registered += 1;
        progress::inc_progress(pb.as_ref());
    }

    progress::finish_progress(pb, "Preprocess complete");
    info!("Preprocess complete: {registered} registered, {skipped} skipped");
    Ok(())
}
