//! Postprocess stage: vectorize masks and join detections to buildings.

use crate::constants::epsg;
use crate::db::Store;
use crate::error::Result;
use crate::join::link_detections_to_buildings;
use crate::pipeline::paths::ResultPaths;
use crate::pipeline::progress;
use crate::raster::{RasterImage, Reprojector};
use crate::vector::extract_detections;
use tracing::{info, warn};

/// Vectorize every finalized mask into detection polygons, link them to
/// building footprints and persist the survivors.
///
/// Images with stored detections are skipped unless `force` is set (which
/// deletes and re-extracts them). Images whose mask file is missing are
/// skipped with a warning so a partial predict run does not fail the stage.
pub fn run_postprocess(store: &Store, paths: &ResultPaths, force: bool, quiet: bool) -> Result<()> {
    let images = store.all_images()?;
    if images.is_empty() {
        info!("No registered images; nothing to postprocess");
        return Ok(());
    }

    let source_to_target = Reprojector::new(epsg::SOURCE, epsg::TARGET)?;
    let target_to_metric = Reprojector::new(epsg::TARGET, epsg::METRIC)?;
    let pb = progress::create_image_progress(images.len(), !quiet);

    let mut processed = 0;
    let mut skipped = 0;
    for record in &images {
        let img_name = record.img_name.as_str();

        if store.detections_exist(img_name)? {
            if force {
                store.delete_roof_detections(img_name)?;
            } else {
                info!("Skipping (detections stored): {img_name}");
                skipped += 1;
                progress::inc_progress(pb.as_ref());
                continue;
            }
        }

        let mask_path = paths.mask_path(img_name);
        if !mask_path.exists() {
            warn!("Skipping (no mask yet): {img_name}");
            skipped += 1;
            progress::inc_progress(pb.as_ref());
            continue;
        }

        let mask = RasterImage::open(&mask_path)?;
        let surface = mask.read_band()?;
        let detections = extract_detections(
            &surface,
            &mask.geo_transform(),
            &source_to_target,
            &target_to_metric,
        )?;

        let buildings = store.buildings_intersecting(img_name)?;
        let linked = link_detections_to_buildings(img_name, &detections, &buildings);
        info!(
            "{img_name}: {} polygon(s) extracted, {} linked to buildings",
            detections.len(),
            linked.len()
        );
        store.insert_roof_detections(&linked)?;

        processed += 1;
        progress::inc_progress(pb.as_ref());
    }

    progress::finish_progress(pb, "Postprocess complete");
    info!("Postprocess complete: {processed} processed, {skipped} skipped");
    Ok(())
}
