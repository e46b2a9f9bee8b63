//! Map stage: unify detections per building and cross-reference the registry.

use crate::db::{MappingTable, Store};
use crate::error::Result;
use crate::join::{link_units_to_buildings, link_units_to_detections, unify_per_building};
use tracing::info;

/// Populate the three mapping result tables.
///
/// All joins are recomputed from source data on every run; only the inserts
/// are guarded, per table, so a run interrupted between tables resumes
/// cleanly. With `force`, each table is cleared and rewritten.
pub fn run_map(store: &Store, force: bool) -> Result<()> {
    let buildings = store.all_buildings()?;
    let units = store.solar_units()?;
    info!(
        "Loaded {} building(s) and {} registered unit(s)",
        buildings.len(),
        units.len()
    );

    let unit_links = link_units_to_buildings(&units, &buildings);
    write_guarded(store, MappingTable::MastrBuilding, force, || {
        info!("Writing {} unit-building link(s)", unit_links.len());
        store.insert_unit_building_links(&unit_links)
    })?;

    let detections = store.all_roof_detections()?;
    let building_detections = unify_per_building(&detections);
    write_guarded(store, MappingTable::RoofDetectionsBuilding, force, || {
        info!(
            "Writing {} unified building detection(s) from {} detection(s)",
            building_detections.len(),
            detections.len()
        );
        store.insert_building_detections(&building_detections)
    })?;

    let unit_detection_links = link_units_to_detections(&unit_links, &building_detections);
    write_guarded(store, MappingTable::RoofDetectionsMastr, force, || {
        info!(
            "Writing {} unit-detection link(s)",
            unit_detection_links.len()
        );
        store.insert_unit_detection_links(&unit_detection_links)
    })?;

    info!("Map complete");
    Ok(())
}

fn write_guarded<F>(store: &Store, table: MappingTable, force: bool, write: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    if store.mapping_populated(table)? {
        if force {
            store.clear_mapping(table)?;
        } else {
            info!("Skipping {table:?} (already populated)");
            return Ok(());
        }
    }
    write()
}
