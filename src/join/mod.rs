//! Spatial joins between detections, building footprints and registry units.

use crate::constants::{panel, ESTIMATE_DECIMALS};
use geo::{BooleanOps, Contains, GeodesicArea, Intersects};
use geo_types::{MultiPolygon, Point, Polygon};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A building footprint read from the spatial store.
#[derive(Debug, Clone)]
pub struct BuildingFootprint {
    /// Feature id of the footprint.
    pub ogc_fid: i64,
    /// Footprint geometry in the target CRS.
    pub geometry: MultiPolygon<f64>,
}

/// One deduplicated detection linked to the buildings it touches.
#[derive(Debug, Clone)]
pub struct RoofDetection {
    /// Per-image detection index.
    pub idx: i64,
    /// Name of the source image.
    pub img_name: String,
    /// Detection geometry in the target CRS.
    pub geometry: Polygon<f64>,
    /// Ids of all buildings the detection intersects. A set: a detection
    /// straddling two adjacent footprints links to both, order irrelevant.
    pub building_ids: BTreeSet<i64>,
}

/// A registered solar unit with its point location.
#[derive(Debug, Clone)]
pub struct MastrUnit {
    /// Registry identifier (MaStR number).
    pub mastr_nummer: String,
    /// Unit location in the target CRS.
    pub location: Point<f64>,
}

/// n:n link between a registry unit and a building.
#[derive(Debug, Clone)]
pub struct UnitBuildingLink {
    /// Registry identifier.
    pub mastr_nummer: String,
    /// Unit location.
    pub location: Point<f64>,
    /// Linked building id.
    pub ogc_fid: i64,
}

/// All detections for one building unified into a single geometry, with
/// derived area and estimate ranges.
#[derive(Debug, Clone)]
pub struct BuildingDetection {
    /// Building id.
    pub ogc_fid: i64,
    /// Union of all detection geometries on this building.
    pub geometry: MultiPolygon<f64>,
    /// Indices of the contributing source detections.
    pub detection_indices: Vec<i64>,
    /// Names of the contributing images.
    pub img_names: Vec<String>,
    /// Geodesic area of the unified geometry in m2.
    pub geom_sqm: f64,
    /// Panel count assuming the larger per-panel area.
    pub panel_count_low: f64,
    /// Panel count assuming the smaller per-panel area.
    pub panel_count_high: f64,
    /// Capacity estimate, low bound (kWp).
    pub cap_low: f64,
    /// Capacity estimate, high bound (kWp).
    pub cap_high: f64,
}

/// n:n link between a registry unit and the unified detection on its building.
#[derive(Debug, Clone)]
pub struct UnitDetectionLink {
    /// Registry identifier.
    pub mastr_nummer: String,
    /// Unit location.
    pub location: Point<f64>,
    /// Building id.
    pub ogc_fid: i64,
    /// Unified detection geometry on that building.
    pub detection_geometry: MultiPolygon<f64>,
    /// Names of the images contributing to the detection.
    pub img_names: Vec<String>,
}

/// Join detection polygons against building footprints.
///
/// A detection is kept only when it intersects at least one footprint
/// (intersects, not contains: a panel polygon need only touch the roof).
/// Exactly equal geometries are deduplicated by merging their building-id
/// sets into one record. Surviving records are indexed in input order.
pub fn link_detections_to_buildings(
    img_name: &str,
    detections: &[Polygon<f64>],
    buildings: &[BuildingFootprint],
) -> Vec<RoofDetection> {
    let mut linked: Vec<RoofDetection> = Vec::new();

    for detection in detections {
        let ids: BTreeSet<i64> = buildings
            .iter()
            .filter(|b| b.geometry.intersects(detection))
            .map(|b| b.ogc_fid)
            .collect();
        if ids.is_empty() {
            // A detection with no owning structure is meaningless.
            continue;
        }
        if let Some(existing) = linked.iter_mut().find(|d| &d.geometry == detection) {
            existing.building_ids.extend(ids);
        } else {
            linked.push(RoofDetection {
                idx: linked.len() as i64,
                img_name: img_name.to_string(),
                geometry: detection.clone(),
                building_ids: ids,
            });
        }
    }

    debug!(
        "{img_name}: {} of {} detections linked to buildings",
        linked.len(),
        detections.len()
    );
    linked
}

/// Panel-count and capacity estimate ranges for a detection area.
///
/// The ranges encode the uncertainty in real-world panel size and power
/// density. Note that the high capacity bound divides by the LOW per-panel
/// area, mirroring the established estimation formula exactly.
pub fn estimate_ranges(area_sqm: f64) -> (f64, f64, f64, f64) {
    let pc_low = round3(area_sqm / panel::SQM_LOW);
    let pc_high = round3(area_sqm / panel::SQM_HIGH);
    let cap_low = round3(area_sqm * panel::CAP_LOW / panel::SQM_LOW);
    let cap_high = round3(area_sqm * panel::CAP_HIGH / panel::SQM_LOW);
    (pc_low, pc_high, cap_low, cap_high)
}

fn round3(value: f64) -> f64 {
    let factor = 10_f64.powi(ESTIMATE_DECIMALS);
    (value * factor).round() / factor
}

/// Unify all detections per building across images.
///
/// Detections sharing a building id are spatially unioned into one geometry
/// tagged with the distinct contributing image names and detection indices;
/// the geodesic area (target CRS) feeds the estimate ranges.
pub fn unify_per_building(detections: &[RoofDetection]) -> Vec<BuildingDetection> {
    let mut per_building: BTreeMap<i64, Vec<&RoofDetection>> = BTreeMap::new();
    for detection in detections {
        for &fid in &detection.building_ids {
            per_building.entry(fid).or_default().push(detection);
        }
    }

    per_building
        .into_iter()
        .map(|(ogc_fid, group)| {
            let mut geometry = MultiPolygon::new(vec![group[0].geometry.clone()]);
            for detection in &group[1..] {
                geometry = geometry.union(&MultiPolygon::new(vec![detection.geometry.clone()]));
            }

            let mut indices: Vec<i64> = group.iter().map(|d| d.idx).collect();
            indices.sort_unstable();
            indices.dedup();
            let mut img_names: Vec<String> =
                group.iter().map(|d| d.img_name.clone()).collect();
            img_names.sort();
            img_names.dedup();

            let geom_sqm = geometry.geodesic_area_unsigned();
            let (panel_count_low, panel_count_high, cap_low, cap_high) =
                estimate_ranges(geom_sqm);

            BuildingDetection {
                ogc_fid,
                geometry,
                detection_indices: indices,
                img_names,
                geom_sqm,
                panel_count_low,
                panel_count_high,
                cap_low,
                cap_high,
            }
        })
        .collect()
}

/// Join registry units to buildings by point-in-polygon containment.
pub fn link_units_to_buildings(
    units: &[MastrUnit],
    buildings: &[BuildingFootprint],
) -> Vec<UnitBuildingLink> {
    let mut links = Vec::new();
    for unit in units {
        for building in buildings {
            if building.geometry.contains(&unit.location) {
                links.push(UnitBuildingLink {
                    mastr_nummer: unit.mastr_nummer.clone(),
                    location: unit.location,
                    ogc_fid: building.ogc_fid,
                });
            }
        }
    }
    links
}

/// Join unit-building links transitively to the unified detections.
///
/// One row per (unit, building) pair whose building has a unified detection;
/// buildings without an intersecting unit never appear here (they remain
/// queryable through the building-level records alone).
pub fn link_units_to_detections(
    unit_links: &[UnitBuildingLink],
    building_detections: &[BuildingDetection],
) -> Vec<UnitDetectionLink> {
    let by_building: BTreeMap<i64, &BuildingDetection> = building_detections
        .iter()
        .map(|d| (d.ogc_fid, d))
        .collect();

    unit_links
        .iter()
        .filter_map(|link| {
            by_building.get(&link.ogc_fid).map(|detection| UnitDetectionLink {
                mastr_nummer: link.mastr_nummer.clone(),
                location: link.location,
                ogc_fid: link.ogc_fid,
                detection_geometry: detection.geometry.clone(),
                img_names: detection.img_names.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::LineString;

    fn square(min_x: f64, min_y: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (min_x, min_y),
                (min_x + size, min_y),
                (min_x + size, min_y + size),
                (min_x, min_y + size),
                (min_x, min_y),
            ]),
            vec![],
        )
    }

    fn footprint(fid: i64, min_x: f64, min_y: f64, size: f64) -> BuildingFootprint {
        BuildingFootprint {
            ogc_fid: fid,
            geometry: MultiPolygon::new(vec![square(min_x, min_y, size)]),
        }
    }

    #[test]
    fn test_detection_without_building_dropped() {
        let detections = vec![square(100.0, 100.0, 1.0)];
        let buildings = vec![footprint(1, 0.0, 0.0, 10.0)];
        let linked = link_detections_to_buildings("img_a", &detections, &buildings);
        assert!(linked.is_empty());
    }

    #[test]
    fn test_detection_straddling_two_buildings_yields_one_record() {
        // Detection spans the boundary between two adjacent footprints.
        let detections = vec![square(8.0, 2.0, 4.0)];
        let buildings = vec![footprint(1, 0.0, 0.0, 10.0), footprint(2, 10.0, 0.0, 10.0)];
        let linked = link_detections_to_buildings("img_a", &detections, &buildings);
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].building_ids.len(), 2);
        assert!(linked[0].building_ids.contains(&1));
        assert!(linked[0].building_ids.contains(&2));
    }

    #[test]
    fn test_duplicate_geometries_merged() {
        let detections = vec![square(1.0, 1.0, 2.0), square(1.0, 1.0, 2.0)];
        let buildings = vec![footprint(1, 0.0, 0.0, 10.0)];
        let linked = link_detections_to_buildings("img_a", &detections, &buildings);
        assert_eq!(linked.len(), 1);
    }

    #[test]
    fn test_estimate_ranges_preserve_source_formula() {
        let area = 16.0;
        let (pc_low, pc_high, cap_low, cap_high) = estimate_ranges(area);
        assert!((pc_low - 10.0).abs() < 1e-9); // 16 / 1.6
        assert!((pc_high - 9.412).abs() < 1e-9); // 16 / 1.7, rounded
        assert!((cap_low - 2.5).abs() < 1e-9); // 16 * 0.25 / 1.6
        // The high bound divides by SQM_LOW, not SQM_HIGH. This mirrors the
        // established formula; if it were SQM_HIGH the value would be 3.294.
        assert!((cap_high - 3.5).abs() < 1e-9); // 16 * 0.35 / 1.6
    }

    #[test]
    fn test_unify_merges_across_images() {
        let mut ids = BTreeSet::new();
        ids.insert(7);
        let detections = vec![
            RoofDetection {
                idx: 0,
                img_name: "img_a".to_string(),
                geometry: square(0.0, 0.0, 2.0),
                building_ids: ids.clone(),
            },
            RoofDetection {
                idx: 1,
                img_name: "img_b".to_string(),
                geometry: square(5.0, 0.0, 2.0),
                building_ids: ids,
            },
        ];
        let unified = unify_per_building(&detections);
        assert_eq!(unified.len(), 1);
        assert_eq!(unified[0].ogc_fid, 7);
        assert_eq!(unified[0].detection_indices, vec![0, 1]);
        assert_eq!(unified[0].img_names, vec!["img_a", "img_b"]);
        assert_eq!(unified[0].geometry.0.len(), 2);
    }

    #[test]
    fn test_unit_point_in_polygon_linkage() {
        let units = vec![
            MastrUnit {
                mastr_nummer: "SEE1".to_string(),
                location: Point::new(5.0, 5.0),
            },
            MastrUnit {
                mastr_nummer: "SEE2".to_string(),
                location: Point::new(50.0, 50.0),
            },
        ];
        let buildings = vec![footprint(1, 0.0, 0.0, 10.0)];
        let links = link_units_to_buildings(&units, &buildings);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].mastr_nummer, "SEE1");
        assert_eq!(links[0].ogc_fid, 1);
    }

    #[test]
    fn test_unit_detection_linkage_skips_buildings_without_detections() {
        let unit_links = vec![
            UnitBuildingLink {
                mastr_nummer: "SEE1".to_string(),
                location: Point::new(5.0, 5.0),
                ogc_fid: 1,
            },
            UnitBuildingLink {
                mastr_nummer: "SEE2".to_string(),
                location: Point::new(15.0, 5.0),
                ogc_fid: 2,
            },
        ];
        let mut ids = BTreeSet::new();
        ids.insert(1);
        let detections = vec![RoofDetection {
            idx: 0,
            img_name: "img_a".to_string(),
            geometry: square(4.0, 4.0, 2.0),
            building_ids: ids,
        }];
        let building_detections = unify_per_building(&detections);
        let links = link_units_to_detections(&unit_links, &building_detections);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].mastr_nummer, "SEE1");
        assert_eq!(links[0].img_names, vec!["img_a"]);
    }
}
