//! Vectorization of finalized prediction surfaces into detection polygons.

mod trace;

pub use trace::trace_mask_polygons;

use crate::constants::panel;
use crate::error::Result;
use crate::raster::{GeoTransform, Reprojector};
use geo::Area;
use geo_types::{LineString, Polygon};
use ndarray::Array2;
use tracing::debug;

/// Apply a pixel-to-world geotransform to every vertex of a pixel-space
/// polygon, yielding the polygon in the raster's source CRS.
pub fn georeference(polygon: &Polygon<f64>, geo_transform: &GeoTransform) -> Polygon<f64> {
    let map_ring = |ring: &LineString<f64>| {
        LineString::from(
            ring.coords()
                .map(|c| geo_transform.apply(c.x, c.y))
                .collect::<Vec<_>>(),
        )
    };
    Polygon::new(
        map_ring(polygon.exterior()),
        polygon.interiors().iter().map(map_ring).collect(),
    )
}

/// Drop polygons whose real-world area is below `min_sqm`.
///
/// `metric_area` computes the area of a polygon in square meters; it is a
/// parameter so tests can supply a plain pixel-scale conversion instead of a
/// CRS reprojection.
pub fn filter_by_area<F>(
    polygons: Vec<Polygon<f64>>,
    min_sqm: f64,
    metric_area: F,
) -> Result<Vec<Polygon<f64>>>
where
    F: Fn(&Polygon<f64>) -> Result<f64>,
{
    let mut surviving = Vec::with_capacity(polygons.len());
    for polygon in polygons {
        let area = metric_area(&polygon)?;
        if area >= min_sqm {
            surviving.push(polygon);
        } else {
            debug!("Dropping detection below panel-size threshold ({area:.3} m2)");
        }
    }
    Ok(surviving)
}

/// Planar area of a target-CRS polygon measured in the area-preserving
/// metric CRS.
pub fn metric_area(to_metric: &Reprojector, polygon: &Polygon<f64>) -> Result<f64> {
    Ok(to_metric.polygon(polygon)?.unsigned_area())
}

/// Full vectorization of one finalized surface: trace positive pixels,
/// georeference in the source CRS, reproject to the target CRS, and filter
/// by the minimum plausible single-panel area.
///
/// An empty result is valid: the image simply contributes no detections.
pub fn extract_detections(
    surface: &Array2<f32>,
    geo_transform: &GeoTransform,
    source_to_target: &Reprojector,
    target_to_metric: &Reprojector,
) -> Result<Vec<Polygon<f64>>> {
    let traced = trace_mask_polygons(surface);
    debug!("Traced {} raw polygon(s) from surface", traced.len());

    let mut in_target = Vec::with_capacity(traced.len());
    for pixel_poly in &traced {
        let source_poly = georeference(pixel_poly, geo_transform);
        in_target.push(source_to_target.polygon(&source_poly)?);
    }

    filter_by_area(in_target, panel::MIN_DETECTION_SQM, |poly| {
        metric_area(target_to_metric, poly)
    })
}
