//! Pixel-to-world geotransforms and CRS reprojection.

use crate::error::{Error, Result};
use crate::raster::Window;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use geo_types::{Coord, LineString, Polygon};

/// Affine pixel-to-world mapping in GDAL order:
/// `x = c[0] + col * c[1] + row * c[2]`, `y = c[3] + col * c[4] + row * c[5]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    coeffs: [f64; 6],
}

impl GeoTransform {
    /// Wrap raw GDAL geotransform coefficients.
    pub fn new(coeffs: [f64; 6]) -> Self {
        Self { coeffs }
    }

    /// The raw coefficient array, suitable for `Dataset::set_geo_transform`.
    pub fn coeffs(&self) -> [f64; 6] {
        self.coeffs
    }

    /// Map a pixel corner (column, row) to world coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.coeffs;
        (
            c[0] + col * c[1] + row * c[2],
            c[3] + col * c[4] + row * c[5],
        )
    }

    /// World-space bounding polygon of a pixel window, counter-clockwise.
    pub fn window_polygon(&self, window: &Window) -> Polygon<f64> {
        let (x0, y0) = self.apply(window.col_off as f64, window.row_off as f64);
        let (x1, y1) = self.apply(
            (window.col_off + window.width) as f64,
            (window.row_off + window.height) as f64,
        );
        let (min_x, max_x) = (x0.min(x1), x0.max(x1));
        let (min_y, max_y) = (y0.min(y1), y0.max(y1));
        Polygon::new(
            LineString::from(vec![
                (min_x, min_y),
                (max_x, min_y),
                (max_x, max_y),
                (min_x, max_y),
                (min_x, min_y),
            ]),
            vec![],
        )
    }
}

/// Reprojects geometries between two EPSG coordinate reference systems.
///
/// Axis order is pinned to the traditional GIS (x = easting/longitude)
/// convention on both sides so EPSG:4326 geometries come out lon/lat.
pub struct Reprojector {
    transform: CoordTransform,
}

impl Reprojector {
    /// Build a transform from `source` EPSG code to `target` EPSG code.
    pub fn new(source: u32, target: u32) -> Result<Self> {
        let mut src = SpatialRef::from_epsg(source).map_err(|e| Error::CoordTransform {
            reason: format!("EPSG:{source}: {e}"),
        })?;
        let mut dst = SpatialRef::from_epsg(target).map_err(|e| Error::CoordTransform {
            reason: format!("EPSG:{target}: {e}"),
        })?;
        src.set_axis_mapping_strategy(gdal::spatial_ref::AxisMappingStrategy::TraditionalGisOrder);
        dst.set_axis_mapping_strategy(gdal::spatial_ref::AxisMappingStrategy::TraditionalGisOrder);
        let transform = CoordTransform::new(&src, &dst).map_err(|e| Error::CoordTransform {
            reason: format!("EPSG:{source} -> EPSG:{target}: {e}"),
        })?;
        Ok(Self { transform })
    }

    /// Reproject a single coordinate.
    pub fn coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut xs = [coord.x];
        let mut ys = [coord.y];
        let mut zs = [0.0];
        self.transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| Error::CoordTransform {
                reason: e.to_string(),
            })?;
        Ok(Coord { x: xs[0], y: ys[0] })
    }

    /// Reproject every vertex of a polygon, preserving ring structure.
    pub fn polygon(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
        let exterior = self.line_string(polygon.exterior())?;
        let interiors = polygon
            .interiors()
            .iter()
            .map(|ring| self.line_string(ring))
            .collect::<Result<Vec<_>>>()?;
        Ok(Polygon::new(exterior, interiors))
    }

    fn line_string(&self, ring: &LineString<f64>) -> Result<LineString<f64>> {
        let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
        let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
        let mut zs = vec![0.0; xs.len()];
        self.transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| Error::CoordTransform {
                reason: e.to_string(),
            })?;
        Ok(LineString::from(
            xs.into_iter().zip(ys).map(|(x, y)| (x, y)).collect::<Vec<_>>(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_identity_like_transform() {
        // Origin at (1000, 2000), 0.1 m pixels, north-up raster.
        let gt = GeoTransform::new([1000.0, 0.1, 0.0, 2000.0, 0.0, -0.1]);
        let (x, y) = gt.apply(0.0, 0.0);
        assert!((x - 1000.0).abs() < 1e-9);
        assert!((y - 2000.0).abs() < 1e-9);
        let (x, y) = gt.apply(10.0, 20.0);
        assert!((x - 1001.0).abs() < 1e-9);
        assert!((y - 1998.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_polygon_bounds() {
        let gt = GeoTransform::new([0.0, 1.0, 0.0, 100.0, 0.0, -1.0]);
        let poly = gt.window_polygon(&Window::square(10, 20, 5));
        let coords: Vec<_> = poly.exterior().coords().copied().collect();
        let min_x = coords.iter().map(|c| c.x).fold(f64::INFINITY, f64::min);
        let max_y = coords.iter().map(|c| c.y).fold(f64::NEG_INFINITY, f64::max);
        assert!((min_x - 10.0).abs() < 1e-9);
        assert!((max_y - 80.0).abs() < 1e-9);
    }
}
