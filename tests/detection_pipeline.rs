//! End-to-end test of the in-memory detection path: tile grid, fake tile
//! predictions, surface accumulation, vectorization and building joins.
//!
//! Uses a deterministic predictor instead of the ONNX sessions and a plain
//! pixel-scale geotransform instead of CRS reprojection, so the whole
//! pipeline logic runs without models, GDAL datasets or a database.

#![allow(clippy::unwrap_used)]

use geo::Area;
use geo_types::{LineString, MultiPolygon, Polygon};
use ndarray::{Array2, Array3, ArrayView3};
use solmap::constants::{panel, DEFAULT_STRIDE, PRED_MASK_INIT, TILE_SIZE};
use solmap::error::Result;
use solmap::inference::{TilePrediction, TilePredictor};
use solmap::join::{link_detections_to_buildings, unify_per_building, BuildingFootprint};
use solmap::mask::PredictionSurface;
use solmap::raster::{clip_to_window, window_grid, GeoTransform, SurfaceDtype, Window};
use solmap::vector::{filter_by_area, georeference, trace_mask_polygons};

const IMG: usize = 448;

/// Predicts positive for exactly one grid window and paints a fixed block
/// of its mask; everything else scores low.
struct OneHotPredictor {
    positive: Window,
    calls: usize,
}

impl OneHotPredictor {
    fn new(positive: Window) -> Self {
        Self { positive, calls: 0 }
    }
}

impl TilePredictor for OneHotPredictor {
    fn predict_tile(&mut self, tile: &ArrayView3<'_, f32>) -> Result<TilePrediction> {
        self.calls += 1;
        // Windows are identified by the marker value painted into the image.
        let marker = tile[[0, 0, 0]];
        let is_positive = (marker - window_marker(&self.positive)).abs() < 0.05;
        if !is_positive {
            return Ok(TilePrediction {
                score: 0.1,
                mask: None,
            });
        }
        let mut mask = Array2::<u8>::zeros((TILE_SIZE, TILE_SIZE));
        for row in 50..80 {
            for col in 50..110 {
                mask[[row, col]] = 1;
            }
        }
        Ok(TilePrediction {
            score: 0.9,
            mask: Some(mask),
        })
    }
}

/// A unique per-window value painted at the window origin so the fake
/// predictor can tell tiles apart after extraction.
fn window_marker(window: &Window) -> f32 {
    (window.row_off * IMG + window.col_off) as f32 / 1000.0
}

fn synthetic_image(windows: &[Window]) -> Array3<f32> {
    let mut img = Array3::<f32>::zeros((3, IMG, IMG));
    for window in windows {
        img[[0, window.row_off, window.col_off]] = window_marker(window);
    }
    img
}

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

#[test]
fn test_full_detection_path_on_synthetic_image() {
    let windows = window_grid(IMG, IMG, TILE_SIZE, DEFAULT_STRIDE);
    assert_eq!(windows.len(), 16);

    let positive = windows[5]; // origin (112, 112)
    assert_eq!(positive, Window::square(112, 112, TILE_SIZE));

    let img = synthetic_image(&windows);
    let mut predictor = OneHotPredictor::new(positive);
    let mut surface = PredictionSurface::init(IMG, IMG, SurfaceDtype::Int32);

    for window in &windows {
        let tile = clip_to_window(&img.view(), window);
        let prediction = predictor.predict_tile(&tile.view()).unwrap();
        surface.merge(&prediction, window);
    }

    // Every tile was classified; exactly one crossed the threshold.
    assert_eq!(predictor.calls, 16);
    assert_eq!(surface.scores().len(), 16);
    assert_eq!(
        surface.scores().iter().filter(|&&s| s > 0.5).count(),
        1
    );
    assert!((surface.scores()[5] - 0.9).abs() < f32::EPSILON);

    // The painted block lands at image rows/cols 162..192 x 162..222.
    assert!((surface.data()[[162, 162]] - 1.0).abs() < f32::EPSILON);
    assert!((surface.data()[[191, 221]] - 1.0).abs() < f32::EPSILON);
    // The positive tile writes zeros outside its painted block.
    assert!(surface.data()[[112, 112]].abs() < f32::EPSILON);
    // Pixels never touched by a positive tile keep the sentinel.
    assert!((surface.data()[[0, 0]] - PRED_MASK_INIT).abs() < f32::EPSILON);
    // The finalized surface holds only sentinel, zero and one values.
    assert!(surface.data().iter().all(|&v| {
        (v - PRED_MASK_INIT).abs() < f32::EPSILON
            || v.abs() < f32::EPSILON
            || (v - 1.0).abs() < f32::EPSILON
    }));

    // Vectorize with 1 m pixels: one 30x60 polygon of 1800 m2.
    let traced = trace_mask_polygons(surface.data());
    assert_eq!(traced.len(), 1);
    let gt = GeoTransform::new([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
    let world = georeference(&traced[0], &gt);
    let detections =
        filter_by_area(vec![world], panel::MIN_DETECTION_SQM, |p| Ok(p.unsigned_area())).unwrap();
    assert_eq!(detections.len(), 1);
    assert!((detections[0].unsigned_area() - 1800.0).abs() < 1e-6);
}

#[test]
fn test_detections_survive_only_on_buildings() {
    // Two detections, only one over a footprint.
    let on_roof = square(10.0, -50.0, 5.0);
    let in_field = square(400.0, -400.0, 5.0);
    let buildings = vec![BuildingFootprint {
        ogc_fid: 42,
        geometry: MultiPolygon::new(vec![square(0.0, -60.0, 30.0)]),
    }];

    let linked = link_detections_to_buildings("img_a", &[on_roof, in_field], &buildings);
    assert_eq!(linked.len(), 1);
    assert!(linked[0].building_ids.contains(&42));

    let unified = unify_per_building(&linked);
    assert_eq!(unified.len(), 1);
    assert_eq!(unified[0].ogc_fid, 42);
    assert_eq!(unified[0].img_names, vec!["img_a"]);
    // Estimates follow from the geodesic area; just check they are ordered.
    assert!(unified[0].panel_count_high <= unified[0].panel_count_low);
    assert!(unified[0].cap_low <= unified[0].cap_high);
}

#[test]
fn test_boundary_tiles_are_padded_and_clipped_symmetrically() {
    // A 300x300 image: boundary windows exceed the extent on both axes.
    let windows = window_grid(300, 300, TILE_SIZE, DEFAULT_STRIDE);
    let img = Array3::<f32>::from_elem((3, 300, 300), 7.0);

    let last = *windows.last().unwrap();
    assert_eq!(last, Window::square(224, 224, TILE_SIZE));

    // Extraction pads with zeros to the nominal size.
    let tile = clip_to_window(&img.view(), &last);
    assert_eq!(tile.dim(), (3, TILE_SIZE, TILE_SIZE));
    assert!((tile[[0, 0, 0]] - 7.0).abs() < f32::EPSILON);
    assert!(tile[[0, 100, 100]].abs() < f32::EPSILON);

    // Accumulation clips the mask back to the real extent.
    let mut surface = PredictionSurface::init(300, 300, SurfaceDtype::Int32);
    let prediction = TilePrediction {
        score: 0.9,
        mask: Some(Array2::from_elem((TILE_SIZE, TILE_SIZE), 1)),
    };
    surface.merge(&prediction, &last);
    assert!((surface.data()[[299, 299]] - 1.0).abs() < f32::EPSILON);
    assert!((surface.data()[[223, 223]] - PRED_MASK_INIT).abs() < f32::EPSILON);
}
