//! Application-wide constants.
//!
//! All magic numbers shared across pipeline stages are defined here to
//! ensure consistency and make changes easy to track.

/// Nominal tile edge length fed to the models, in pixels.
pub const TILE_SIZE: usize = 224;

/// Default stride between tile origins, in pixels.
///
/// Half the tile size, so interior pixels are covered by up to four
/// overlapping tiles.
pub const DEFAULT_STRIDE: usize = 112;

/// Sentinel value marking surface pixels never covered by any tile prediction.
pub const PRED_MASK_INIT: f32 = -1.0;

/// Classification threshold above which a tile is segmented.
pub const CLASSIFICATION_THRESHOLD: f32 = 0.5;

/// Binarization threshold applied to segmenter probability maps.
pub const SEGMENTATION_THRESHOLD: f32 = 0.5;

/// Channel-wise normalization statistics (ImageNet).
pub mod imagenet {
    /// Per-channel mean.
    pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    /// Per-channel standard deviation.
    pub const STD: [f32; 3] = [0.229, 0.224, 0.225];
}

/// Coordinate reference systems used across the pipeline.
pub mod epsg {
    /// CRS of the source aerial imagery (UTM zone 32N).
    pub const SOURCE: u32 = 25832;
    /// CRS all vector results are stored in (WGS 84).
    pub const TARGET: u32 = 4326;
    /// Area-preserving CRS used for the panel-size filter (UTM zone 33N).
    pub const METRIC: u32 = 32633;
}

/// Panel size and capacity assumptions for the per-building estimates.
pub mod panel {
    /// Lower panel-area bound, m^2 per panel (Mayer et al.).
    pub const SQM_LOW: f64 = 1.6;
    /// Upper panel-area bound, m^2 per panel (energie-experten, 2022).
    pub const SQM_HIGH: f64 = 1.7;
    /// Lower capacity bound, kWp per panel.
    pub const CAP_LOW: f64 = 0.25;
    /// Upper capacity bound, kWp per panel.
    pub const CAP_HIGH: f64 = 0.35;
    /// Minimum plausible single-panel area in m^2; detections below this
    /// are discarded as noise. The higher of the two literature estimates.
    pub const MIN_DETECTION_SQM: f64 = SQM_HIGH;
}

/// Directory names under the results directory.
pub mod results {
    /// Sub-directory holding finalized prediction masks.
    pub const MASK_DIR: &str = "mask";
    /// Sub-directory holding per-tile classification score lists.
    pub const CLASS_DIR: &str = "class";
}

/// Model artifact file names inside the models directory.
pub mod model_files {
    /// Classifier ONNX graph.
    pub const CLASSIFIER: &str = "classifier.onnx";
    /// Segmenter ONNX graph.
    pub const SEGMENTER: &str = "segmenter.onnx";
}

/// Decimal places for panel-count and capacity estimates.
pub const ESTIMATE_DECIMALS: i32 = 3;
