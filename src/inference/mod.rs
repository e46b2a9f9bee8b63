//! Two-stage tile inference: classify, then conditionally segment.

mod model;

pub use model::{ModelKind, SolarModels};

use crate::constants::imagenet;
use crate::error::Result;
use ndarray::{Array2, Array3, ArrayView3};

/// Prediction for a single tile.
#[derive(Debug, Clone)]
pub struct TilePrediction {
    /// Scalar classification score in [0, 1].
    pub score: f32,
    /// Binary segmentation mask (values in {0, 1}), present only when the
    /// classification score exceeded the positive threshold.
    pub mask: Option<Array2<u8>>,
}

/// Seam between the pipeline and the model pair, so tests can substitute a
/// deterministic predictor for the ONNX sessions.
pub trait TilePredictor {
    /// Predict one raw (unnormalized) (3, T, T) tile.
    fn predict_tile(&mut self, tile: &ArrayView3<'_, f32>) -> Result<TilePrediction>;
}

/// Scale a (bands, H, W) tile to [0, 1] and apply channel-wise ImageNet
/// normalization, producing the tensor layout the models were trained on.
pub fn normalize(tile: &ArrayView3<'_, f32>) -> Array3<f32> {
    let (bands, height, width) = tile.dim();
    let mut out = Array3::<f32>::zeros((bands, height, width));
    for band in 0..bands {
        let mean = imagenet::MEAN[band.min(2)];
        let std = imagenet::STD[band.min(2)];
        for row in 0..height {
            for col in 0..width {
                out[[band, row, col]] = (tile[[band, row, col]] / 255.0 - mean) / std;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_normalize_zero_pixel() {
        let tile = Array3::<f32>::zeros((3, 2, 2));
        let out = normalize(&tile.view());
        // 0/255 = 0, so each channel becomes -mean/std.
        for band in 0..3 {
            let expected = -imagenet::MEAN[band] / imagenet::STD[band];
            assert!((out[[band, 0, 0]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalize_full_intensity() {
        let tile = Array3::<f32>::from_elem((3, 1, 1), 255.0);
        let out = normalize(&tile.view());
        for band in 0..3 {
            let expected = (1.0 - imagenet::MEAN[band]) / imagenet::STD[band];
            assert!((out[[band, 0, 0]] - expected).abs() < 1e-6);
        }
    }
}
