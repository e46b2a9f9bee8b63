//! Whole-image prediction surface with max-merge accumulation.

use crate::constants::PRED_MASK_INIT;
use crate::inference::TilePrediction;
use crate::raster::{SurfaceDtype, Window};
use ndarray::Array2;

/// Accumulates per-tile predictions into one per-image surface.
///
/// The surface starts at the sentinel value (-1, "not yet predicted") and is
/// mutated in place as tiles are merged in window order. Merging takes the
/// element-wise maximum with the existing values, so overlapping tiles never
/// erase a positive written by a neighbor, and a re-merged tile is a no-op.
pub struct PredictionSurface {
    data: Array2<f32>,
    dtype: SurfaceDtype,
    scores: Vec<f32>,
}

impl PredictionSurface {
    /// Allocate a surface for an image of `height` x `width` pixels, filled
    /// with the sentinel.
    pub fn init(height: usize, width: usize, dtype: SurfaceDtype) -> Self {
        Self {
            data: Array2::from_elem((height, width), PRED_MASK_INIT),
            dtype,
            scores: Vec::new(),
        }
    }

    /// Merge one tile's prediction.
    ///
    /// The classification score is always recorded, in window-iteration
    /// order. The mask, when present, is written into the window's actual
    /// writable sub-region: boundary windows whose nominal extent exceeds the
    /// image bounds contribute only their valid top-left part, so no write
    /// ever lands outside the surface.
    pub fn merge(&mut self, prediction: &TilePrediction, window: &Window) {
        self.scores.push(prediction.score);
        let Some(mask) = &prediction.mask else {
            return;
        };

        let (img_h, img_w) = self.data.dim();
        if window.row_off >= img_h || window.col_off >= img_w {
            return;
        }
        let height = (img_h - window.row_off).min(window.height);
        let width = (img_w - window.col_off).min(window.width);

        for row in 0..height {
            for col in 0..width {
                let target = &mut self.data[[window.row_off + row, window.col_off + col]];
                let value = f32::from(mask[[row, col]]);
                if value > *target {
                    *target = value;
                }
            }
        }
    }

    /// The accumulated surface values.
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// The per-tile classification scores, in window-iteration order.
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// The dtype the surface should be persisted with.
    pub fn dtype(&self) -> SurfaceDtype {
        self.dtype
    }
}
