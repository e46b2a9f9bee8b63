//! ONNX sessions for the classifier/segmenter model pair.

use crate::constants::{model_files, SEGMENTATION_THRESHOLD, TILE_SIZE};
use crate::error::{Error, Result};
use crate::inference::TilePrediction;
use ndarray::{Array2, ArrayView3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::{Path, PathBuf};
use tracing::info;

/// The two model roles of the detection pipeline.
///
/// Each maps statically to one ONNX artifact in the models directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Per-tile binary classifier (panel present / absent).
    Classifier,
    /// Per-pixel segmenter, run only on positively classified tiles.
    Segmenter,
}

impl ModelKind {
    /// File name of the ONNX artifact for this role.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Classifier => model_files::CLASSIFIER,
            Self::Segmenter => model_files::SEGMENTER,
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classifier => write!(f, "classifier"),
            Self::Segmenter => write!(f, "segmenter"),
        }
    }
}

/// Loaded classifier and segmenter sessions.
///
/// Sessions are inference-only; a load failure is fatal for the whole run.
pub struct SolarModels {
    classifier: Session,
    segmenter: Session,
}

impl SolarModels {
    /// Load both models from the given directory.
    pub fn load(models_dir: &Path) -> Result<Self> {
        let classifier = load_session(models_dir, ModelKind::Classifier)?;
        let segmenter = load_session(models_dir, ModelKind::Segmenter)?;
        info!("Loaded models from {}", models_dir.display());
        Ok(Self {
            classifier,
            segmenter,
        })
    }

    /// Run the classifier on a normalized (3, T, T) tile tensor; returns the
    /// scalar panel probability.
    pub fn classify(&mut self, input: &ArrayView3<'_, f32>) -> Result<f32> {
        let data = run_session(&mut self.classifier, ModelKind::Classifier, input)?;
        data.first().copied().ok_or(Error::ModelOutputShape {
            kind: ModelKind::Classifier,
            shape: vec![0],
        })
    }

    /// Run the segmenter on a normalized (3, T, T) tile tensor and binarize
    /// the probability map at the segmentation threshold.
    pub fn segment(&mut self, input: &ArrayView3<'_, f32>) -> Result<Array2<u8>> {
        let data = run_session(&mut self.segmenter, ModelKind::Segmenter, input)?;
        if data.len() != TILE_SIZE * TILE_SIZE {
            return Err(Error::ModelOutputShape {
                kind: ModelKind::Segmenter,
                shape: vec![data.len()],
            });
        }
        let mut mask = Array2::<u8>::zeros((TILE_SIZE, TILE_SIZE));
        for row in 0..TILE_SIZE {
            for col in 0..TILE_SIZE {
                let prob = data[row * TILE_SIZE + col];
                mask[[row, col]] = u8::from(prob > SEGMENTATION_THRESHOLD);
            }
        }
        Ok(mask)
    }
}

impl crate::inference::TilePredictor for SolarModels {
    fn predict_tile(&mut self, tile: &ArrayView3<'_, f32>) -> Result<TilePrediction> {
        let normalized = crate::inference::normalize(tile);
        let score = self.classify(&normalized.view())?;
        let mask = if score > crate::constants::CLASSIFICATION_THRESHOLD {
            Some(self.segment(&normalized.view())?)
        } else {
            None
        };
        Ok(TilePrediction { score, mask })
    }
}

fn load_session(models_dir: &Path, kind: ModelKind) -> Result<Session> {
    let path: PathBuf = models_dir.join(kind.file_name());
    if !path.exists() {
        return Err(Error::ModelFileNotFound { path });
    }
    Session::builder()
        .and_then(|b| Ok(b.with_optimization_level(GraphOptimizationLevel::Level3)?))
        .and_then(|mut b| b.commit_from_file(&path))
        .map_err(|e| Error::ModelLoad {
            kind,
            path,
            source: e,
        })
}

fn run_session(
    session: &mut Session,
    kind: ModelKind,
    input: &ArrayView3<'_, f32>,
) -> Result<Vec<f32>> {
    let (bands, height, width) = input.dim();
    let shape = [1_i64, bands as i64, height as i64, width as i64];
    let data: Vec<f32> = input.iter().copied().collect();
    let value = ort::value::Value::from_array((shape.as_slice(), data.into_boxed_slice()))
        .map_err(|e| Error::Inference {
            reason: format!("{kind} input: {e}"),
        })?;

    let input_name = session
        .inputs()
        .first()
        .map(|i| i.name().to_string())
        .ok_or_else(|| Error::Inference {
            reason: format!("{kind} model has no inputs"),
        })?;

    let outputs = session
        .run(ort::inputs![input_name.as_str() => value])
        .map_err(|e| Error::Inference {
            reason: format!("{kind}: {e}"),
        })?;

    let (_, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| Error::Inference {
            reason: format!("{kind} output: {e}"),
        })?;
    Ok(data.to_vec())
}
