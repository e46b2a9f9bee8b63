//! Per-image mask accumulation.

mod surface;

pub use surface::PredictionSurface;
