//! Pipeline stages: preprocess, predict, postprocess and map.

mod mapping;
mod paths;
mod postprocess;
mod predict;
mod preprocess;
pub mod progress;

pub use mapping::run_map;
pub use paths::ResultPaths;
pub use postprocess::run_postprocess;
pub use predict::{run_predict, should_predict, PredictCheck};
pub use preprocess::{collect_imagery, run_preprocess};
