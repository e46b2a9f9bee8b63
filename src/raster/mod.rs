//! Georeferenced raster access, tile windows and coordinate transforms.

mod dataset;
mod transform;
mod window;

pub use dataset::{write_mask_tiff, RasterImage, SurfaceDtype};
pub use transform::{GeoTransform, Reprojector};
pub use window::{clip_to_window, window_grid, Window};
