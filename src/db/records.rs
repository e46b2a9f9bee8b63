//! Row types for the image-metadata and window-clip tables.

use crate::raster::Window;
use geo_types::Polygon;

/// One row of the image-metadata table: a source image's name, world-space
/// boundary and location on disk.
#[derive(Debug, Clone)]
pub struct ImgMetadataRecord {
    /// Image name (file stem, unique).
    pub img_name: String,
    /// Bounding polygon in the target CRS.
    pub boundary: Polygon<f64>,
    /// Directory the image was found in.
    pub dir_path: String,
    /// File name within that directory.
    pub file_path: String,
}

/// One row of the window-clip table: a tile window of an image together
/// with its world-space extent.
#[derive(Debug, Clone)]
pub struct WindowClipRecord {
    /// Index of the window within the image's grid, in iteration order.
    pub idx: i64,
    /// Name of the owning image.
    pub img_name: String,
    /// The pixel window.
    pub window: Window,
    /// Window extent in the target CRS.
    pub boundary: Polygon<f64>,
}
