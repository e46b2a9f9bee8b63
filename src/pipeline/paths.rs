//! Result file layout under the results directory.

use crate::constants::results;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Resolves result file locations, keyed by stride so runs with different
/// tile grids never overwrite each other.
///
/// Layout: `<results_dir>/mask/<stride>/<img>.tif` for finalized masks and
/// `<results_dir>/class/<stride>/<img>.json` for per-tile score lists.
#[derive(Debug, Clone)]
pub struct ResultPaths {
    results_dir: PathBuf,
    stride: usize,
}

impl ResultPaths {
    /// Create a layout rooted at `results_dir` for the given stride.
    pub fn new(results_dir: &Path, stride: usize) -> Self {
        Self {
            results_dir: results_dir.to_path_buf(),
            stride,
        }
    }

    /// Path of the finalized prediction mask for one image.
    pub fn mask_path(&self, img_name: &str) -> PathBuf {
        self.results_dir
            .join(results::MASK_DIR)
            .join(self.stride.to_string())
            .join(format!("{img_name}.tif"))
    }

    /// Path of the per-tile classification score list for one image.
    pub fn score_path(&self, img_name: &str) -> PathBuf {
        self.results_dir
            .join(results::CLASS_DIR)
            .join(self.stride.to_string())
            .join(format!("{img_name}.json"))
    }

    /// Whether a finalized mask for the image already exists.
    pub fn mask_exists(&self, img_name: &str) -> bool {
        self.mask_path(img_name).exists()
    }

    /// Create the mask and score directories for this stride.
    pub fn ensure_dirs(&self) -> Result<()> {
        for sub in [results::MASK_DIR, results::CLASS_DIR] {
            std::fs::create_dir_all(self.results_dir.join(sub).join(self.stride.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_keyed_by_stride() {
        let paths = ResultPaths::new(Path::new("/out"), 112);
        assert_eq!(
            paths.mask_path("dop20_32_550"),
            PathBuf::from("/out/mask/112/dop20_32_550.tif")
        );
        assert_eq!(
            paths.score_path("dop20_32_550"),
            PathBuf::from("/out/class/112/dop20_32_550.json")
        );

        let other = ResultPaths::new(Path::new("/out"), 224);
        assert_ne!(paths.mask_path("a"), other.mask_path("a"));
    }

    #[test]
    fn test_ensure_dirs_and_mask_exists() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResultPaths::new(dir.path(), 112);
        assert!(paths.ensure_dirs().is_ok());
        assert!(!paths.mask_exists("a"));
        std::fs::write(paths.mask_path("a"), b"tiff").unwrap();
        assert!(paths.mask_exists("a"));
    }
}
