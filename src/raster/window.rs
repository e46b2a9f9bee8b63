//! Tile windows and the deterministic window grid.

use ndarray::{s, Array3, ArrayView3};

/// A rectangular pixel region of a source image.
///
/// Windows at the right/bottom image boundary keep their nominal size;
/// clipping to the actual image extent is deferred to tile extraction and
/// mask accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Column offset of the top-left corner.
    pub col_off: usize,
    /// Row offset of the top-left corner.
    pub row_off: usize,
    /// Nominal width in pixels.
    pub width: usize,
    /// Nominal height in pixels.
    pub height: usize,
}

impl Window {
    /// Create a square window of `size` pixels at the given offsets.
    pub fn square(col_off: usize, row_off: usize, size: usize) -> Self {
        Self {
            col_off,
            row_off,
            width: size,
            height: size,
        }
    }
}

/// Enumerate the tile windows covering an image of `height` x `width` pixels.
///
/// Windows are produced in row-major order (rows outer, columns inner) with
/// origins at every `stride` pixels, each with nominal `tile_size` extent.
/// The sequence is a pure function of its inputs, so repeated calls yield
/// the identical grid; downstream code relies on this ordering.
pub fn window_grid(height: usize, width: usize, tile_size: usize, stride: usize) -> Vec<Window> {
    let mut windows = Vec::new();
    if stride == 0 {
        return windows;
    }
    let mut row = 0;
    while row < height {
        let mut col = 0;
        while col < width {
            windows.push(Window {
                col_off: col,
                row_off: row,
                width: tile_size,
                height: tile_size,
            });
            col += stride;
        }
        row += stride;
    }
    windows
}

/// Extract the pixels of `window` from a (bands, height, width) image array,
/// zero-padding to the full nominal window size when the window reaches past
/// the right or bottom image edge. Padding is aligned to the top-left, where
/// the real pixels sit.
pub fn clip_to_window(img: &ArrayView3<'_, f32>, window: &Window) -> Array3<f32> {
    let (bands, img_h, img_w) = img.dim();
    let avail_h = img_h.saturating_sub(window.row_off).min(window.height);
    let avail_w = img_w.saturating_sub(window.col_off).min(window.width);

    let mut clip = Array3::<f32>::zeros((bands, window.height, window.width));
    if avail_h > 0 && avail_w > 0 {
        clip.slice_mut(s![.., ..avail_h, ..avail_w]).assign(&img.slice(s![
            ..,
            window.row_off..window.row_off + avail_h,
            window.col_off..window.col_off + avail_w
        ]));
    }
    clip
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_grid_covers_every_pixel() {
        let windows = window_grid(300, 500, 224, 112);
        for (row, col) in [(0, 0), (299, 499), (150, 250), (299, 0), (0, 499)] {
            let covered = windows.iter().any(|w| {
                row >= w.row_off
                    && row < w.row_off + w.height
                    && col >= w.col_off
                    && col < w.col_off + w.width
            });
            assert!(covered, "pixel ({row}, {col}) not covered");
        }
    }

    #[test]
    fn test_grid_row_major_order() {
        let windows = window_grid(448, 448, 224, 112);
        assert_eq!(windows.len(), 16);
        // 4x4 origins at {0, 112, 224, 336}, rows outer
        assert_eq!(windows[0], Window::square(0, 0, 224));
        assert_eq!(windows[1], Window::square(112, 0, 224));
        assert_eq!(windows[4], Window::square(0, 112, 224));
        assert_eq!(windows[15], Window::square(336, 336, 224));
    }

    #[test]
    fn test_grid_deterministic() {
        assert_eq!(window_grid(448, 448, 224, 112), window_grid(448, 448, 224, 112));
    }

    #[test]
    fn test_grid_windows_not_preclipped() {
        let windows = window_grid(300, 300, 224, 112);
        // The last origin is 224; its nominal extent reaches past the edge.
        let last = windows.last().copied().unwrap_or(Window::square(0, 0, 0));
        assert_eq!(last.col_off, 224);
        assert_eq!(last.width, 224);
    }

    #[test]
    fn test_grid_zero_stride_is_empty() {
        assert!(window_grid(448, 448, 224, 0).is_empty());
    }

    #[test]
    fn test_clip_full_interior_window() {
        let img = Array3::<f32>::from_elem((3, 10, 10), 2.0);
        let clip = clip_to_window(&img.view(), &Window::square(0, 0, 4));
        assert_eq!(clip.dim(), (3, 4, 4));
        assert!(clip.iter().all(|&v| (v - 2.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_clip_boundary_window_zero_padded() {
        let img = Array3::<f32>::from_elem((3, 10, 10), 1.0);
        let clip = clip_to_window(&img.view(), &Window::square(8, 8, 4));
        assert_eq!(clip.dim(), (3, 4, 4));
        // Top-left 2x2 holds real pixels, the rest is zero padding.
        assert!((clip[[0, 0, 0]] - 1.0).abs() < f32::EPSILON);
        assert!((clip[[0, 1, 1]] - 1.0).abs() < f32::EPSILON);
        assert!(clip[[0, 2, 2]].abs() < f32::EPSILON);
        assert!(clip[[0, 3, 0]].abs() < f32::EPSILON);
        assert!(clip[[0, 0, 3]].abs() < f32::EPSILON);
    }
}
