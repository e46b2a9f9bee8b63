//! Georeferenced raster reading and mask writing via GDAL.

use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use gdal::raster::{Buffer, GdalDataType, RasterCreationOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Array3};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Element type of a finalized prediction surface.
///
/// Matches the source image's band dtype when all bands share one;
/// otherwise falls back to 32-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceDtype {
    /// 32-bit float surface.
    Float32,
    /// 32-bit integer surface (fallback).
    Int32,
}

/// An open source image: pixel dimensions, geotransform and CRS.
///
/// Immutable once read; the pixel payload is loaded separately with
/// [`RasterImage::read_pixels`] so metadata-only passes stay cheap.
pub struct RasterImage {
    path: PathBuf,
    dataset: Dataset,
    width: usize,
    height: usize,
    band_count: usize,
    geo_transform: GeoTransform,
}

impl RasterImage {
    /// Open a raster file and read its metadata.
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path).map_err(|e| Error::RasterOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count();
        let coeffs = dataset.geo_transform().map_err(|e| Error::RasterOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            dataset,
            width,
            height,
            band_count,
            geo_transform: GeoTransform::new(coeffs),
        })
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of raster bands.
    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// The pixel-to-world affine transform.
    pub fn geo_transform(&self) -> GeoTransform {
        self.geo_transform
    }

    /// The dataset's spatial reference system.
    pub fn spatial_ref(&self) -> Result<SpatialRef> {
        self.dataset.spatial_ref().map_err(|e| Error::RasterOpen {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Surface dtype policy: keep f32 when every band is f32, else i32.
    pub fn surface_dtype(&self) -> Result<SurfaceDtype> {
        let mut types = Vec::with_capacity(self.band_count);
        for idx in 1..=self.band_count {
            let band = self.dataset.rasterband(idx).map_err(|e| Error::RasterRead {
                path: self.path.clone(),
                source: e,
            })?;
            types.push(band.band_type());
        }
        let all_same = types.windows(2).all(|w| w[0] == w[1]);
        if all_same && types.first() == Some(&GdalDataType::Float32) {
            Ok(SurfaceDtype::Float32)
        } else {
            Ok(SurfaceDtype::Int32)
        }
    }

    /// Read the first three bands into a (bands, height, width) f32 array.
    pub fn read_pixels(&self) -> Result<Array3<f32>> {
        if self.band_count < 3 {
            return Err(Error::RasterBandCount {
                path: self.path.clone(),
                bands: self.band_count,
            });
        }
        let mut pixels = Array3::<f32>::zeros((3, self.height, self.width));
        for band_idx in 1..=3 {
            let band = self
                .dataset
                .rasterband(band_idx)
                .map_err(|e| Error::RasterRead {
                    path: self.path.clone(),
                    source: e,
                })?;
            let buffer = band
                .read_as::<f32>(
                    (0, 0),
                    (self.width, self.height),
                    (self.width, self.height),
                    None,
                )
                .map_err(|e| Error::RasterRead {
                    path: self.path.clone(),
                    source: e,
                })?;
            let data = buffer.data();
            for row in 0..self.height {
                for col in 0..self.width {
                    pixels[[band_idx - 1, row, col]] = data[row * self.width + col];
                }
            }
        }
        debug!(
            "Read {}x{}x3 pixels from {}",
            self.height,
            self.width,
            self.path.display()
        );
        Ok(pixels)
    }

    /// Read the first band as a 2D array (used to load persisted masks).
    pub fn read_band(&self) -> Result<Array2<f32>> {
        let band = self.dataset.rasterband(1).map_err(|e| Error::RasterRead {
            path: self.path.clone(),
            source: e,
        })?;
        let buffer = band
            .read_as::<f32>(
                (0, 0),
                (self.width, self.height),
                (self.width, self.height),
                None,
            )
            .map_err(|e| Error::RasterRead {
                path: self.path.clone(),
                source: e,
            })?;
        let data = buffer.data();
        let mut out = Array2::<f32>::zeros((self.height, self.width));
        for row in 0..self.height {
            for col in 0..self.width {
                out[[row, col]] = data[row * self.width + col];
            }
        }
        Ok(out)
    }
}

/// Write a single-band LZW-compressed GeoTIFF carrying the source image's
/// geotransform and CRS.
///
/// A failed write can leave a corrupt file behind; one bounded retry deletes
/// the partial file and writes again before giving up.
pub fn write_mask_tiff(
    path: &Path,
    surface: &Array2<f32>,
    dtype: SurfaceDtype,
    geo_transform: &GeoTransform,
    spatial_ref: &SpatialRef,
) -> Result<()> {
    match try_write_mask_tiff(path, surface, dtype, geo_transform, spatial_ref) {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!("Mask write failed ({first}), removing partial file and retrying once");
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            try_write_mask_tiff(path, surface, dtype, geo_transform, spatial_ref)
        }
    }
}

fn try_write_mask_tiff(
    path: &Path,
    surface: &Array2<f32>,
    dtype: SurfaceDtype,
    geo_transform: &GeoTransform,
    spatial_ref: &SpatialRef,
) -> Result<()> {
    let raster_err = |e: gdal::errors::GdalError| Error::RasterWrite {
        path: path.to_path_buf(),
        source: e,
    };

    let driver = DriverManager::get_driver_by_name("GTiff").map_err(raster_err)?;
    let (height, width) = surface.dim();
    let options = RasterCreationOptions::from_iter(["COMPRESS=LZW"]);

    let mut dataset = match dtype {
        SurfaceDtype::Float32 => driver
            .create_with_band_type_with_options::<f32, _>(path, width, height, 1, &options)
            .map_err(raster_err)?,
        SurfaceDtype::Int32 => driver
            .create_with_band_type_with_options::<i32, _>(path, width, height, 1, &options)
            .map_err(raster_err)?,
    };
    dataset
        .set_geo_transform(&geo_transform.coeffs())
        .map_err(raster_err)?;
    dataset.set_spatial_ref(spatial_ref).map_err(raster_err)?;

    let mut band = dataset.rasterband(1).map_err(raster_err)?;
    match dtype {
        SurfaceDtype::Float32 => {
            let data: Vec<f32> = surface.iter().copied().collect();
            let mut buffer = Buffer::new((width, height), data);
            band.write((0, 0), (width, height), &mut buffer)
                .map_err(raster_err)?;
        }
        SurfaceDtype::Int32 => {
            let data: Vec<i32> = surface.iter().map(|&v| v as i32).collect();
            let mut buffer = Buffer::new((width, height), data);
            band.write((0, 0), (width, height), &mut buffer)
                .map_err(raster_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gdal::spatial_ref::SpatialRef;
    use ndarray::Array2;

    // 3 rows x 4 columns holding all three surface values.
    fn sample_surface() -> Array2<f32> {
        let mut surface = Array2::<f32>::from_elem((3, 4), -1.0);
        surface[[0, 0]] = 0.0;
        surface[[1, 2]] = 1.0;
        surface
    }

    fn sample_transform() -> GeoTransform {
        GeoTransform::new([500_000.0, 0.2, 0.0, 5_600_000.0, 0.0, -0.2])
    }

    fn srs_25832() -> SpatialRef {
        SpatialRef::from_epsg(25832).unwrap()
    }

    #[test]
    fn test_mask_round_trip_int32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tif");
        write_mask_tiff(
            &path,
            &sample_surface(),
            SurfaceDtype::Int32,
            &sample_transform(),
            &srs_25832(),
        )
        .unwrap();

        let raster = RasterImage::open(&path).unwrap();
        assert_eq!(raster.width(), 4);
        assert_eq!(raster.height(), 3);
        assert_eq!(raster.band_count(), 1);
        assert_eq!(raster.surface_dtype().unwrap(), SurfaceDtype::Int32);

        let coeffs = raster.geo_transform().coeffs();
        assert!((coeffs[0] - 500_000.0).abs() < 1e-9);
        assert!((coeffs[1] - 0.2).abs() < 1e-9);
        assert!((coeffs[5] + 0.2).abs() < 1e-9);

        let band = raster.read_band().unwrap();
        assert!(band[[0, 0]].abs() < f32::EPSILON);
        assert!((band[[1, 2]] - 1.0).abs() < f32::EPSILON);
        assert!((band[[2, 3]] + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mask_round_trip_float32_keeps_dtype() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tif");
        write_mask_tiff(
            &path,
            &sample_surface(),
            SurfaceDtype::Float32,
            &sample_transform(),
            &srs_25832(),
        )
        .unwrap();

        let raster = RasterImage::open(&path).unwrap();
        assert_eq!(raster.surface_dtype().unwrap(), SurfaceDtype::Float32);
        let band = raster.read_band().unwrap();
        assert!((band[[1, 2]] - 1.0).abs() < f32::EPSILON);
        assert!((band[[0, 1]] + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_write_replaces_leftover_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tif");
        // A stale partial file from an interrupted run sits at the target;
        // the write (retrying once after deleting it if needed) must leave
        // a valid raster behind.
        std::fs::write(&path, b"not a tiff").unwrap();
        write_mask_tiff(
            &path,
            &sample_surface(),
            SurfaceDtype::Int32,
            &sample_transform(),
            &srs_25832(),
        )
        .unwrap();

        let raster = RasterImage::open(&path).unwrap();
        let band = raster.read_band().unwrap();
        assert!((band[[1, 2]] - 1.0).abs() < f32::EPSILON);
    }
}
