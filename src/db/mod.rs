//! Persistence gateway over the PostGIS store.
//!
//! Geometries travel as WKT through `ST_GeomFromText`/`ST_AsText`; every
//! result table is append-only and idempotence-guarded by an existence
//! pre-check rather than upsert semantics. The store is a synchronous facade
//! over a tokio runtime, scoped to one pipeline run and passed explicitly
//! into each stage (no module-level shared engine).

mod records;

pub use records::{ImgMetadataRecord, WindowClipRecord};

use crate::error::{Error, Result};
use crate::join::{
    BuildingDetection, BuildingFootprint, MastrUnit, RoofDetection, UnitBuildingLink,
    UnitDetectionLink,
};
use crate::raster::Window;
use geo_types::{MultiPolygon, Point, Polygon};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;
use tracing::info;
use wkt::{ToWkt, TryFromWkt};

/// Result tables whose population is guarded once per run.
#[derive(Debug, Clone, Copy)]
pub enum MappingTable {
    /// Unit-to-building links.
    MastrBuilding,
    /// Unified detections per building.
    RoofDetectionsBuilding,
    /// Unit-to-detection links.
    RoofDetectionsMastr,
}

impl MappingTable {
    fn qualified_name(self) -> &'static str {
        match self {
            Self::MastrBuilding => "mapping.mastr_building",
            Self::RoofDetectionsBuilding => "mapping.roof_detections_building",
            Self::RoofDetectionsMastr => "mapping.roof_detections_mastr",
        }
    }
}

/// Connection to the spatial store.
pub struct Store {
    runtime: tokio::runtime::Runtime,
    pool: PgPool,
}

impl Store {
    /// Connect to the database at `database_url`.
    pub fn connect(database_url: &str) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Internal {
            message: format!("failed to create async runtime: {e}"),
        })?;
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(4)
                    .connect(database_url),
            )
            .map_err(|e| Error::DbConnect { source: e })?;
        info!("Connected to spatial store");
        Ok(Self { runtime, pool })
    }

    /// Create the result schemas and tables, optionally dropping existing
    /// result tables first.
    pub fn ensure_schema(&self, drop_results: bool) -> Result<()> {
        let mut statements: Vec<&str> = Vec::new();
        if drop_results {
            statements.extend([
                "DROP TABLE IF EXISTS mapping.roof_detections_mastr CASCADE",
                "DROP TABLE IF EXISTS mapping.roof_detections_building CASCADE",
                "DROP TABLE IF EXISTS mapping.mastr_building CASCADE",
                "DROP TABLE IF EXISTS images.roof_detections CASCADE",
                "DROP TABLE IF EXISTS images.window_clips CASCADE",
                "DROP TABLE IF EXISTS images.metadata CASCADE",
            ]);
        }
        statements.extend([
            "CREATE SCHEMA IF NOT EXISTS images",
            "CREATE SCHEMA IF NOT EXISTS mapping",
            "CREATE TABLE IF NOT EXISTS images.metadata (
                name TEXT PRIMARY KEY,
                geom GEOMETRY(POLYGON, 4326),
                dir TEXT,
                file TEXT
            )",
            "CREATE TABLE IF NOT EXISTS images.window_clips (
                idx BIGINT,
                img_name TEXT REFERENCES images.metadata(name),
                geom GEOMETRY(POLYGON, 4326),
                col_off BIGINT,
                row_off BIGINT,
                width BIGINT,
                height BIGINT,
                PRIMARY KEY (idx, img_name)
            )",
            "CREATE TABLE IF NOT EXISTS images.roof_detections (
                idx BIGINT,
                img_name TEXT REFERENCES images.metadata(name),
                geom GEOMETRY(POLYGON, 4326),
                ogc_fid BIGINT[],
                PRIMARY KEY (idx, img_name)
            )",
            "CREATE TABLE IF NOT EXISTS mapping.mastr_building (
                mastr_nummer TEXT,
                geom GEOMETRY(POINT, 4326),
                ogc_fid BIGINT,
                PRIMARY KEY (mastr_nummer, ogc_fid)
            )",
            "CREATE TABLE IF NOT EXISTS mapping.roof_detections_building (
                ogc_fid BIGINT PRIMARY KEY,
                geom GEOMETRY,
                idx BIGINT[],
                img_name TEXT[],
                geom_sqm DOUBLE PRECISION,
                pc_low DOUBLE PRECISION,
                pc_high DOUBLE PRECISION,
                cap_low DOUBLE PRECISION,
                cap_high DOUBLE PRECISION
            )",
            "CREATE TABLE IF NOT EXISTS mapping.roof_detections_mastr (
                mastr_nummer TEXT,
                geom_mastr GEOMETRY(POINT, 4326),
                ogc_fid BIGINT,
                geom_rd GEOMETRY,
                img_name TEXT[],
                PRIMARY KEY (mastr_nummer, ogc_fid)
            )",
        ]);
        self.runtime.block_on(async {
            for statement in statements {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Error::DbQuery {
                        context: "ensure schema".to_string(),
                        source: e,
                    })?;
            }
            Ok(())
        })
    }

    // ----- reads -----

    /// All registered image metadata rows.
    pub fn all_images(&self) -> Result<Vec<ImgMetadataRecord>> {
        let rows = self.runtime.block_on(async {
            sqlx::query("SELECT name, ST_AsText(geom) AS wkt, dir, file FROM images.metadata ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: "fetch image metadata".to_string(),
                    source: e,
                })
        })?;
        rows.into_iter()
            .map(|row| {
                Ok(ImgMetadataRecord {
                    img_name: get(&row, "name")?,
                    boundary: parse_polygon(&get::<String>(&row, "wkt")?, "images.metadata.geom")?,
                    dir_path: get(&row, "dir")?,
                    file_path: get(&row, "file")?,
                })
            })
            .collect()
    }

    /// The window clips of one image, in grid iteration order.
    pub fn window_clips(&self, img_name: &str) -> Result<Vec<WindowClipRecord>> {
        let rows = self.runtime.block_on(async {
            sqlx::query(
                "SELECT idx, img_name, ST_AsText(geom) AS wkt, col_off, row_off, width, height
                 FROM images.window_clips WHERE img_name = $1 ORDER BY idx",
            )
            .bind(img_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbQuery {
                context: format!("fetch window clips for '{img_name}'"),
                source: e,
            })
        })?;
        rows.into_iter()
            .map(|row| {
                Ok(WindowClipRecord {
                    idx: get(&row, "idx")?,
                    img_name: get(&row, "img_name")?,
                    boundary: parse_polygon(&get::<String>(&row, "wkt")?, "images.window_clips.geom")?,
                    window: Window {
                        col_off: get::<i64>(&row, "col_off")? as usize,
                        row_off: get::<i64>(&row, "row_off")? as usize,
                        width: get::<i64>(&row, "width")? as usize,
                        height: get::<i64>(&row, "height")? as usize,
                    },
                })
            })
            .collect()
    }

    /// Building footprints whose precomputed image list contains `img_name`.
    pub fn buildings_intersecting(&self, img_name: &str) -> Result<Vec<BuildingFootprint>> {
        let rows = self.runtime.block_on(async {
            sqlx::query(
                "SELECT DISTINCT ogc_fid, ST_AsText(geom) AS wkt
                 FROM building.layout WHERE $1 = ANY(img_names) ORDER BY ogc_fid",
            )
            .bind(img_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbQuery {
                context: format!("fetch buildings for '{img_name}'"),
                source: e,
            })
        })?;
        rows.into_iter()
            .map(|row| {
                Ok(BuildingFootprint {
                    ogc_fid: get(&row, "ogc_fid")?,
                    geometry: parse_multi_polygon(&get::<String>(&row, "wkt")?, "building.layout.geom")?,
                })
            })
            .collect()
    }

    /// All building footprints in the reference area.
    pub fn all_buildings(&self) -> Result<Vec<BuildingFootprint>> {
        let rows = self.runtime.block_on(async {
            sqlx::query("SELECT ogc_fid, ST_AsText(geom) AS wkt FROM building.layout ORDER BY ogc_fid")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: "fetch buildings".to_string(),
                    source: e,
                })
        })?;
        rows.into_iter()
            .map(|row| {
                Ok(BuildingFootprint {
                    ogc_fid: get(&row, "ogc_fid")?,
                    geometry: parse_multi_polygon(&get::<String>(&row, "wkt")?, "building.layout.geom")?,
                })
            })
            .collect()
    }

    /// All registered solar units with their point locations.
    pub fn solar_units(&self) -> Result<Vec<MastrUnit>> {
        let rows = self.runtime.block_on(async {
            sqlx::query("SELECT mastr_nummer, ST_AsText(geom) AS wkt FROM mastr.solar_units ORDER BY mastr_nummer")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: "fetch solar units".to_string(),
                    source: e,
                })
        })?;
        rows.into_iter()
            .map(|row| {
                Ok(MastrUnit {
                    mastr_nummer: get(&row, "mastr_nummer")?,
                    location: parse_point(&get::<String>(&row, "wkt")?, "mastr.solar_units.geom")?,
                })
            })
            .collect()
    }

    /// All persisted roof detections across images.
    pub fn all_roof_detections(&self) -> Result<Vec<RoofDetection>> {
        let rows = self.runtime.block_on(async {
            sqlx::query(
                "SELECT idx, img_name, ST_AsText(geom) AS wkt, ogc_fid
                 FROM images.roof_detections ORDER BY img_name, idx",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbQuery {
                context: "fetch roof detections".to_string(),
                source: e,
            })
        })?;
        rows.into_iter()
            .map(|row| {
                let ids: Vec<i64> = get(&row, "ogc_fid")?;
                Ok(RoofDetection {
                    idx: get(&row, "idx")?,
                    img_name: get(&row, "img_name")?,
                    geometry: parse_polygon(&get::<String>(&row, "wkt")?, "images.roof_detections.geom")?,
                    building_ids: ids.into_iter().collect::<BTreeSet<i64>>(),
                })
            })
            .collect()
    }

    // ----- existence checks -----

    /// Whether metadata for the image name is already registered.
    pub fn image_exists(&self, img_name: &str) -> Result<bool> {
        self.exists_with_img_name("SELECT 1 FROM images.metadata WHERE name = $1 LIMIT 1", img_name)
    }

    /// Whether window clips for the image are already registered.
    pub fn clips_exist(&self, img_name: &str) -> Result<bool> {
        self.exists_with_img_name(
            "SELECT 1 FROM images.window_clips WHERE img_name = $1 LIMIT 1",
            img_name,
        )
    }

    /// Whether detection rows for the image already exist.
    pub fn detections_exist(&self, img_name: &str) -> Result<bool> {
        self.exists_with_img_name(
            "SELECT 1 FROM images.roof_detections WHERE img_name = $1 LIMIT 1",
            img_name,
        )
    }

    /// Whether a mapping result table already holds any rows.
    pub fn mapping_populated(&self, table: MappingTable) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} LIMIT 1", table.qualified_name());
        let row = self.runtime.block_on(async {
            sqlx::query(&sql)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!("existence check on {}", table.qualified_name()),
                    source: e,
                })
        })?;
        Ok(row.is_some())
    }

    fn exists_with_img_name(&self, sql: &str, img_name: &str) -> Result<bool> {
        let row = self.runtime.block_on(async {
            sqlx::query(sql)
                .bind(img_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!("existence check for '{img_name}'"),
                    source: e,
                })
        })?;
        Ok(row.is_some())
    }

    // ----- deletes (forced re-runs only) -----

    /// Remove the detection rows of one image so they can be re-extracted.
    pub fn delete_roof_detections(&self, img_name: &str) -> Result<()> {
        self.runtime.block_on(async {
            sqlx::query("DELETE FROM images.roof_detections WHERE img_name = $1")
                .bind(img_name)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!("delete roof detections for '{img_name}'"),
                    source: e,
                })?;
            Ok(())
        })
    }

    /// Remove all rows from a mapping result table.
    pub fn clear_mapping(&self, table: MappingTable) -> Result<()> {
        let sql = format!("DELETE FROM {}", table.qualified_name());
        self.runtime.block_on(async {
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!("clear {}", table.qualified_name()),
                    source: e,
                })?;
            Ok(())
        })
    }

    // ----- writes (append-only) -----

    /// Append image metadata rows.
    pub fn insert_image_metadata(&self, records: &[ImgMetadataRecord]) -> Result<()> {
        self.runtime.block_on(async {
            for record in records {
                sqlx::query(
                    "INSERT INTO images.metadata (name, geom, dir, file)
                     VALUES ($1, ST_GeomFromText($2, 4326), $3, $4)",
                )
                .bind(&record.img_name)
                .bind(record.boundary.wkt_string())
                .bind(&record.dir_path)
                .bind(&record.file_path)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!("insert metadata for '{}'", record.img_name),
                    source: e,
                })?;
            }
            Ok(())
        })
    }

    /// Append window clip rows.
    pub fn insert_window_clips(&self, clips: &[WindowClipRecord]) -> Result<()> {
        self.runtime.block_on(async {
            for clip in clips {
                sqlx::query(
                    "INSERT INTO images.window_clips
                     (idx, img_name, geom, col_off, row_off, width, height)
                     VALUES ($1, $2, ST_GeomFromText($3, 4326), $4, $5, $6, $7)",
                )
                .bind(clip.idx)
                .bind(&clip.img_name)
                .bind(clip.boundary.wkt_string())
                .bind(clip.window.col_off as i64)
                .bind(clip.window.row_off as i64)
                .bind(clip.window.width as i64)
                .bind(clip.window.height as i64)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!("insert window clip {} for '{}'", clip.idx, clip.img_name),
                    source: e,
                })?;
            }
            Ok(())
        })
    }

    /// Append roof detection rows for one image.
    pub fn insert_roof_detections(&self, detections: &[RoofDetection]) -> Result<()> {
        self.runtime.block_on(async {
            for detection in detections {
                let ids: Vec<i64> = detection.building_ids.iter().copied().collect();
                sqlx::query(
                    "INSERT INTO images.roof_detections (idx, img_name, geom, ogc_fid)
                     VALUES ($1, $2, ST_GeomFromText($3, 4326), $4)",
                )
                .bind(detection.idx)
                .bind(&detection.img_name)
                .bind(detection.geometry.wkt_string())
                .bind(ids)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!(
                        "insert roof detection {} for '{}'",
                        detection.idx, detection.img_name
                    ),
                    source: e,
                })?;
            }
            Ok(())
        })
    }

    /// Append unit-to-building link rows.
    pub fn insert_unit_building_links(&self, links: &[UnitBuildingLink]) -> Result<()> {
        self.runtime.block_on(async {
            for link in links {
                sqlx::query(
                    "INSERT INTO mapping.mastr_building (mastr_nummer, geom, ogc_fid)
                     VALUES ($1, ST_GeomFromText($2, 4326), $3)",
                )
                .bind(&link.mastr_nummer)
                .bind(link.location.wkt_string())
                .bind(link.ogc_fid)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!("insert unit-building link '{}'", link.mastr_nummer),
                    source: e,
                })?;
            }
            Ok(())
        })
    }

    /// Append unified per-building detection rows.
    pub fn insert_building_detections(&self, detections: &[BuildingDetection]) -> Result<()> {
        self.runtime.block_on(async {
            for detection in detections {
                sqlx::query(
                    "INSERT INTO mapping.roof_detections_building
                     (ogc_fid, geom, idx, img_name, geom_sqm, pc_low, pc_high, cap_low, cap_high)
                     VALUES ($1, ST_GeomFromText($2, 4326), $3, $4, $5, $6, $7, $8, $9)",
                )
                .bind(detection.ogc_fid)
                .bind(detection.geometry.wkt_string())
                .bind(&detection.detection_indices)
                .bind(&detection.img_names)
                .bind(detection.geom_sqm)
                .bind(detection.panel_count_low)
                .bind(detection.panel_count_high)
                .bind(detection.cap_low)
                .bind(detection.cap_high)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!("insert building detection {}", detection.ogc_fid),
                    source: e,
                })?;
            }
            Ok(())
        })
    }

    /// Append unit-to-detection link rows.
    pub fn insert_unit_detection_links(&self, links: &[UnitDetectionLink]) -> Result<()> {
        self.runtime.block_on(async {
            for link in links {
                sqlx::query(
                    "INSERT INTO mapping.roof_detections_mastr
                     (mastr_nummer, geom_mastr, ogc_fid, geom_rd, img_name)
                     VALUES ($1, ST_GeomFromText($2, 4326), $3, ST_GeomFromText($4, 4326), $5)",
                )
                .bind(&link.mastr_nummer)
                .bind(link.location.wkt_string())
                .bind(link.ogc_fid)
                .bind(link.detection_geometry.wkt_string())
                .bind(&link.img_names)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::DbQuery {
                    context: format!("insert unit-detection link '{}'", link.mastr_nummer),
                    source: e,
                })?;
            }
            Ok(())
        })
    }
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| Error::DbQuery {
        context: format!("decode column '{column}'"),
        source: e,
    })
}

fn parse_polygon(wkt_text: &str, context: &str) -> Result<Polygon<f64>> {
    Polygon::try_from_wkt_str(wkt_text).map_err(|e| Error::GeometryParse {
        context: context.to_string(),
        reason: e.to_string(),
    })
}

fn parse_multi_polygon(wkt_text: &str, context: &str) -> Result<MultiPolygon<f64>> {
    MultiPolygon::try_from_wkt_str(wkt_text).or_else(|_| {
        // Footprints digitized as plain polygons are promoted on read.
        parse_polygon(wkt_text, context).map(|p| MultiPolygon::new(vec![p]))
    })
}

fn parse_point(wkt_text: &str, context: &str) -> Result<Point<f64>> {
    Point::try_from_wkt_str(wkt_text).map_err(|e| Error::GeometryParse {
        context: context.to_string(),
        reason: e.to_string(),
    })
}
