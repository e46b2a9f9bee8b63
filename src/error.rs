//! Error types for solmap.

/// Result type alias for solmap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for solmap.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize configuration")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Model file does not exist.
    #[error("model file does not exist: {path}")]
    ModelFileNotFound {
        /// Path to the missing model file.
        path: std::path::PathBuf,
    },

    /// Failed to load an ONNX model.
    #[error("failed to load {kind} model from '{path}'")]
    ModelLoad {
        /// Which model failed to load.
        kind: crate::inference::ModelKind,
        /// Path to the model file.
        path: std::path::PathBuf,
        /// Underlying ONNX runtime error.
        #[source]
        source: ort::Error,
    },

    /// Inference failed for a tile.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// Model produced an output of unexpected shape.
    #[error("unexpected {kind} output shape: {shape:?}")]
    ModelOutputShape {
        /// Which model produced the output.
        kind: crate::inference::ModelKind,
        /// The offending shape.
        shape: Vec<usize>,
    },

    /// Failed to open a raster dataset.
    #[error("failed to open raster '{path}'")]
    RasterOpen {
        /// Path to the raster file.
        path: std::path::PathBuf,
        /// Underlying GDAL error.
        #[source]
        source: gdal::errors::GdalError,
    },

    /// Failed to read raster bands.
    #[error("failed to read raster '{path}'")]
    RasterRead {
        /// Path to the raster file.
        path: std::path::PathBuf,
        /// Underlying GDAL error.
        #[source]
        source: gdal::errors::GdalError,
    },

    /// Failed to write a raster file.
    #[error("failed to write raster '{path}'")]
    RasterWrite {
        /// Path to the raster file.
        path: std::path::PathBuf,
        /// Underlying GDAL error.
        #[source]
        source: gdal::errors::GdalError,
    },

    /// Raster has fewer bands than the models expect.
    #[error("raster '{path}' has {bands} band(s), expected at least 3")]
    RasterBandCount {
        /// Path to the raster file.
        path: std::path::PathBuf,
        /// Number of bands found.
        bands: usize,
    },

    /// Coordinate transformation failed.
    #[error("coordinate transformation failed: {reason}")]
    CoordTransform {
        /// Description of the transformation failure.
        reason: String,
    },

    /// Failed to connect to the spatial database.
    #[error("failed to connect to database")]
    DbConnect {
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },

    /// A database query failed.
    #[error("database query failed: {context}")]
    DbQuery {
        /// What the query was doing.
        context: String,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },

    /// A geometry read from the database could not be parsed.
    #[error("invalid WKT geometry in {context}: {reason}")]
    GeometryParse {
        /// Which table or column held the geometry.
        context: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// Failed to serialize the per-tile score list.
    #[error("failed to write score list '{path}'")]
    ScoreWrite {
        /// Path to the score file.
        path: std::path::PathBuf,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}
