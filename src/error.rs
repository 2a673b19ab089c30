//! Error types for the gridlocate engine.

use thiserror::Error;

/// The main error type for gridlocate operations.
///
/// Only genuinely recoverable conditions are represented here. Contract
/// violations that would corrupt evaluation statistics (double `finish()`,
/// scoring an unfinished distribution, NaN scores, similarity values outside
/// their legal range) abort via assertions with diagnostic context instead of
/// returning an error.
#[derive(Error, Debug)]
pub enum GridLocateError {
    /// Invalid configuration (unrecognized strategy name, bad parameter).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coordinate outside the legal range for its space.
    #[error("Invalid coordinate: latitude {lat}, longitude {long}")]
    InvalidCoordinate {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        long: f64,
    },

    /// Error in the incoming document stream.
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// Classifier or reranker training error.
    #[error("Training error: {0}")]
    Training(String),

    /// External batch scorer failed or produced unparseable output.
    #[error("External scorer error: {0}")]
    ExternalScorer(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gridlocate operations.
pub type Result<T> = std::result::Result<T, GridLocateError>;
