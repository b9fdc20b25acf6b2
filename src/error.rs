//! Error types used across the crate.

use std::io;
use thiserror::Error;

/// Error returned when a grid operation fails.
#[derive(Debug, Error)]
pub enum GridError {
    /// Returned when a transform name is neither a built-in nor registered.
    #[error("transform `{0}` is not registered")]
    UnknownTransform(String),
    /// Returned when tensors or grids with incompatible axes are combined.
    #[error("the axes of the combined tensors do not match")]
    AxisMismatch,
    /// Returned when deserializing a grid fails.
    #[error(transparent)]
    ReadFailure(bincode::Error),
    /// Returned when serializing a grid fails.
    #[error(transparent)]
    WriteFailure(bincode::Error),
    /// Returned while performing IO operations.
    #[error(transparent)]
    IoFailure(#[from] io::Error),
    /// Returned when the input does not start with the grid file magic bytes.
    #[error("the file is not a grid file")]
    InvalidMagic,
    /// Returned when trying to read a file with an unsupported format version.
    #[error("the file version is {file_version}, but supported is only {supported_version}")]
    FileVersionMismatch {
        /// Format version found in the file.
        file_version: u64,
        /// Maximum format version supported by this library.
        supported_version: u64,
    },
}

/// Shorthand for results with a [`GridError`].
pub type Result<T> = std::result::Result<T, GridError>;
