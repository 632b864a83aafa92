//! Error types for the flow-data crate.
//!
//! Failures are surfaced as they come out of directory scanning, image
//! decoding and flow decoding. There is no retry or partial recovery: a
//! decode error aborts the fetch of that sample.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for dataset construction and sample access.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Error when reading a directory fails.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory path that failed to read.
        path: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// Error when a required dataset directory does not exist.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The expected directory path.
        path: PathBuf,
    },

    /// Error when reading a file fails.
    #[error("Failed to read file: {path}")]
    FileReadFailed {
        /// The file that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Error when writing a file fails.
    #[error("Failed to write file: {path}")]
    FileWriteFailed {
        /// The file that failed to write.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Error when opening or decoding an image file fails.
    #[error("Failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file path that failed to open.
        path: PathBuf,
        /// The underlying image processing error.
        #[source]
        source: image::ImageError,
    },

    /// Error when encoding an image file fails.
    #[error("Failed to save image: {path}")]
    ImageSaveFailed {
        /// The destination path.
        path: PathBuf,
        /// The underlying image processing error.
        #[source]
        source: image::ImageError,
    },

    /// Error when a `.flo` file does not start with the Middlebury magic number.
    #[error("Invalid .flo magic number {magic} in {path}")]
    InvalidFloMagic {
        /// The offending file.
        path: PathBuf,
        /// The magic value that was read.
        magic: f32,
    },

    /// Error when a PFM header cannot be parsed.
    #[error("Malformed PFM header in {path}: {reason}")]
    MalformedPfmHeader {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with the header.
        reason: String,
    },

    /// Error when a flow file holds fewer values than its header announces.
    #[error("Truncated flow data in {path}: expected {expected} bytes, found {actual}")]
    TruncatedFlow {
        /// The offending file.
        path: PathBuf,
        /// Number of payload bytes the header requires.
        expected: usize,
        /// Number of payload bytes present.
        actual: usize,
    },

    /// Error when a flow path has an extension no decoder handles.
    #[error("Unsupported flow format: {path}")]
    UnsupportedFlowFormat {
        /// The offending file.
        path: PathBuf,
    },

    /// Error when image and flow counts disagree at construction time.
    #[error("Frame count mismatch in {path}: {images} images, {flows} flows")]
    FrameCountMismatch {
        /// The dataset directory.
        path: PathBuf,
        /// Number of images found.
        images: usize,
        /// Number of flows found.
        flows: usize,
    },

    /// Error when the split file has fewer entries than samples.
    #[error("Split file {path} has {entries} entries, {required} required")]
    SplitFileTooShort {
        /// The split file.
        path: PathBuf,
        /// Entries present in the file.
        entries: usize,
        /// Entries needed to cover every flow.
        required: usize,
    },

    /// Error when a split file entry is not an integer.
    #[error("Invalid split entry {value:?} in {path}")]
    InvalidSplitEntry {
        /// The split file.
        path: PathBuf,
        /// The token that failed to parse.
        value: String,
    },

    /// Error when a strict index is outside the dataset.
    #[error("Index {index} out of bounds for dataset of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Dataset length.
        len: usize,
    },

    /// Error when a wrapping access is made on an empty dataset.
    #[error("Cannot index into an empty dataset")]
    EmptyDataset,
}

/// A specialized `Result` type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
