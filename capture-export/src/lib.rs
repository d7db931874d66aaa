//! Disk export for the capture pipeline: image encoding on a background
//! worker, JSON annotation files and per-session directories.

pub mod compressor;
pub mod directory;
pub mod error;
pub mod exporter;
pub mod file_handler;

pub use compressor::ImageCompressor;
pub use error::ExportError;
pub use exporter::ImageExporter;
pub use file_handler::FileDataHandler;
