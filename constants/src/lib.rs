//! Constants shared by the capture engine and the exporter.

pub mod capture;
pub mod geometry;
pub mod output;
pub mod render_settings;
pub mod segmentation;
