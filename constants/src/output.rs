/// Session-level object description written once per capture session
pub const OBJECT_SETTINGS_FILE_NAME: &str = "_object_settings.json";

/// Session-level camera description written once per capture session
pub const CAMERA_SETTINGS_FILE_NAME: &str = "_camera_settings.json";

/// Frame indices are zero padded to this many digits in file names
pub const FRAME_INDEX_WIDTH: usize = 6;

/// Extension used by annotation extractors
pub const ANNOTATION_EXTENSION: &str = "json";

/// Root folder used when no output path is configured
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "captured_data";

/// Soft bound of the export queue; capture throttles at half of it
pub const DEFAULT_MAX_QUEUED_IMAGES: u32 = 32;

/// Hard bound of the export queue as a multiple of the soft bound; images
/// beyond it are rejected instead of blocking the caller
pub const EXPORT_QUEUE_HARD_LIMIT_FACTOR: u32 = 4;

/// JPEG quality when none is configured (1-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

// Default per-extractor file postfixes, appended after the frame index.
pub const RGB_POSTFIX: &str = "";
pub const DEPTH_POSTFIX: &str = "depth";
pub const QUANTIZED_DEPTH_POSTFIX: &str = "depth.16";
pub const CLASS_SEGMENTATION_POSTFIX: &str = "cs";
pub const INSTANCE_SEGMENTATION_POSTFIX: &str = "is";
pub const OBJECT_ANNOTATION_POSTFIX: &str = "";
pub const BOUNDING_BOX_POSTFIX: &str = "bbox";
