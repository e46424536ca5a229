//! Constants shared by the download module.

/// Suffix of an artifact that is still being streamed to disk.
pub const PARTIAL_SUFFIX: &str = ".part";
