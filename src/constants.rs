//! Shared constants used across the application.

/// User agent sent with the PV id listing request.
pub const EXPORTER_USER_AGENT: &str = concat!("pv-id-slimmer/", env!("CARGO_PKG_VERSION"));

/// Output file for reserved-but-unused PV ids.
pub const RESERVED_SLIM_FILE: &str = "reserved_slim.json";

/// Output file for PV ids already attached to uploaded content.
pub const USED_SLIM_FILE: &str = "used_slim.json";

/// Extra top-level key carrying the export time as Unix seconds.
pub const META_TIMESTAMP_KEY: &str = "_meta_timestamp";

/// Username used when a reserved entry's user cannot be resolved.
pub const UNKNOWN_USER: &str = "";

/// Username used when an uploaded entry's post has no resolvable authors.
pub const UNKNOWN_AUTHOR: &str = "MM+";
