/// Default root directory for filesystem case storage
pub const DEFAULT_DATA_DIR: &str = "casectl_data/cases";

/// Default directory for case records when metadata is kept in files
pub const DEFAULT_METADATA_DIR: &str = "casectl_data/records";

/// Storage type identifier for filesystem (also the default)
pub const STORAGE_TYPE_FILESYSTEM: &str = "fs";

/// Storage type identifier for an S3-compatible bucket
pub const STORAGE_TYPE_S3: &str = "s3";

/// Storage type identifier for process-local memory
pub const STORAGE_TYPE_MEMORY: &str = "memory";

/// Metadata type identifier for JSON record files (also the default)
pub const METADATA_TYPE_FILE: &str = "file";

/// Metadata type identifier for PostgreSQL
pub const METADATA_TYPE_DATABASE: &str = "db";

pub const ENV_STORAGE: &str = "CASE_STORAGE";
pub const ENV_DATA_DIR: &str = "CASE_DATA_DIR";
pub const ENV_BUCKET: &str = "CASE_BUCKET";
pub const ENV_BUCKET_ROOT: &str = "CASE_BUCKET_ROOT";
pub const ENV_S3_ENDPOINT: &str = "CASE_S3_ENDPOINT";
pub const ENV_METADATA: &str = "CASE_METADATA";
pub const ENV_METADATA_DIR: &str = "CASE_METADATA_DIR";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Default interval between expiration sweeps in watch mode
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;
