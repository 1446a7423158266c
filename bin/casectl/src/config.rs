use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_METADATA_DIR, ENV_BUCKET, ENV_BUCKET_ROOT, ENV_DATABASE_URL,
    ENV_DATA_DIR, ENV_METADATA, ENV_METADATA_DIR, ENV_S3_ENDPOINT, ENV_STORAGE,
    METADATA_TYPE_DATABASE, METADATA_TYPE_FILE, STORAGE_TYPE_FILESYSTEM, STORAGE_TYPE_MEMORY,
    STORAGE_TYPE_S3,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use storage::database::PgMetadataStore;
use storage::filesystem::FileMetadataStore;
use storage::{
    CaseStorageEngine, Collaborators, DatabaseRetryConfig, EngineConfig, ExtensionFormatDetector,
    LoggingNotificationSink, MetadataStore, StorageBackend,
};
use tracing::info;

/// Backend selection shared by every subcommand.
///
/// Priority: command-line flags > environment variables > defaults
#[derive(Debug, Clone, Default, Args)]
pub struct BackendArgs {
    /// Storage backend: 'fs', 's3' or 'memory' (or CASE_STORAGE env var)
    #[arg(long, global = true, value_name = "TYPE")]
    pub storage: Option<String>,
    /// Root directory for filesystem storage (or CASE_DATA_DIR env var)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<String>,
    /// Bucket for s3 storage (or CASE_BUCKET env var)
    #[arg(long, global = true, value_name = "NAME")]
    pub bucket: Option<String>,
    /// Key prefix inside the bucket (or CASE_BUCKET_ROOT env var)
    #[arg(long, global = true, value_name = "PREFIX")]
    pub bucket_root: Option<String>,
    /// Custom S3 endpoint, e.g. a local MinIO (or CASE_S3_ENDPOINT env var)
    #[arg(long, global = true, value_name = "URL")]
    pub s3_endpoint: Option<String>,
    /// Case record store: 'file' or 'db' (or CASE_METADATA env var)
    #[arg(long, global = true, value_name = "TYPE")]
    pub metadata: Option<String>,
    /// Directory for file case records (or CASE_METADATA_DIR env var)
    #[arg(long, global = true, value_name = "DIR")]
    pub metadata_dir: Option<String>,
    /// Database URL for db case records (or DATABASE_URL env var)
    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,
}

/// Where case records are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataType {
    File(PathBuf),
    Database(String),
}

/// Resolved command line configuration
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub backend: StorageBackend,
    pub metadata: MetadataType,
    pub engine: EngineConfig,
    pub database_retry_config: DatabaseRetryConfig,
}

impl CliConfig {
    pub fn load(args: &BackendArgs) -> Result<Self> {
        Self::resolve(args, |name| std::env::var(name).ok())
    }

    fn resolve(args: &BackendArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pick = |flag: &Option<String>, name: &str| flag.clone().or_else(|| env(name));

        let storage_type =
            pick(&args.storage, ENV_STORAGE).unwrap_or_else(|| STORAGE_TYPE_FILESYSTEM.to_string());
        let backend = match storage_type.as_str() {
            STORAGE_TYPE_FILESYSTEM => StorageBackend::Filesystem(PathBuf::from(
                pick(&args.data_dir, ENV_DATA_DIR).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            )),
            STORAGE_TYPE_S3 => StorageBackend::S3 {
                bucket: pick(&args.bucket, ENV_BUCKET).ok_or_else(|| {
                    anyhow!(
                        "Bucket required when using s3 storage. Set --bucket or {} env var",
                        ENV_BUCKET
                    )
                })?,
                root: pick(&args.bucket_root, ENV_BUCKET_ROOT),
                endpoint: pick(&args.s3_endpoint, ENV_S3_ENDPOINT),
            },
            STORAGE_TYPE_MEMORY => StorageBackend::Memory,
            other => bail!(
                "Invalid storage type: {}. Must be '{}', '{}' or '{}'",
                other,
                STORAGE_TYPE_FILESYSTEM,
                STORAGE_TYPE_S3,
                STORAGE_TYPE_MEMORY
            ),
        };

        let metadata_type =
            pick(&args.metadata, ENV_METADATA).unwrap_or_else(|| METADATA_TYPE_FILE.to_string());
        let metadata = match metadata_type.as_str() {
            METADATA_TYPE_FILE => MetadataType::File(PathBuf::from(
                pick(&args.metadata_dir, ENV_METADATA_DIR)
                    .unwrap_or_else(|| DEFAULT_METADATA_DIR.to_string()),
            )),
            METADATA_TYPE_DATABASE => MetadataType::Database(
                pick(&args.database_url, ENV_DATABASE_URL).ok_or_else(|| {
                    anyhow!(
                        "Database URL required when using db metadata. Set --database-url or {} env var",
                        ENV_DATABASE_URL
                    )
                })?,
            ),
            other => bail!(
                "Invalid metadata type: {}. Must be '{}' or '{}'",
                other,
                METADATA_TYPE_FILE,
                METADATA_TYPE_DATABASE
            ),
        };

        Ok(CliConfig {
            backend,
            metadata,
            engine: EngineConfig::from_env(),
            database_retry_config: DatabaseRetryConfig::from_env(),
        })
    }

    /// Initialize the storage backend and collaborators
    pub async fn build_engine(self) -> Result<CaseStorageEngine> {
        if let StorageBackend::Filesystem(root) = &self.backend {
            tokio::fs::create_dir_all(root)
                .await
                .with_context(|| format!("Failed to create data directory {:?}", root))?;
            info!("Using filesystem storage: {:?}", root);
        }
        let storage = self
            .backend
            .initialize()
            .await
            .context("Failed to initialize case storage")?;

        let metadata: Arc<dyn MetadataStore> = match self.metadata {
            MetadataType::File(dir) => Arc::new(FileMetadataStore::open(dir).await?),
            MetadataType::Database(url) => {
                info!(
                    "Database retry configuration: max_attempts={}, initial_delay_seconds={}",
                    self.database_retry_config.max_attempts,
                    self.database_retry_config.initial_delay_seconds
                );
                Arc::new(PgMetadataStore::connect(&url, &self.database_retry_config).await?)
            }
        };

        Ok(CaseStorageEngine::new(
            storage,
            Collaborators {
                metadata,
                detector: Arc::new(ExtensionFormatDetector::default()),
                notifier: Arc::new(LoggingNotificationSink),
            },
            self.engine,
        ))
    }
}
