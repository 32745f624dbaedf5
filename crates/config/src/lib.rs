//! Layered configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults.
//! 2. A TOML file: the path given on the command line, otherwise
//!    `config.toml` in the platform config directory (if it exists).
//! 3. `SHOEBOX_`-prefixed environment variables, with `__` separating
//!    nested keys (`SHOEBOX_STORE__BUCKET=my-media`).
//!
//! ```toml
//! [store]
//! name = "b2"
//! bucket = "my-media"
//! region = "us-west-004"
//! endpoint = "https://s3.us-west-004.backblazeb2.com"
//! key_id = "..."
//! key_secret = "..."
//!
//! [backup]
//! root = "/srv/media"
//! scan_policy = "skip_and_report"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use shoebox_inventory::ScanPolicy;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "SHOEBOX_";
const MIB: u64 = 1024 * 1024;
/// Smallest multipart part size S3 accepts.
pub const MIN_PART_SIZE: u64 = 5 * MIB;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub backup: BackupConfig,
    pub jobs: JobsConfig,
    pub transfer: TransferConfig,
}

/// Connection details for the S3-compatible bucket.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Used in logs only.
    pub name: String,
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers; AWS when unset.
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            key_id: String::new(),
            key_secret: String::new(),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("name", &self.name)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// The local media tree. Its last path segment is the key prefix.
    pub root: PathBuf,
    pub scan_policy: ScanPolicy,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            scan_policy: ScanPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Seconds a finished job stays visible before it's dropped.
    pub retire_after_secs: u64,
    /// Events buffered per subscriber before it starts lagging.
    pub broadcast_capacity: usize,
    /// Files between progress updates during reconciliation.
    pub reconcile_batch: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retire_after_secs: 30,
            broadcast_capacity: 256,
            reconcile_batch: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Files strictly larger than this many bytes are streamed.
    pub streaming_threshold: u64,
    /// Multipart part size for streamed uploads.
    pub part_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            streaming_threshold: 100 * MIB,
            part_size: 8 * MIB,
        }
    }
}

impl Config {
    /// Load, merge and validate every configuration source.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path
            && !path.is_file()
        {
            exn::bail!(ErrorKind::Invalid(format!("config file {} does not exist", path.display())));
        }
        let path = path.map(Path::to_path_buf).or_else(default_path);
        let config: Self = Self::figment(path.as_deref()).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(file = ?path, store = %config.store.name, bucket = %config.store.bucket, "configuration loaded");
        Ok(config)
    }

    /// The merged sources, without extracting or validating.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.bucket.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("store.bucket must be set".to_string()));
        }
        if self.transfer.part_size < MIN_PART_SIZE {
            exn::bail!(ErrorKind::Invalid(format!(
                "transfer.part_size must be at least {MIN_PART_SIZE} bytes, got {}",
                self.transfer.part_size
            )));
        }
        if self.jobs.broadcast_capacity == 0 {
            exn::bail!(ErrorKind::Invalid("jobs.broadcast_capacity must be greater than zero".to_string()));
        }
        if self.jobs.reconcile_batch == 0 {
            exn::bail!(ErrorKind::Invalid("jobs.reconcile_batch must be greater than zero".to_string()));
        }
        self.base_folder_name()?;
        Ok(())
    }

    /// Last path segment of the backup root; every destination key starts
    /// with it.
    pub fn base_folder_name(&self) -> Result<String> {
        let root = std::path::absolute(&self.backup.root).or_raise(|| {
            ErrorKind::Invalid(format!("cannot resolve backup.root {}", self.backup.root.display()))
        })?;
        // `absolute` keeps `..` segments; only a real final segment will do.
        match root.file_name() {
            Some(name) => Ok(name.to_string_lossy().into_owned()),
            None => exn::bail!(ErrorKind::Invalid(format!(
                "backup.root {} has no final path segment",
                self.backup.root.display()
            ))),
        }
    }

    pub fn retire_after(&self) -> Duration {
        Duration::from_secs(self.jobs.retire_after_secs)
    }
}

/// `config.toml` in the platform config directory, if it exists.
pub fn default_path() -> Option<PathBuf> {
    let path = ProjectDirs::from("", "", "shoebox")?.config_dir().join("config.toml");
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn valid() -> Config {
        Config {
            store: StoreConfig {
                bucket: "my-media".to_string(),
                ..StoreConfig::default()
            },
            backup: BackupConfig {
                root: PathBuf::from("/srv/media"),
                ..BackupConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.jobs.retire_after_secs, 30);
        assert_eq!(config.jobs.reconcile_batch, 50);
        assert_eq!(config.transfer.streaming_threshold, 100 * 1024 * 1024);
        assert_eq!(config.transfer.part_size, 8 * 1024 * 1024);
        assert_eq!(config.backup.scan_policy, ScanPolicy::Abort);
        assert_eq!(config.retire_after(), Duration::from_secs(30));
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "shoebox.toml",
                r#"
                [store]
                bucket = "from-file"
                region = "us-west-004"
                endpoint = "https://s3.us-west-004.backblazeb2.com"

                [backup]
                root = "/srv/media"
                scan_policy = "skip_and_report"

                [jobs]
                reconcile_batch = 10
                "#,
            )?;
            jail.set_env("SHOEBOX_STORE__BUCKET", "from-env");
            jail.set_env("SHOEBOX_TRANSFER__STREAMING_THRESHOLD", "1024");

            let config: Config = Config::figment(Some(Path::new("shoebox.toml"))).extract()?;
            assert_eq!(config.store.bucket, "from-env");
            assert_eq!(config.store.region, "us-west-004");
            assert_eq!(config.store.endpoint.as_deref(), Some("https://s3.us-west-004.backblazeb2.com"));
            assert_eq!(config.backup.scan_policy, ScanPolicy::SkipAndReport);
            assert_eq!(config.jobs.reconcile_batch, 10);
            assert_eq!(config.jobs.broadcast_capacity, 256);
            assert_eq!(config.transfer.streaming_threshold, 1024);
            Ok(())
        });
    }

    #[test]
    fn test_load_validates() {
        Jail::expect_with(|jail| {
            jail.create_file("shoebox.toml", "[backup]\nroot = \"/srv/media\"\n")?;
            let path = jail.directory().join("shoebox.toml");
            let err = Config::load(Some(&path)).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(message) if message.contains("bucket")));

            jail.set_env("SHOEBOX_STORE__BUCKET", "my-media");
            let config = Config::load(Some(&path)).unwrap();
            assert_eq!(config.base_folder_name().unwrap(), "media");
            Ok(())
        });
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[jobs]\nreconcile_batch = \"lots\"\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load));
    }

    #[rstest]
    #[case("/srv/media", "media")]
    #[case("/srv/media/", "media")]
    #[case("/home/me/Pictures/Family Photos", "Family Photos")]
    fn test_base_folder_name(#[case] root: &str, #[case] expected: &str) {
        let mut config = valid();
        config.backup.root = PathBuf::from(root);
        assert_eq!(config.base_folder_name().unwrap(), expected);
    }

    #[rstest]
    #[case::root_dir(|c: &mut Config| c.backup.root = PathBuf::from("/"))]
    #[case::blank_bucket(|c: &mut Config| c.store.bucket = "  ".to_string())]
    #[case::small_parts(|c: &mut Config| c.transfer.part_size = 1024)]
    #[case::no_capacity(|c: &mut Config| c.jobs.broadcast_capacity = 0)]
    #[case::no_batch(|c: &mut Config| c.jobs.reconcile_batch = 0)]
    fn test_invalid(#[case] break_it: fn(&mut Config)) {
        assert!(valid().validate().is_ok());
        let mut config = valid();
        break_it(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_secret_not_in_debug() {
        let mut config = valid();
        config.store.key_secret = "hunter2".to_string();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
