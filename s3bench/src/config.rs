//! Configuration for the benchmark.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `S3_`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `S3_` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `S3_HOSTNAME=example.r2.cloudflarestorage.com` sets the storage host
//! - `S3_BUCKET=bench-1,bench-2` shards the benchmark across two buckets
//! - `S3_RETRY__MAX_ATTEMPTS=5` caps the attempts per request
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! hostname: example.r2.cloudflarestorage.com
//! bucket: bench-1,bench-2
//! retry:
//!   max_attempts: 5
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::level_filters::LevelFilter;

use crate::workload::{DEFAULT_KEY_PREFIX, DEFAULT_PAYLOAD_SIZE, PayloadGenerator};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "S3_";

/// The port used when the configuration explicitly unsets it.
const FALLBACK_PORT: u16 = 9000;

/// A credential read from the configuration, redacted in `Debug` output.
///
/// Wrapped in [`secrecy::SecretBox`] wherever it is stored.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// The secret value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Retry behavior of every storage request.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Retry {
    /// Attempts per request, including the first one.
    ///
    /// # Default
    ///
    /// `20`
    ///
    /// # Environment Variable
    ///
    /// `S3_RETRY__MAX_ATTEMPTS`
    pub max_attempts: u32,

    /// Constant delay between two attempts.
    ///
    /// # Default
    ///
    /// `1s`
    ///
    /// # Environment Variable
    ///
    /// `S3_RETRY__DELAY`
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: s3bench_service::retry::DEFAULT_MAX_ATTEMPTS,
            delay: s3bench_service::retry::DEFAULT_RETRY_DELAY,
        }
    }
}

/// Shape of the objects written by the benchmark.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Payload {
    /// Smallest payload size.
    ///
    /// # Environment Variable
    ///
    /// `S3_PAYLOAD__MIN_SIZE`
    pub min_size: ByteSize,

    /// Largest payload size. Sizes are drawn uniformly between both bounds.
    ///
    /// # Environment Variable
    ///
    /// `S3_PAYLOAD__MAX_SIZE`
    pub max_size: ByteSize,

    /// Prefix of every object key.
    ///
    /// # Default
    ///
    /// `"benchmark/"`
    pub key_prefix: String,
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            min_size: ByteSize::b(DEFAULT_PAYLOAD_SIZE),
            max_size: ByteSize::b(DEFAULT_PAYLOAD_SIZE),
            key_prefix: DEFAULT_KEY_PREFIX.into(),
        }
    }
}

impl Payload {
    /// A generator producing payloads of this shape.
    pub fn generator(&self) -> PayloadGenerator {
        PayloadGenerator::new(
            self.min_size.as_u64(),
            self.max_size.as_u64(),
            self.key_prefix.as_str(),
        )
    }
}

/// Log output format.
///
/// Selected with `S3_LOGGING__FORMAT`, one of `auto`, `pretty`, `simplified` or `json`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Accepts `true`/`false` as well as the `1`/`0` style flags of shell environments.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(flag) => Ok(flag),
        Flag::Int(value) => Ok(value != 0),
        Flag::Str(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                r#"error parsing "{other}" as flag"#
            ))),
        },
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, so the result lines on stdout stay machine-readable.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `S3_LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options.
    ///
    /// # Environment Variable
    ///
    /// `S3_LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the benchmark.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Whether to connect via HTTPS.
    ///
    /// # Default
    ///
    /// `true`
    ///
    /// # Environment Variable
    ///
    /// `S3_USE_SSL`
    #[serde(deserialize_with = "deserialize_flag")]
    pub use_ssl: bool,

    /// Host name of the S3-compatible service.
    ///
    /// # Environment Variable
    ///
    /// `S3_HOSTNAME`
    pub hostname: String,

    /// Port of the S3-compatible service. Falls back to `9000` when unset.
    ///
    /// # Default
    ///
    /// `443`
    ///
    /// # Environment Variable
    ///
    /// `S3_PORT`
    pub port: Option<u16>,

    /// Signing region.
    ///
    /// # Default
    ///
    /// `"auto"`
    pub region: String,

    /// Access key of the service account.
    ///
    /// # Environment Variable
    ///
    /// `S3_ACCESS_KEY`
    pub access_key: Option<SecretBox<ConfigSecret>>,

    /// Secret key of the service account.
    ///
    /// # Environment Variable
    ///
    /// `S3_SECRET_KEY`
    pub secret_key: Option<SecretBox<ConfigSecret>>,

    /// Comma-separated bucket names. Workers are sharded round-robin across one endpoint per
    /// bucket.
    ///
    /// # Environment Variable
    ///
    /// `S3_BUCKET`
    pub bucket: String,

    /// Upper bound for a single storage request.
    ///
    /// # Default
    ///
    /// `3s`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Retry behavior of every storage request. See [`Retry`].
    pub retry: Retry,

    /// Shape of the written objects. See [`Payload`].
    pub payload: Payload,

    /// Period of the live samples.
    ///
    /// # Default
    ///
    /// `1s`
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,

    /// Run against process-local buckets instead of a remote service.
    ///
    /// # Environment Variable
    ///
    /// `S3_DRY_RUN`
    #[serde(deserialize_with = "deserialize_flag")]
    pub dry_run: bool,

    /// Logging configuration. See [`Logging`].
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_ssl: true,
            hostname: "localhost".into(),
            port: Some(443),
            region: "auto".into(),
            access_key: None,
            secret_key: None,
            bucket: String::new(),
            request_timeout: Duration::from_secs(3),
            retry: Retry::default(),
            payload: Payload::default(),
            sample_interval: Duration::from_secs(1),
            dry_run: false,
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `S3_`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Checks the settings that cannot be expressed in types.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.buckets().is_empty(),
            "at least one bucket must be configured (S3_BUCKET)"
        );
        anyhow::ensure!(
            self.payload.min_size <= self.payload.max_size,
            "payload min_size {} exceeds max_size {}",
            self.payload.min_size,
            self.payload.max_size
        );
        anyhow::ensure!(
            self.retry.max_attempts > 0,
            "retry max_attempts must be at least 1"
        );
        Ok(())
    }

    /// The configured bucket names, without blanks.
    pub fn buckets(&self) -> Vec<&str> {
        self.bucket
            .split(',')
            .map(str::trim)
            .filter(|bucket| !bucket.is_empty())
            .collect()
    }

    /// The base URL of the S3-compatible service.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        let port = self.port.unwrap_or(FALLBACK_PORT);
        format!("{scheme}://{}:{port}", self.hostname)
    }
}
