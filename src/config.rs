//! Layered configuration: command line / environment over a TOML file over built-in defaults.

use crate::output::OutputTarget;
use crate::powerbi::auth::DEFAULT_AUTHORITY_HOST;
use crate::powerbi::scanner::{BatchScanOptions, ScanOptions};
use crate::powerbi::{
    AzureIdentityCredential, ClientSecretCredential, ClientSettings, PollSettings, PowerBiClient,
    RetryPolicy, TokenProvider,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const APP_DIR: &str = "powerbi-admin-mcp";
const CONFIG_FILE: &str = "config.toml";
/// Floor for configured poll intervals; scan status calls count against the hourly quota.
const MIN_POLL_INTERVAL_SECS: u64 = 1;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authority_host: Option<String>,
    pub admin_base_url: Option<String>,
    pub fabric_base_url: Option<String>,
    pub max_retries: Option<u32>,
    pub scan_timeout_secs: Option<u64>,
    pub scan_interval_secs: Option<u64>,
    pub batch_scan_timeout_secs: Option<u64>,
    pub batch_delay_secs: Option<u64>,
    pub definition_timeout_secs: Option<u64>,
    pub definition_interval_secs: Option<u64>,
    pub output_directory: Option<String>,
}

impl FileConfig {
    /// `<config_dir>/powerbi-admin-mcp/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load an explicit file (which must exist), or the default file if present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        log::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents, &path)
    }
}

/// Credentials given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct CliCredentials {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authority_host: String,
    pub client: ClientSettings,
    pub scan_poll: PollSettings,
    pub batch_scan_poll: PollSettings,
    pub batch_delay: Duration,
    pub definition_poll: PollSettings,
    pub output_directory: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn poll(defaults: PollSettings, timeout: Option<u64>, interval: Option<u64>) -> PollSettings {
    let interval = interval.map(|secs| {
        if secs < MIN_POLL_INTERVAL_SECS {
            log::warn!(
                "Poll interval of {}s is too short, using {}s",
                secs,
                MIN_POLL_INTERVAL_SECS
            );
        }
        Duration::from_secs(secs.max(MIN_POLL_INTERVAL_SECS))
    });
    PollSettings::new(
        timeout.map(Duration::from_secs).unwrap_or(defaults.timeout),
        interval.unwrap_or(defaults.interval),
    )
}

impl Config {
    pub fn resolve(cli: CliCredentials, file: FileConfig) -> Self {
        let defaults = ClientSettings::default();
        let retry = RetryPolicy {
            max_retries: file.max_retries.unwrap_or(defaults.retry.max_retries),
            ..defaults.retry
        };

        let scan_poll = poll(PollSettings::scan(), file.scan_timeout_secs, file.scan_interval_secs);

        Self {
            tenant_id: non_empty(cli.tenant_id).or(non_empty(file.tenant_id)),
            client_id: non_empty(cli.client_id).or(non_empty(file.client_id)),
            client_secret: non_empty(cli.client_secret).or(non_empty(file.client_secret)),
            authority_host: file
                .authority_host
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            client: ClientSettings {
                admin_base_url: file.admin_base_url.unwrap_or(defaults.admin_base_url),
                fabric_base_url: file.fabric_base_url.unwrap_or(defaults.fabric_base_url),
                retry,
            },
            scan_poll,
            batch_scan_poll: poll(
                PollSettings::large_batch_scan(),
                file.batch_scan_timeout_secs,
                file.scan_interval_secs,
            ),
            batch_delay: Duration::from_secs(file.batch_delay_secs.unwrap_or(10)),
            definition_poll: poll(
                PollSettings::definition(),
                file.definition_timeout_secs,
                file.definition_interval_secs,
            ),
            output_directory: non_empty(file.output_directory),
        }
    }

    /// Client-credentials when tenant, client id and secret are all known; otherwise the
    /// ambient Azure identity chain.
    pub fn token_provider(&self) -> Arc<dyn TokenProvider> {
        match (&self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(tenant_id), Some(client_id), Some(secret)) => {
                log::debug!("Authenticating as service principal {}", client_id);
                Arc::new(ClientSecretCredential::with_authority(
                    &self.authority_host,
                    tenant_id,
                    client_id,
                    secret,
                ))
            }
            _ => {
                log::info!("No client secret configured, using DefaultAzureCredential");
                Arc::new(AzureIdentityCredential::new())
            }
        }
    }

    pub fn build_client(&self) -> PowerBiClient {
        PowerBiClient::with_settings(self.token_provider(), self.client.clone())
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            poll: self.scan_poll,
            ..ScanOptions::default()
        }
    }

    pub fn batch_scan_options(&self) -> BatchScanOptions {
        BatchScanOptions {
            scan: ScanOptions {
                poll: self.batch_scan_poll,
                ..ScanOptions::default()
            },
            batch_delay: self.batch_delay,
            ..BatchScanOptions::default()
        }
    }

    /// The `--output` argument wins over the configured directory.
    pub fn output_target(&self, cli_output: Option<&str>) -> OutputTarget {
        OutputTarget::parse(cli_output.or(self.output_directory.as_deref()))
    }
}
