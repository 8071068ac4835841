//! Service configuration.
//!
//! Parsing is pure: it reads the TOML file and validates it, but never talks
//! to a backend. Unique identifiers missing from the file are discovered
//! later, when the registry is built.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// File name of the service configuration inside the config directory.
pub const CONFIG_FILE_NAME: &str = "eposervice.toml";
/// Port used when a backend section does not name one.
pub const DEFAULT_PORT: u16 = 8443;
/// Worker threads delivering inbound requests.
pub const DEFAULT_THREAD_POOL_SIZE: usize = 1;
/// Inbound requests buffered before senders block.
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Certificate verification policy for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Accept any certificate; hostname and chain warnings are suppressed.
    Disabled,
    /// Verify against the platform's trusted roots.
    SystemRoots,
    /// Verify against the certificates in this file or directory.
    CaBundle(PathBuf),
}

/// One configured backend server.
#[derive(Clone)]
pub struct BackendConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub unique_id: Option<String>,
    pub tls: TlsPolicy,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("unique_id", &self.unique_id)
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Tuning for the fabric's inbound worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FabricConfig {
    #[serde(rename = "incomingMessageThreadPoolSize")]
    pub thread_pool_size: usize,
    #[serde(rename = "incomingMessageQueueSize")]
    pub queue_size: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            thread_pool_size: DEFAULT_THREAD_POOL_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info,epo_remote_bridge=debug"`.
    pub filter: Option<String>,
}

/// Fully validated service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub config_dir: PathBuf,
    pub backends: Vec<BackendConfig>,
    pub fabric: FabricConfig,
    pub logging: LoggingConfig,
}

#[derive(Deserialize)]
struct RawConfig {
    general: Option<RawGeneral>,
    #[serde(default)]
    fabric: FabricConfig,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(flatten)]
    sections: BTreeMap<String, toml::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGeneral {
    epo_names: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBackend {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    unique_id: Option<String>,
    verify_certificate: Option<bool>,
    verify_cert_bundle: Option<String>,
    timeout_seconds: Option<u64>,
}

impl ServiceConfig {
    /// Read and validate `eposervice.toml` from `config_dir`.
    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let path = config_dir.join(CONFIG_FILE_NAME);
        let text = fs::read_to_string(&path).map_err(|e| {
            BridgeError::Configuration(format!(
                "unable to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&text, config_dir)
    }

    /// Parse configuration text. Relative paths resolve against `config_dir`.
    pub fn from_toml_str(text: &str, config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();
        let raw: RawConfig = toml::from_str(text)?;

        let names = backend_names(raw.general.as_ref())?;
        let mut backends = Vec::with_capacity(names.len());
        for name in names {
            let section = raw.sections.get(&name).ok_or_else(|| {
                BridgeError::Configuration(format!("no section found for backend '{}'", name))
            })?;
            let section: RawBackend = section.clone().try_into().map_err(|e: toml::de::Error| {
                BridgeError::Configuration(format!("backend '{}': {}", name, e.message()))
            })?;
            backends.push(backend_config(&name, section, &config_dir)?);
        }

        if raw.fabric.thread_pool_size == 0 || raw.fabric.queue_size == 0 {
            return Err(BridgeError::Configuration(
                "fabric thread pool size and queue size must be greater than zero".into(),
            ));
        }

        Ok(Self {
            config_dir,
            backends,
            fabric: raw.fabric,
            logging: raw.logging,
        })
    }
}

fn backend_names(general: Option<&RawGeneral>) -> Result<Vec<String>> {
    let listed = general
        .and_then(|g| g.epo_names.as_deref())
        .ok_or_else(|| BridgeError::Configuration("missing 'epoNames' in [general]".into()))?;

    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for name in listed.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !seen.insert(name) {
            return Err(BridgeError::Configuration(format!(
                "backend '{}' is listed more than once",
                name
            )));
        }
        names.push(name.to_string());
    }

    if names.is_empty() {
        return Err(BridgeError::Configuration(
            "At least one ePO server must be defined in the service configuration file".into(),
        ));
    }
    Ok(names)
}

fn backend_config(name: &str, raw: RawBackend, config_dir: &Path) -> Result<BackendConfig> {
    build_backend(name, raw, config_dir).map_err(|e| e.for_backend(name))
}

fn build_backend(name: &str, raw: RawBackend, config_dir: &Path) -> Result<BackendConfig> {
    let host = required(raw.host, "host")?;
    let user = required(raw.user, "user")?;
    let password = required(raw.password, "password")?;

    let tls = if !raw.verify_certificate.unwrap_or(true) {
        TlsPolicy::Disabled
    } else if let Some(bundle) = raw.verify_cert_bundle.filter(|b| !b.trim().is_empty()) {
        let path = resolve_path(config_dir, bundle.trim());
        if !is_readable(&path) {
            return Err(BridgeError::Configuration(format!(
                "Unable to access CA bundle file/dir (verifyCertBundle): {}",
                path.display()
            )));
        }
        TlsPolicy::CaBundle(path)
    } else {
        TlsPolicy::SystemRoots
    };

    Ok(BackendConfig {
        name: name.to_string(),
        host,
        port: raw.port.unwrap_or(DEFAULT_PORT),
        user,
        password,
        unique_id: raw
            .unique_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
        tls,
        timeout: raw.timeout_seconds.map(Duration::from_secs),
    })
}

fn required(value: Option<String>, property: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            BridgeError::Configuration(format!("missing required property '{}'", property))
        })
}

/// Paths that do not exist as given are looked up relative to the config
/// directory.
fn resolve_path(config_dir: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if !path.exists() && !path.is_absolute() {
        let relative = config_dir.join(path);
        if relative.exists() {
            return relative;
        }
    }
    path.to_path_buf()
}

fn is_readable(path: &Path) -> bool {
    if path.is_dir() {
        fs::read_dir(path).is_ok()
    } else {
        fs::File::open(path).is_ok()
    }
}
