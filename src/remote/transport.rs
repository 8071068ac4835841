//! HTTP seam between the command client and the network.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use reqwest::Certificate;
use tracing::debug;

use crate::config::{BackendConfig, TlsPolicy};
use crate::error::{BridgeError, Result};

/// Issues one `GET {base}/{command}` and hands back the response text.
///
/// Implementations must not interpret the HTTP status; the body is parsed by
/// the caller. Invocations may run concurrently from several workers.
pub trait RemoteTransport: Send + Sync {
    fn get(&self, command: &str, params: &[(String, String)]) -> Result<String>;
}

impl<T: RemoteTransport + ?Sized> RemoteTransport for Box<T> {
    fn get(&self, command: &str, params: &[(String, String)]) -> Result<String> {
        (**self).get(command, params)
    }
}

/// Blocking reqwest transport with basic authentication.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    user: String,
    password: String,
}

impl HttpTransport {
    /// Transport for `https://{host}:{port}/remote`.
    pub fn new(backend: &BackendConfig) -> Result<Self> {
        let base_url = format!("https://{}:{}/remote", backend.host, backend.port);
        Self::with_base_url(base_url, backend)
    }

    /// Transport for an explicit base URL, using the backend's credentials
    /// and TLS policy.
    pub fn with_base_url(base_url: impl Into<String>, backend: &BackendConfig) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(
            backend = %backend.name,
            url = %base_url,
            user = %backend.user,
            "initializing remote transport"
        );

        let mut builder = Client::builder();
        match &backend.tls {
            TlsPolicy::Disabled => {
                builder = builder.danger_accept_invalid_certs(true);
            }
            TlsPolicy::SystemRoots => {}
            TlsPolicy::CaBundle(path) => {
                for certificate in load_root_certificates(path)? {
                    builder = builder.add_root_certificate(certificate);
                }
            }
        }
        if let Some(timeout) = backend.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build()?;
        Ok(Self {
            client,
            base_url,
            user: backend.user.clone(),
            password: backend.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RemoteTransport for HttpTransport {
    fn get(&self, command: &str, params: &[(String, String)]) -> Result<String> {
        let url = format!("{}/{}", self.base_url, command);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .query(params)
            .send()?;
        debug!(command, status = %response.status(), "remote command answered");
        Ok(response.text()?)
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Load every certificate from a PEM bundle file, or from each
/// `.pem`/`.crt`/`.cer` file of a directory.
fn load_root_certificates(path: &Path) -> Result<Vec<Certificate>> {
    let files: Vec<PathBuf> = if path.is_dir() {
        let entries = fs::read_dir(path).map_err(|e| {
            BridgeError::Configuration(format!(
                "unable to read CA bundle directory {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|ext| ext.to_str()),
                    Some("pem") | Some("crt") | Some("cer")
                )
            })
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut certificates = Vec::new();
    for file in files {
        let pem = fs::read(&file).map_err(|e| {
            BridgeError::Configuration(format!(
                "unable to read CA bundle {}: {}",
                file.display(),
                e
            ))
        })?;
        let bundle = Certificate::from_pem_bundle(&pem).map_err(|e| {
            BridgeError::Configuration(format!("invalid CA bundle {}: {}", file.display(), e))
        })?;
        certificates.extend(bundle);
    }

    if certificates.is_empty() {
        return Err(BridgeError::Configuration(format!(
            "no certificates found in CA bundle {}",
            path.display()
        )));
    }
    Ok(certificates)
}
