//! Topic → backend mapping.
//!
//! Built once at startup and read-only afterwards; concurrent lookups need
//! no locking. Building is the only place that talks to the network before
//! requests flow: backends without a configured unique id are asked for one.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::{error, info};

use crate::config::{BackendConfig, ServiceConfig};
use crate::error::{BridgeError, Result};
use crate::remote::{HttpTransport, OutputFormat, RemoteCommandClient, RemoteTransport};

/// Service type announced to the fabric.
pub const SERVICE_TYPE: &str = "/mcafee/service/epo/remote";
/// Prefix of every request topic; the backend's unique id follows.
pub const REQUEST_TOPIC_PREFIX: &str = "/mcafee/service/epo/remote/";

/// Request topic served for the backend with `unique_id`.
pub fn request_topic(unique_id: &str) -> String {
    format!("{}{}", REQUEST_TOPIC_PREFIX, unique_id)
}

/// A configured backend with its resolved identity.
#[derive(Debug)]
pub struct BackendEndpoint {
    name: String,
    unique_id: String,
    topic: String,
    client: RemoteCommandClient,
}

impl BackendEndpoint {
    pub fn new(name: impl Into<String>, unique_id: impl Into<String>, client: RemoteCommandClient) -> Self {
        let unique_id = unique_id.into();
        Self {
            name: name.into(),
            topic: request_topic(&unique_id),
            unique_id,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Run a remote command on this backend.
    pub fn execute(
        &self,
        command: &str,
        params: &BTreeMap<String, String>,
        output: OutputFormat,
    ) -> Result<Vec<u8>> {
        self.client.invoke_command(command, params, output)
    }
}

/// Owns every backend endpoint, keyed by request topic.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    by_topic: BTreeMap<String, BackendEndpoint>,
}

impl BackendRegistry {
    /// Build the registry with HTTPS transports.
    pub fn build(config: &ServiceConfig) -> Result<Self> {
        Self::build_with(config, |backend| {
            Ok(Box::new(HttpTransport::new(backend)?) as Box<dyn RemoteTransport>)
        })
    }

    /// Build the registry, creating each backend's transport with `connect`.
    ///
    /// Discovery failures abort the build and carry the backend's name.
    pub fn build_with<F>(config: &ServiceConfig, connect: F) -> Result<Self>
    where
        F: Fn(&BackendConfig) -> Result<Box<dyn RemoteTransport>>,
    {
        if config.backends.is_empty() {
            return Err(BridgeError::Configuration(
                "At least one ePO server must be defined in the service configuration file".into(),
            ));
        }

        let mut endpoints = Vec::with_capacity(config.backends.len());
        for backend in &config.backends {
            let endpoint = resolve_endpoint(backend, &connect).map_err(|e| {
                error!(backend = %backend.name, error = %e, "unable to prepare backend");
                e.for_backend(&backend.name)
            })?;
            info!(
                backend = %endpoint.name(),
                topic = %endpoint.topic(),
                "request topic associated with backend"
            );
            endpoints.push(endpoint);
        }

        Self::from_endpoints(endpoints)
    }

    /// Assemble a registry from already resolved endpoints.
    ///
    /// Two endpoints deriving the same topic are a configuration error.
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = BackendEndpoint>) -> Result<Self> {
        let mut by_topic = BTreeMap::new();
        for endpoint in endpoints {
            match by_topic.entry(endpoint.topic().to_string()) {
                Entry::Occupied(existing) => {
                    let existing: &BackendEndpoint = existing.get();
                    return Err(BridgeError::Configuration(format!(
                        "backends '{}' and '{}' share unique id '{}'",
                        existing.name(),
                        endpoint.name(),
                        endpoint.unique_id()
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(endpoint);
                }
            }
        }
        Ok(Self { by_topic })
    }

    pub fn get(&self, topic: &str) -> Option<&BackendEndpoint> {
        self.by_topic.get(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.by_topic.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_topic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }
}

fn resolve_endpoint<F>(backend: &BackendConfig, connect: &F) -> Result<BackendEndpoint>
where
    F: Fn(&BackendConfig) -> Result<Box<dyn RemoteTransport>>,
{
    let client = RemoteCommandClient::from_boxed(connect(backend)?);

    let unique_id = match &backend.unique_id {
        Some(id) => id.clone(),
        None => {
            info!(backend = %backend.name, "attempting to determine unique id");
            let id = client.lookup_unique_id()?;
            info!(backend = %backend.name, unique_id = %id, "unique id found");
            id
        }
    };

    Ok(BackendEndpoint::new(backend.name.clone(), unique_id, client))
}
