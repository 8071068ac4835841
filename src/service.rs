//! Service lifecycle: configuration → registry → fabric registration.
//!
//! `start` and `stop` are serialized by one lock, so transitions never
//! interleave. A failed `start` leaves nothing registered and the fabric
//! disconnected.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{BackendConfig, ServiceConfig};
use crate::dispatcher::RequestDispatcher;
use crate::error::{BridgeError, Result};
use crate::fabric::{Fabric, RequestHandler, ServiceRegistration};
use crate::registry::{BackendRegistry, SERVICE_TYPE};
use crate::remote::{HttpTransport, RemoteTransport};

/// How long to wait for the fabric to accept or drop the service.
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Creates the transport for one configured backend.
pub type TransportFactory =
    Arc<dyn Fn(&BackendConfig) -> Result<Box<dyn RemoteTransport>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Configuring,
    Connected,
    Running,
}

/// Exposes the remote commands of the configured backends on the fabric.
pub struct EpoService<F: Fabric> {
    config_dir: PathBuf,
    fabric: F,
    transports: TransportFactory,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    state: ServiceState,
    running: Option<Running>,
}

struct Running {
    service_id: String,
    registry: Arc<BackendRegistry>,
}

impl<F: Fabric> EpoService<F> {
    /// Service reading its configuration from `config_dir` and talking
    /// HTTPS to its backends.
    pub fn new(config_dir: impl Into<PathBuf>, fabric: F) -> Self {
        Self {
            config_dir: config_dir.into(),
            fabric,
            transports: Arc::new(|backend: &BackendConfig| {
                Ok(Box::new(HttpTransport::new(backend)?) as Box<dyn RemoteTransport>)
            }),
            lifecycle: Mutex::new(Lifecycle {
                state: ServiceState::Stopped,
                running: None,
            }),
        }
    }

    /// Replace how backend transports are created.
    pub fn with_transport_factory<T>(mut self, factory: T) -> Self
    where
        T: Fn(&BackendConfig) -> Result<Box<dyn RemoteTransport>> + Send + Sync + 'static,
    {
        self.transports = Arc::new(factory);
        self
    }

    pub fn state(&self) -> ServiceState {
        self.lock().state
    }

    /// Registry of the running service.
    pub fn registry(&self) -> Option<Arc<BackendRegistry>> {
        self.lock()
            .running
            .as_ref()
            .map(|running| Arc::clone(&running.registry))
    }

    /// Request topics currently served.
    pub fn topics(&self) -> Vec<String> {
        self.registry()
            .map(|registry| registry.topics().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Load configuration, resolve backends, connect and register.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lock();
        if lifecycle.state != ServiceState::Stopped {
            return Err(BridgeError::AlreadyRunning);
        }

        info!(config_dir = %self.config_dir.display(), "starting service");
        lifecycle.state = ServiceState::Configuring;
        match self.bring_up(&mut lifecycle) {
            Ok(running) => {
                info!(
                    service_id = %running.service_id,
                    backends = running.registry.len(),
                    "service registration succeeded"
                );
                lifecycle.running = Some(running);
                lifecycle.state = ServiceState::Running;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "service failed to start");
                lifecycle.state = ServiceState::Stopped;
                Err(e)
            }
        }
    }

    /// Unregister, disconnect and release every backend. No-op when stopped.
    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lock();
        if lifecycle.state == ServiceState::Stopped {
            return Ok(());
        }

        info!("stopping service");
        if let Some(running) = lifecycle.running.take() {
            if let Err(e) = self
                .fabric
                .unregister_service(&running.service_id, REGISTRATION_TIMEOUT)
            {
                warn!(error = %e, "unable to unregister service");
            }
        }
        if let Err(e) = self.fabric.disconnect() {
            warn!(error = %e, "unable to disconnect from fabric");
        }
        lifecycle.state = ServiceState::Stopped;
        info!("service stopped");
        Ok(())
    }

    fn bring_up(&self, lifecycle: &mut Lifecycle) -> Result<Running> {
        let config = ServiceConfig::load(&self.config_dir)?;
        let transports = Arc::clone(&self.transports);
        let registry = Arc::new(BackendRegistry::build_with(&config, |backend| {
            transports(backend)
        })?);

        self.fabric.connect()?;
        lifecycle.state = ServiceState::Connected;

        let dispatcher: Arc<dyn RequestHandler> =
            Arc::new(RequestDispatcher::new(Arc::clone(&registry)));
        let registration = registry
            .topics()
            .fold(ServiceRegistration::new(SERVICE_TYPE), |registration, topic| {
                registration.topic(topic, Arc::clone(&dispatcher))
            });
        let service_id = registration.service_id().to_string();

        info!(topics = ?registration.topic_names(), "registering service");
        if let Err(e) = self.fabric.register_service(registration, REGISTRATION_TIMEOUT) {
            if let Err(disconnect) = self.fabric.disconnect() {
                warn!(error = %disconnect, "unable to disconnect after failed registration");
            }
            return Err(e.into());
        }

        Ok(Running {
            service_id,
            registry,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<F: Fabric> Drop for EpoService<F> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
