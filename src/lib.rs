//! Bridge between a request/response messaging fabric and the remote
//! command interface of one or more ePO servers.
//!
//! ```text
//! fabric request ──▶ RequestDispatcher ──▶ BackendRegistry[topic]
//!                                              │
//!                                              ▼
//!                                      RemoteCommandClient ──HTTPS──▶ /remote/{command}
//!                                              │
//! fabric reply   ◀── body or error ◀───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use epo_remote_bridge::config::ServiceConfig;
//! use epo_remote_bridge::fabric::InMemoryFabric;
//! use epo_remote_bridge::EpoService;
//!
//! let config = ServiceConfig::load("/etc/epo-bridge")?;
//! let service = EpoService::new("/etc/epo-bridge", InMemoryFabric::new(config.fabric));
//! service.start()?;
//! // ... requests on /mcafee/service/epo/remote/{uniqueId} are now served ...
//! service.stop()?;
//! ```

pub mod config;
pub mod dispatcher;
mod error;
pub mod fabric;
pub mod logging;
pub mod registry;
pub mod remote;
mod service;

pub use dispatcher::{CommandRequest, RequestDispatcher};
pub use error::{BridgeError, Result};
pub use registry::{
    request_topic, BackendEndpoint, BackendRegistry, REQUEST_TOPIC_PREFIX, SERVICE_TYPE,
};
pub use remote::{OutputFormat, RemoteCommandClient};
pub use service::{EpoService, ServiceState, TransportFactory, REGISTRATION_TIMEOUT};
