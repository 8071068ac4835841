//! Fabric: the request/response messaging layer the bridge is attached to.
//!
//! The bridge only needs a small slice of a broker client: connect, register
//! a service whose topics map to handlers, and deliver one response per
//! request. Everything else (framing, broker discovery, delivery guarantees)
//! stays behind the [`Fabric`] trait.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  request(topic)  ┌───────────────────────────┐
//! │   caller   │ ───────────────▶ │ Fabric (bounded queue)    │
//! └────────────┘                  │   worker 1 .. worker N    │
//!       ▲                         └─────────────┬─────────────┘
//!       │  Response (request_message_id)        │ on_request(&Request)
//!       └───────────────────────────────────────┤
//!                                               ▼
//!                                  ┌───────────────────────────┐
//!                                  │ RequestHandler (per topic)│
//!                                  └───────────────────────────┘
//! ```
//!
//! Handlers *return* their reply, so every delivered request produces
//! exactly one response.

mod error;
mod in_memory;
mod message;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

pub use error::FabricError;
pub use in_memory::{FabricStats, InMemoryFabric};
pub use message::{Request, Response, ResponseBody};

/// Handles requests arriving on one or more registered topics.
///
/// Called concurrently from the fabric's worker threads.
pub trait RequestHandler: Send + Sync {
    fn on_request(&self, request: &Request) -> Response;
}

impl<F> RequestHandler for F
where
    F: Fn(&Request) -> Response + Send + Sync,
{
    fn on_request(&self, request: &Request) -> Response {
        self(request)
    }
}

/// A service announced to the fabric: a type, an id, and its topics.
pub struct ServiceRegistration {
    service_id: String,
    service_type: String,
    topics: Vec<(String, Arc<dyn RequestHandler>)>,
}

impl ServiceRegistration {
    /// New registration with a random service id.
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_id: Uuid::new_v4().to_string(),
            service_type: service_type.into(),
            topics: Vec::new(),
        }
    }

    /// Route `topic` to `handler`. Builder style.
    pub fn topic(mut self, topic: impl Into<String>, handler: Arc<dyn RequestHandler>) -> Self {
        self.topics.push((topic.into(), handler));
        self
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn topic_names(&self) -> Vec<&str> {
        self.topics.iter().map(|(t, _)| t.as_str()).collect()
    }

    pub(crate) fn into_topics(self) -> Vec<(String, Arc<dyn RequestHandler>)> {
        self.topics
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("service_id", &self.service_id)
            .field("service_type", &self.service_type)
            .field("topics", &self.topic_names())
            .finish()
    }
}

/// Client-side view of the messaging fabric used by the service lifecycle.
pub trait Fabric: Send + Sync {
    fn connect(&self) -> Result<(), FabricError>;

    fn disconnect(&self) -> Result<(), FabricError>;

    fn is_connected(&self) -> bool;

    /// Register a service and wait (up to `timeout`) for the fabric to accept it.
    fn register_service(
        &self,
        registration: ServiceRegistration,
        timeout: Duration,
    ) -> Result<(), FabricError>;

    /// Remove a previously registered service and all of its topics.
    fn unregister_service(&self, service_id: &str, timeout: Duration) -> Result<(), FabricError>;

    /// Deliver a response to the caller awaiting `request_message_id`.
    fn send_response(&self, response: Response) -> Result<(), FabricError>;
}

impl<T: Fabric + ?Sized> Fabric for Arc<T> {
    fn connect(&self) -> Result<(), FabricError> {
        (**self).connect()
    }

    fn disconnect(&self) -> Result<(), FabricError> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn register_service(
        &self,
        registration: ServiceRegistration,
        timeout: Duration,
    ) -> Result<(), FabricError> {
        (**self).register_service(registration, timeout)
    }

    fn unregister_service(&self, service_id: &str, timeout: Duration) -> Result<(), FabricError> {
        (**self).unregister_service(service_id, timeout)
    }

    fn send_response(&self, response: Response) -> Result<(), FabricError> {
        (**self).send_response(response)
    }
}
