//! In-process fabric for tests, demos and single-process deployments.
//!
//! Requests go through a bounded queue (`queue_size`) drained by a fixed
//! pool of worker threads (`thread_pool_size`). A full queue blocks the
//! sender, which is how back-pressure reaches callers.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, warn};

use super::{Fabric, FabricError, Request, RequestHandler, Response, ServiceRegistration};
use crate::config::FabricConfig;

/// Counters collected by the worker pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FabricStats {
    /// Requests answered with a success response.
    pub handled: usize,
    /// Requests answered with an error response.
    pub failed: usize,
}

/// Thread-safe in-process fabric. Cheap to clone; clones share state.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use epo_remote_bridge::config::FabricConfig;
/// use epo_remote_bridge::fabric::{Fabric, InMemoryFabric, Request, Response, ServiceRegistration};
///
/// let fabric = InMemoryFabric::new(FabricConfig::default());
/// fabric.connect().unwrap();
///
/// let echo = |req: &Request| Response::success(req, req.payload.clone());
/// let registration = ServiceRegistration::new("/demo").topic("/demo/echo", Arc::new(echo));
/// fabric.register_service(registration, Duration::from_secs(1)).unwrap();
///
/// let response = fabric.request("/demo/echo", "ping", Duration::from_secs(1)).unwrap();
/// assert_eq!(response.payload_str(), Some("ping"));
/// ```
#[derive(Clone)]
pub struct InMemoryFabric {
    inner: Arc<Inner>,
}

struct Inner {
    config: FabricConfig,
    shared: Arc<Shared>,
    services: Mutex<HashMap<String, Vec<String>>>,
    pool: Mutex<Option<WorkerPool>>,
}

/// State reachable from worker threads.
struct Shared {
    handlers: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    pending: Mutex<HashMap<String, mpsc::Sender<Response>>>,
    handled: AtomicUsize,
    failed: AtomicUsize,
}

struct WorkerPool {
    queue: SyncSender<Request>,
    workers: Vec<JoinHandle<()>>,
}

impl InMemoryFabric {
    pub fn new(config: FabricConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                shared: Arc::new(Shared {
                    handlers: RwLock::new(HashMap::new()),
                    pending: Mutex::new(HashMap::new()),
                    handled: AtomicUsize::new(0),
                    failed: AtomicUsize::new(0),
                }),
                services: Mutex::new(HashMap::new()),
                pool: Mutex::new(None),
            }),
        }
    }

    /// Send a request and block until its response arrives or `timeout` elapses.
    pub fn request(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Response, FabricError> {
        let queue = {
            let pool = lock(&self.inner.pool);
            pool.as_ref()
                .map(|p| p.queue.clone())
                .ok_or(FabricError::NotConnected)?
        };

        let request = Request::new(topic, payload);
        let message_id = request.message_id.clone();
        let (reply_tx, reply_rx) = mpsc::channel();
        lock(&self.inner.shared.pending).insert(message_id.clone(), reply_tx);

        if queue.send(request).is_err() {
            lock(&self.inner.shared.pending).remove(&message_id);
            return Err(FabricError::QueueClosed);
        }

        match reply_rx.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                lock(&self.inner.shared.pending).remove(&message_id);
                Err(FabricError::Timeout)
            }
        }
    }

    /// Topics with a registered handler.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = read(&self.inner.shared.handlers).keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Number of registered services.
    pub fn service_count(&self) -> usize {
        lock(&self.inner.services).len()
    }

    pub fn stats(&self) -> FabricStats {
        FabricStats {
            handled: self.inner.shared.handled.load(Ordering::Relaxed),
            failed: self.inner.shared.failed.load(Ordering::Relaxed),
        }
    }
}

impl Fabric for InMemoryFabric {
    fn connect(&self) -> Result<(), FabricError> {
        let mut pool = lock(&self.inner.pool);
        if pool.is_some() {
            return Ok(());
        }

        let (queue, receiver) = mpsc::sync_channel(self.inner.config.queue_size);
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(self.inner.config.thread_pool_size);
        for index in 0..self.inner.config.thread_pool_size {
            let receiver = Arc::clone(&receiver);
            let shared = Arc::clone(&self.inner.shared);
            let worker = thread::Builder::new()
                .name(format!("fabric-worker-{}", index))
                .spawn(move || run_worker(&receiver, &shared))
                .map_err(|e| FabricError::ConnectionFailed(e.to_string()));
            match worker {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    drop(queue);
                    join_all(workers);
                    return Err(e);
                }
            }
        }

        debug!(
            threads = self.inner.config.thread_pool_size,
            queue_size = self.inner.config.queue_size,
            "fabric connected"
        );
        *pool = Some(WorkerPool { queue, workers });
        Ok(())
    }

    fn disconnect(&self) -> Result<(), FabricError> {
        let pool = lock(&self.inner.pool).take();
        if let Some(pool) = pool {
            pool.shutdown();
            debug!("fabric disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.inner.pool).is_some()
    }

    fn register_service(
        &self,
        registration: ServiceRegistration,
        _timeout: Duration,
    ) -> Result<(), FabricError> {
        if !self.is_connected() {
            return Err(FabricError::NotConnected);
        }

        let service_id = registration.service_id().to_string();
        let mut services = lock(&self.inner.services);
        if services.contains_key(&service_id) {
            return Err(FabricError::Rejected(format!(
                "service {} is already registered",
                service_id
            )));
        }

        let topics = registration.into_topics();
        let mut handlers = write(&self.inner.shared.handlers);
        if let Some((taken, _)) = topics.iter().find(|(t, _)| handlers.contains_key(t)) {
            return Err(FabricError::Rejected(format!(
                "topic {} is already served",
                taken
            )));
        }

        let names: Vec<String> = topics.iter().map(|(t, _)| t.clone()).collect();
        for (topic, handler) in topics {
            handlers.insert(topic, handler);
        }
        debug!(service_id = %service_id, topics = ?names, "service registered");
        services.insert(service_id, names);
        Ok(())
    }

    fn unregister_service(&self, service_id: &str, _timeout: Duration) -> Result<(), FabricError> {
        let topics = lock(&self.inner.services)
            .remove(service_id)
            .ok_or_else(|| FabricError::UnknownService(service_id.to_string()))?;

        let mut handlers = write(&self.inner.shared.handlers);
        for topic in &topics {
            handlers.remove(topic);
        }
        debug!(service_id, "service unregistered");
        Ok(())
    }

    fn send_response(&self, response: Response) -> Result<(), FabricError> {
        if !self.is_connected() {
            return Err(FabricError::NotConnected);
        }
        self.inner.shared.complete(response)
    }
}

impl Shared {
    fn deliver(&self, request: Request) {
        let handler = read(&self.handlers).get(&request.destination_topic).cloned();

        let response = match handler {
            Some(handler) => {
                match panic::catch_unwind(AssertUnwindSafe(|| handler.on_request(&request))) {
                    Ok(response) => response,
                    Err(_) => {
                        error!(topic = %request.destination_topic, "request handler panicked");
                        Response::error(&request, 0, "internal error while handling request")
                    }
                }
            }
            None => {
                warn!(topic = %request.destination_topic, "no service registered for topic");
                Response::error(
                    &request,
                    0,
                    format!(
                        "unable to locate service for request to topic {}",
                        request.destination_topic
                    ),
                )
            }
        };

        if response.is_error() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.handled.fetch_add(1, Ordering::Relaxed);
        }

        if let Err(e) = self.complete(response) {
            debug!(error = %e, "response dropped");
        }
    }

    fn complete(&self, response: Response) -> Result<(), FabricError> {
        let waiter = lock(&self.pending).remove(&response.request_message_id);
        match waiter {
            Some(tx) => {
                // The caller may have timed out in the meantime.
                let _ = tx.send(response);
                Ok(())
            }
            None => Err(FabricError::UnknownRequest(response.request_message_id)),
        }
    }
}

impl WorkerPool {
    fn shutdown(self) {
        drop(self.queue);
        join_all(self.workers);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let pool = self.pool.get_mut().ok().and_then(Option::take);
        if let Some(pool) = pool {
            pool.shutdown();
        }
    }
}

fn run_worker(receiver: &Mutex<Receiver<Request>>, shared: &Shared) {
    loop {
        let next = lock(receiver).recv();
        match next {
            Ok(request) => shared.deliver(request),
            Err(_) => break,
        }
    }
}

fn join_all(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if worker.join().is_err() {
            error!("fabric worker terminated abnormally");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
