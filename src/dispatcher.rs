//! Request dispatch: turns one fabric request into one reply.
//!
//! Decoding, routing and the remote call all return `Result`; the single
//! conversion point into a reply is [`RequestDispatcher::on_request`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error};

use crate::error::{BridgeError, Result};
use crate::fabric::{Request, RequestHandler, Response};
use crate::registry::BackendRegistry;
use crate::remote::OutputFormat;

/// Key naming the remote command in a request payload.
pub const COMMAND_KEY: &str = "command";

/// A decoded inbound request.
///
/// ```json
/// { "command": "system.find", "output": "json", "params": { "searchText": "Linux" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: String,
    pub params: BTreeMap<String, String>,
    pub output: OutputFormat,
}

#[derive(Deserialize)]
struct RawCommandRequest {
    command: Option<String>,
    params: Option<BTreeMap<String, Option<ParamValue>>>,
    output: Option<String>,
}

/// Scalar parameter values; numbers and booleans are sent in their JSON
/// spelling. `null` values are dropped from the query.
#[derive(Deserialize)]
#[serde(untagged)]
enum ParamValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl ParamValue {
    fn into_string(self) -> String {
        match self {
            ParamValue::Text(s) => s,
            ParamValue::Number(n) => n.to_string(),
            ParamValue::Flag(b) => b.to_string(),
        }
    }
}

impl CommandRequest {
    /// Decode a UTF-8 JSON payload, applying defaults for `params` and `output`.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| BridgeError::RequestFormat(format!("payload is not valid UTF-8: {}", e)))?;
        let raw: RawCommandRequest = serde_json::from_str(text)
            .map_err(|e| BridgeError::RequestFormat(e.to_string()))?;

        let command = raw
            .command
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                BridgeError::RequestFormat(format!(
                    "A command name was not specified ('{}')",
                    COMMAND_KEY
                ))
            })?;

        let params = raw
            .params
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v.into_string())))
            .collect();

        let output = match raw.output {
            Some(name) => name.parse()?,
            None => OutputFormat::default(),
        };

        Ok(Self {
            command,
            params,
            output,
        })
    }
}

/// Fabric handler routing requests to backends by destination topic.
pub struct RequestDispatcher {
    registry: Arc<BackendRegistry>,
}

impl RequestDispatcher {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Decode, route and execute a request, returning the backend's body.
    pub fn dispatch(&self, request: &Request) -> Result<Vec<u8>> {
        let command = CommandRequest::from_payload(&request.payload)?;

        let endpoint = self
            .registry
            .get(&request.destination_topic)
            .ok_or_else(|| BridgeError::InternalLookup(request.destination_topic.clone()))?;

        debug!(
            backend = %endpoint.name(),
            command = %command.command,
            output = %command.output,
            "dispatching request"
        );
        endpoint.execute(&command.command, &command.params, command.output)
    }
}

impl RequestHandler for RequestDispatcher {
    fn on_request(&self, request: &Request) -> Response {
        match self.dispatch(request) {
            Ok(body) => Response::success(request, body),
            Err(e) => {
                error!(
                    topic = %request.destination_topic,
                    message_id = %request.message_id,
                    error = %e,
                    "error while processing request"
                );
                Response::error(request, e.reply_code(), e.to_string())
            }
        }
    }
}
