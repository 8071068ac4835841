//! Authenticated remote command invocation against a single backend.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::{debug, error};

use super::output::OutputFormat;
use super::response::parse_response;
use super::transport::RemoteTransport;
use crate::error::{BridgeError, Result};

/// Command returning a fresh session token.
pub const SECURITY_TOKEN_COMMAND: &str = "core.getSecurityToken";
/// Command returning the client status report used for discovery.
pub const STATUS_REPORT_COMMAND: &str = "DxlClient.getStatusReport";
/// Key of the backend's unique identifier within the status report.
pub const UNIQUE_ID_KEY: &str = "uniqueId";
/// Query parameter carrying the session token.
pub const SECURITY_TOKEN_PARAM: &str = "orion.user.security.token";
/// Query parameter carrying the requested output format.
pub const OUTPUT_PARAM: &str = ":output";

/// Client for one backend's remote command endpoint.
///
/// Holds no per-call state: every invocation fetches its own token, so a
/// single client can be shared by any number of worker threads.
pub struct RemoteCommandClient {
    transport: Box<dyn RemoteTransport>,
}

impl RemoteCommandClient {
    pub fn new(transport: impl RemoteTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    pub fn from_boxed(transport: Box<dyn RemoteTransport>) -> Self {
        Self { transport }
    }

    /// Invoke `command` with `params`, returning the trimmed response body.
    ///
    /// A token is fetched immediately before the call and merged into the
    /// parameters together with the output format. Caller-supplied values
    /// for those two keys are overwritten.
    pub fn invoke_command(
        &self,
        command: &str,
        params: &BTreeMap<String, String>,
        output: OutputFormat,
    ) -> Result<Vec<u8>> {
        let token = self.security_token()?;

        let mut merged = params.clone();
        merged.insert(SECURITY_TOKEN_PARAM.to_string(), token);
        merged.insert(OUTPUT_PARAM.to_string(), output.as_str().to_string());

        debug!(
            command,
            params = ?params,
            output = %output,
            "invoking remote command"
        );

        let query: Vec<(String, String)> = merged.into_iter().collect();
        let raw = self.transport.get(command, &query)?;
        debug!(command, bytes = raw.len(), "response from backend");
        parse_response(&raw)
            .map(String::into_bytes)
            .inspect_err(|e| error!(command, error = %e, "remote command failed"))
    }

    /// Discover the backend's unique identifier from its status report.
    pub fn lookup_unique_id(&self) -> Result<String> {
        let body = self.invoke_command(STATUS_REPORT_COMMAND, &BTreeMap::new(), OutputFormat::Json)?;
        let report: Value = serde_json::from_slice(&body).map_err(|e| {
            BridgeError::Protocol(format!("status report is not valid JSON: {}", e))
        })?;

        match report.get(UNIQUE_ID_KEY) {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(other) => Err(BridgeError::Protocol(format!(
                "'{}' in status report is not a string: {}",
                UNIQUE_ID_KEY, other
            ))),
            None => Err(BridgeError::Protocol(format!(
                "Unable to find '{}' in response.",
                UNIQUE_ID_KEY
            ))),
        }
    }

    fn security_token(&self) -> Result<String> {
        let raw = self.transport.get(SECURITY_TOKEN_COMMAND, &[])?;
        let token = parse_response(&raw)?;
        debug!("security token received");
        Ok(token)
    }
}

impl fmt::Debug for RemoteCommandClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCommandClient").finish_non_exhaustive()
    }
}
