//! Parser for the `Status:Body` text returned by remote commands.

use crate::error::{BridgeError, Result};

/// Parse a raw remote command response.
///
/// Splits on the first colon. A status containing `Error` must carry a
/// numeric code after its first space; anything else returns the trimmed
/// body.
pub fn parse_response(raw: &str) -> Result<String> {
    let colon = raw.find(':').ok_or_else(|| {
        BridgeError::Protocol("response does not contain a status separator ':'".into())
    })?;
    let status = &raw[..colon];
    let body = raw[colon + 1..].trim();

    if status.contains("Error") {
        let space = status.find(' ').ok_or_else(|| {
            BridgeError::Protocol(format!("error status without a code: '{}'", status))
        })?;
        let code_text = status[space..].trim();
        let code = code_text.parse::<i64>().map_err(|_| {
            BridgeError::Protocol(format!("non-numeric error code: '{}'", code_text))
        })?;
        return Err(BridgeError::RemoteCommand {
            code,
            message: body.to_string(),
        });
    }

    Ok(body.to_string())
}
