//! Remote command protocol: authenticated calls against one ePO server.
//!
//! ## Wire format
//!
//! ```text
//! GET https://{host}:{port}/remote/{command}?{params}&orion.user.security.token={token}&:output={format}
//!
//! OK:
//! <body>
//!
//! Error 1 :
//! No such command: bogus.cmd
//! ```
//!
//! Every command invocation is preceded by a `core.getSecurityToken` call;
//! tokens are never reused across invocations.

mod client;
mod output;
mod response;
mod transport;

pub use client::{
    RemoteCommandClient, OUTPUT_PARAM, SECURITY_TOKEN_COMMAND, SECURITY_TOKEN_PARAM,
    STATUS_REPORT_COMMAND, UNIQUE_ID_KEY,
};
pub use output::OutputFormat;
pub use response::parse_response;
pub use transport::{HttpTransport, RemoteTransport};
