//! Output formats understood by the remote command endpoint.

use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// Format requested through the `:output` parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    #[default]
    Json,
    Xml,
    Verbose,
    Terse,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Xml => "xml",
            OutputFormat::Verbose => "verbose",
            OutputFormat::Terse => "terse",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "xml" => Ok(OutputFormat::Xml),
            "verbose" => Ok(OutputFormat::Verbose),
            "terse" => Ok(OutputFormat::Terse),
            other => Err(BridgeError::InvalidArgument(format!(
                "Invalid output type specified: {}",
                other
            ))),
        }
    }
}
